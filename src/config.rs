use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file or subdirectory
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    /// Ensure the config directory exists
    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Load config.toml, falling back to defaults when the file is absent.
    /// A malformed file is an error, not a silent fallback.
    pub fn load_config(&self) -> Result<AppConfig> {
        let path = self.config_path("config.toml");
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Invalid config at {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub filters: FiltersConfig,
    pub charts: ChartsConfig,
    pub regression: RegressionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Decimal places when rendering float cells in the table
    pub float_precision: usize,
    /// Rows rendered per table page
    pub page_rows: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            float_precision: 3,
            page_rows: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Distinct values listed per categorical filter selector
    pub max_categories: usize,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self { max_categories: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    pub width: u32,
    pub height: u32,
    pub palette: String,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            palette: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Default regularization strength for Ridge/Lasso
    pub strength: f64,
    /// Coordinate descent iteration cap (Lasso)
    pub max_iterations: usize,
    /// Coordinate descent convergence tolerance (Lasso)
    pub tolerance: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            strength: 1.0,
            max_iterations: 1_000,
            tolerance: 1e-6,
        }
    }
}

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# scour configuration

[display]
# Decimal places for float cells in the data table
float_precision = 3
# Rows rendered per table page
page_rows = 500

[filters]
# Distinct values listed per categorical filter selector
max_categories = 50

[charts]
width = 800
height = 600
# One of: default, warm, cool
palette = "default"

[regression]
# Default regularization strength for Ridge/Lasso
strength = 1.0
# Coordinate descent settings (Lasso)
max_iterations = 1000
tolerance = 1e-6
"#;
