use clap::Parser;
use color_eyre::Result;
use ratatui::DefaultTerminal;
use scour::{App, AppEvent, ConfigManager, OpenOptions};
use std::path::PathBuf;
use std::sync::mpsc::channel;

#[derive(Parser, Debug)]
#[command(version, about = "scour")]
struct Args {
    /// CSV or Excel file to open
    path: PathBuf,

    /// Specify the delimiter to use when reading a CSV file
    #[arg(long = "delimiter")]
    delimiter: Option<u8>,

    /// Specify that the file has no header row
    #[arg(long = "no-header", action)]
    no_header: bool,

    /// Excel worksheet to open, by name or 0-based index
    #[arg(long = "sheet")]
    sheet: Option<String>,

    /// Write the default config file and exit
    #[arg(long = "init-config", action)]
    init_config: bool,

    /// Overwrite an existing config file (with --init-config)
    #[arg(long = "force", action)]
    force: bool,
}

impl From<&Args> for OpenOptions {
    fn from(args: &Args) -> Self {
        let mut opts = OpenOptions::new();
        if let Some(delimiter) = args.delimiter {
            opts = opts.with_delimiter(delimiter);
        }
        if args.no_header {
            opts = opts.with_has_header(false);
        }
        if let Some(sheet) = &args.sheet {
            opts = opts.with_excel_sheet(sheet.clone());
        }
        opts
    }
}

fn render(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    terminal.draw(|frame| frame.render_widget(app, frame.area()))?;
    Ok(())
}

fn run(mut terminal: DefaultTerminal, args: &Args) -> Result<()> {
    let config = ConfigManager::new(scour::APP_NAME)
        .and_then(|manager| manager.load_config())
        .unwrap_or_default();

    let (tx, rx) = channel::<AppEvent>();
    let mut app = App::with_config(tx.clone(), config);
    let opts: OpenOptions = args.into();
    render(&mut terminal, &mut app)?;
    tx.send(AppEvent::Open(args.path.clone(), opts))?;

    loop {
        if crossterm::event::poll(std::time::Duration::from_millis(25))? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => tx.send(AppEvent::Key(key))?,
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(std::time::Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    AppEvent::Crash(msg) => {
                        return Err(color_eyre::eyre::eyre!(msg));
                    }
                    event => {
                        if let Some(event) = app.event(&event) {
                            tx.send(event)?;
                        }
                    }
                }
                true
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => false,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            render(&mut terminal, &mut app)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        let manager = ConfigManager::new(scour::APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    color_eyre::install()?;
    let terminal = ratatui::init();
    let result = run(terminal, &args);
    ratatui::restore();
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
