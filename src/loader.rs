//! Dataset loading: CSV via the polars reader, Excel workbooks via calamine.
//!
//! Excel cells are untyped, so columns are inferred before building Series:
//! whole-number floats become Int64, all-midnight datetimes become Date, and
//! string columns that parse as ISO dates/datetimes become temporal columns.

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use std::path::Path;

/// Options controlling how a file is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub excel_sheet: Option<String>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_excel_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.excel_sheet = Some(sheet.into());
        self
    }
}

/// True when the extension selects the calamine reader.
fn is_excel_path(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("xls") | Some("xlsx") | Some("xlsm") | Some("xlsb")
    )
}

/// Load a dataset from a CSV or Excel file. An unreadable, malformed, or
/// empty source is an error; the caller's prior state is untouched.
pub fn load_dataset(path: &Path, options: &OpenOptions) -> Result<DataFrame> {
    let df = if is_excel_path(path) {
        load_excel(path, options.excel_sheet.as_deref())?
    } else {
        load_csv(path, options)?
    };
    if df.height() == 0 {
        return Err(eyre!("{} contains no data rows", path.display()));
    }
    Ok(df)
}

fn load_csv(path: &Path, options: &OpenOptions) -> Result<DataFrame> {
    let pl_path = PlPathRef::from_local_path(path).into_owned();
    let mut reader = LazyCsvReader::new(pl_path);
    if let Some(delimiter) = options.delimiter {
        reader = reader.with_separator(delimiter);
    }
    if let Some(has_header) = options.has_header {
        reader = reader.with_has_header(has_header);
    }
    reader = reader.with_try_parse_dates(true);
    Ok(reader.finish()?.collect()?)
}

/// Read one worksheet (by 0-based index or name; first sheet by default)
/// into a DataFrame. The first row supplies column names.
fn load_excel(path: &Path, sheet: Option<&str>) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path).map_err(|e| eyre!("Excel: {}", e))?;
    if workbook.sheet_names().is_empty() {
        return Err(eyre!("Excel file has no worksheets"));
    }
    let range = match sheet {
        Some(sel) => {
            if let Ok(idx) = sel.parse::<usize>() {
                workbook
                    .worksheet_range_at(idx)
                    .ok_or_else(|| eyre!("Excel: no sheet at index {}", idx))?
                    .map_err(|e| eyre!("Excel: {}", e))?
            } else {
                workbook
                    .worksheet_range(sel)
                    .map_err(|e| eyre!("Excel: {}", e))?
            }
        }
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| eyre!("Excel: no first sheet"))?
            .map_err(|e| eyre!("Excel: {}", e))?,
    };

    let rows: Vec<Vec<Data>> = range.rows().map(|r| r.to_vec()).collect();
    if rows.len() < 2 {
        return Ok(DataFrame::empty());
    }
    let headers: Vec<String> = rows[0]
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let h = calamine::DataType::as_string(c).unwrap_or_else(|| c.to_string());
            if h.is_empty() {
                format!("column_{}", i + 1)
            } else {
                h
            }
        })
        .collect();

    let mut columns = Vec::with_capacity(headers.len());
    for (col_idx, header) in headers.iter().enumerate() {
        let cells: Vec<Option<&Data>> = rows[1..].iter().map(|row| row.get(col_idx)).collect();
        let series = cells_to_series(header, &cells, infer_column_type(&cells))?;
        columns.push(series.into());
    }
    Ok(DataFrame::new(columns)?)
}

/// Inferred Excel column type, chosen before the Series is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColType {
    Int64,
    Float64,
    Boolean,
    Utf8,
    Date,
    Datetime,
}

fn infer_column_type(cells: &[Option<&Data>]) -> ColType {
    use calamine::DataType as Cell;
    let mut saw_float = false;
    let mut saw_int = false;
    let mut saw_bool = false;
    let mut saw_datetime = false;
    for cell in cells.iter().flatten() {
        if Cell::is_string(*cell) {
            // A single string cell makes the column text unless every
            // non-empty cell parses as an ISO date/datetime.
            let all_parse = cells.iter().flatten().all(|c| {
                Cell::is_empty(*c) || cell_to_naive_datetime(c).is_some()
            });
            let any_parse = cells
                .iter()
                .flatten()
                .any(|c| cell_to_naive_datetime(c).is_some());
            return if any_parse && all_parse {
                date_or_datetime(cells)
            } else {
                ColType::Utf8
            };
        }
        if Cell::is_datetime(*cell) || Cell::is_datetime_iso(*cell) {
            saw_datetime = true;
        } else if Cell::is_float(*cell) {
            saw_float = true;
        } else if Cell::is_int(*cell) {
            saw_int = true;
        } else if Cell::is_bool(*cell) {
            saw_bool = true;
        }
    }
    if saw_datetime {
        return date_or_datetime(cells);
    }
    if saw_float {
        let all_whole = cells.iter().flatten().all(|cell| {
            calamine::DataType::as_f64(*cell)
                .is_none_or(|f| f.is_finite() && (f - f.trunc()).abs() < 1e-10)
        });
        return if all_whole {
            ColType::Int64
        } else {
            ColType::Float64
        };
    }
    if saw_int {
        return ColType::Int64;
    }
    if saw_bool {
        return ColType::Boolean;
    }
    ColType::Utf8
}

/// Date when every parseable cell sits at midnight, Datetime otherwise.
fn date_or_datetime(cells: &[Option<&Data>]) -> ColType {
    let midnight = chrono::NaiveTime::from_hms_opt(0, 0, 0).expect("valid time");
    let all_midnight = cells
        .iter()
        .flatten()
        .filter_map(|c| cell_to_naive_datetime(c))
        .all(|dt| dt.time() == midnight);
    if all_midnight {
        ColType::Date
    } else {
        ColType::Datetime
    }
}

fn cell_to_naive_datetime(cell: &Data) -> Option<NaiveDateTime> {
    use calamine::DataType;
    if let Some(dt) = cell.as_datetime() {
        return Some(dt);
    }
    let s = cell.get_datetime_iso().or_else(|| cell.get_string())?;
    parse_naive_datetime_str(s)
}

/// Parses an ISO-style date/datetime string; tries FORMATS in order.
/// Shared with the cleaning pipeline's datetime coercion.
pub(crate) fn parse_naive_datetime_str(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0).expect("midnight"));
    }
    None
}

fn cells_to_series(name: &str, cells: &[Option<&Data>], col_type: ColType) -> Result<Series> {
    use calamine::DataType as Cell;
    use polars::datatypes::TimeUnit;
    let series = match col_type {
        ColType::Int64 => {
            let v: Vec<Option<i64>> = cells.iter().map(|c| c.and_then(Cell::as_i64)).collect();
            Series::new(name.into(), v)
        }
        ColType::Float64 => {
            let v: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(Cell::as_f64)).collect();
            Series::new(name.into(), v)
        }
        ColType::Boolean => {
            let v: Vec<Option<bool>> = cells
                .iter()
                .map(|c| c.and_then(|cell| cell.get_bool()))
                .collect();
            Series::new(name.into(), v)
        }
        ColType::Utf8 => {
            let v: Vec<Option<String>> = cells
                .iter()
                .map(|c| c.and_then(Cell::as_string))
                .collect();
            Series::new(name.into(), v)
        }
        ColType::Date => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date");
            let v: Vec<Option<i32>> = cells
                .iter()
                .map(|c| {
                    c.and_then(cell_to_naive_datetime)
                        .map(|dt| (dt.date() - epoch).num_days() as i32)
                })
                .collect();
            Series::new(name.into(), v).cast(&DataType::Date)?
        }
        ColType::Datetime => {
            let v: Vec<Option<i64>> = cells
                .iter()
                .map(|c| {
                    c.and_then(cell_to_naive_datetime)
                        .map(|dt| dt.and_utc().timestamp_micros())
                })
                .collect();
            Series::new(name.into(), v).cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
        }
    };
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_csv_infers_types() {
        let file = write_csv("a,b,c\n1,2.5,x\n2,3.5,y\n");
        let df = load_dataset(file.path(), &OpenOptions::new()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("b").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("c").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn load_csv_custom_delimiter() {
        let file = write_csv("a;b\n1;2\n");
        let df = load_dataset(file.path(), &OpenOptions::new().with_delimiter(b';')).unwrap();
        assert_eq!(df.width(), 2);
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn load_empty_csv_errors() {
        let file = write_csv("");
        assert!(load_dataset(file.path(), &OpenOptions::new()).is_err());
    }

    #[test]
    fn load_header_only_csv_errors() {
        let file = write_csv("a,b\n");
        assert!(load_dataset(file.path(), &OpenOptions::new()).is_err());
    }

    #[test]
    fn load_missing_file_errors() {
        let path = Path::new("/nonexistent/data.csv");
        assert!(load_dataset(path, &OpenOptions::new()).is_err());
    }

    #[test]
    fn excel_extension_detection() {
        assert!(is_excel_path(Path::new("data.xlsx")));
        assert!(is_excel_path(Path::new("DATA.XLS")));
        assert!(is_excel_path(Path::new("book.xlsm")));
        assert!(!is_excel_path(Path::new("data.csv")));
        assert!(!is_excel_path(Path::new("data")));
    }

    #[test]
    fn infer_whole_floats_as_int() {
        let cells_owned = vec![Data::Float(1.0), Data::Float(2.0)];
        let cells: Vec<Option<&Data>> = cells_owned.iter().map(Some).collect();
        assert_eq!(infer_column_type(&cells), ColType::Int64);
    }

    #[test]
    fn infer_fractional_floats_as_float() {
        let cells_owned = vec![Data::Float(1.5), Data::Float(2.0)];
        let cells: Vec<Option<&Data>> = cells_owned.iter().map(Some).collect();
        assert_eq!(infer_column_type(&cells), ColType::Float64);
    }

    #[test]
    fn infer_mixed_string_as_text() {
        let cells_owned = vec![Data::String("abc".into()), Data::Float(1.0)];
        let cells: Vec<Option<&Data>> = cells_owned.iter().map(Some).collect();
        assert_eq!(infer_column_type(&cells), ColType::Utf8);
    }

    #[test]
    fn infer_iso_date_strings_as_date() {
        let cells_owned = vec![
            Data::String("2024-01-01".into()),
            Data::String("2024-02-15".into()),
        ];
        let cells: Vec<Option<&Data>> = cells_owned.iter().map(Some).collect();
        assert_eq!(infer_column_type(&cells), ColType::Date);
    }

    #[test]
    fn parse_datetime_formats() {
        assert!(parse_naive_datetime_str("2024-01-01").is_some());
        assert!(parse_naive_datetime_str("2024-01-01 12:30:00").is_some());
        assert!(parse_naive_datetime_str("2024-01-01T12:30:00.250").is_some());
        assert!(parse_naive_datetime_str("not a date").is_none());
        assert!(parse_naive_datetime_str("").is_none());
    }
}
