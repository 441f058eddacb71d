use crate::config::LoaderConfig;
use crate::error::EngineError;
use crate::models::PricePoint;
use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{info, warn};
use std::path::Path;

pub const DATE_COLUMN: &str = "Date";
pub const CLOSE_COLUMN: &str = "Close";

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

/// Header plus data rows as read from a sheet or CSV file, before any typing.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub points: Vec<PricePoint>,
    pub dropped_rows: usize,
}

/// Reads a price series from a workbook or CSV file, choosing the reader by
/// file extension.
pub fn load_price_series(path: &Path, config: &LoaderConfig) -> Result<LoadedSeries> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" => read_csv_table(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook_table(path, config)?,
        other => {
            return Err(anyhow!(
                "Unsupported input format '{}' for {}; expected .xlsx, .xls, .ods or .csv",
                other,
                path.display()
            ))
        }
    };

    let series = series_from_table(&table)
        .with_context(|| format!("Invalid price data in {}", path.display()))?;
    if series.dropped_rows > 0 {
        warn!(
            "Dropped {} row(s) without a usable date or close from {}",
            series.dropped_rows,
            path.display()
        );
    }
    info!(
        "Loaded {} price points from {}",
        series.points.len(),
        path.display()
    );
    Ok(series)
}

pub fn read_workbook_table(path: &Path, config: &LoaderConfig) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Unable to open workbook {}", path.display()))?;
    let range = workbook.worksheet_range(&config.sheet_name).with_context(|| {
        format!(
            "Unable to read sheet '{}' from {}",
            config.sheet_name,
            path.display()
        )
    })?;

    let Some((last_row, _)) = range.end() else {
        return Ok(RawTable::default());
    };
    if config.skip_rows > last_row {
        return Ok(RawTable::default());
    }

    let cell_at = |row: u32, col: u32| -> RawCell {
        range
            .get_value((row, col))
            .map(raw_cell_from_data)
            .unwrap_or(RawCell::Empty)
    };

    let header_row = config.skip_rows;
    let headers = (config.first_column..=config.last_column)
        .map(|col| match cell_at(header_row, col) {
            RawCell::Text(text) => text,
            RawCell::Number(value) => value.to_string(),
            RawCell::Date(date) => date.to_string(),
            RawCell::Empty => String::new(),
        })
        .collect();

    let rows = ((header_row + 1)..=last_row)
        .map(|row| {
            (config.first_column..=config.last_column)
                .map(|col| cell_at(row, col))
                .collect()
        })
        .collect();

    Ok(RawTable { headers, rows })
}

fn raw_cell_from_data(data: &Data) -> RawCell {
    match data {
        Data::Empty => RawCell::Empty,
        Data::Int(value) => RawCell::Number(*value as f64),
        Data::Float(value) => RawCell::Number(*value),
        Data::String(text) => {
            if text.trim().is_empty() {
                RawCell::Empty
            } else {
                RawCell::Text(text.clone())
            }
        }
        Data::DateTime(value) => excel_serial_to_date(value.as_f64())
            .map(RawCell::Date)
            .unwrap_or(RawCell::Empty),
        Data::DateTimeIso(text) => RawCell::Text(text.clone()),
        Data::Bool(_) | Data::DurationIso(_) | Data::Error(_) => RawCell::Empty,
    }
}

pub fn read_csv_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open CSV file {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Unable to read CSV header from {}", path.display()))?
        .iter()
        .map(|header| header.to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!("Malformed CSV record {} in {}", line + 2, path.display())
        })?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(RawTable { headers, rows })
}

/// Types the `Date` and `Close` columns, drops rows missing either, sorts by
/// date and rejects duplicate dates and non-positive closes.
pub fn series_from_table(table: &RawTable) -> Result<LoadedSeries> {
    let date_idx = find_column(&table.headers, DATE_COLUMN)?;
    let close_idx = find_column(&table.headers, CLOSE_COLUMN)?;

    let mut points = Vec::with_capacity(table.rows.len());
    let mut dropped_rows = 0usize;
    for row in &table.rows {
        let date = row.get(date_idx).and_then(parse_date_cell);
        let close = row.get(close_idx).and_then(parse_close_cell);
        match (date, close) {
            (Some(date), Some(close)) => points.push(PricePoint { date, close }),
            _ => dropped_rows += 1,
        }
    }

    points.sort_by_key(|point| point.date);

    for pair in points.windows(2) {
        if pair[0].date == pair[1].date {
            return Err(anyhow!("Duplicate date {} in price series", pair[0].date));
        }
    }
    for (index, point) in points.iter().enumerate() {
        if !point.close.is_finite() || point.close <= 0.0 {
            return Err(EngineError::InvalidPrice {
                index,
                date: point.date,
                price: point.close,
            }
            .into());
        }
    }

    Ok(LoadedSeries {
        points,
        dropped_rows,
    })
}

fn find_column(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            let found: Vec<&str> = headers
                .iter()
                .map(|header| header.trim())
                .filter(|header| !header.is_empty())
                .collect();
            anyhow!(
                "Missing required column '{}' (found: {})",
                name,
                if found.is_empty() {
                    "no headers".to_string()
                } else {
                    found.join(", ")
                }
            )
        })
}

fn parse_date_cell(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::Date(date) => Some(*date),
        RawCell::Number(serial) => excel_serial_to_date(*serial),
        RawCell::Text(text) => parse_date_text(text),
        RawCell::Empty => None,
    }
}

pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    // Trailing time or fractional seconds we do not know the format of.
    let head = text.split(|c: char| c == 'T' || c.is_whitespace()).next()?;
    if head.len() == text.len() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(head, format).ok())
}

/// Converts an Excel serial day number (1900 date system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_close_cell(cell: &RawCell) -> Option<f64> {
    match cell {
        RawCell::Number(value) => Some(*value).filter(|value| !value.is_nan()),
        RawCell::Text(text) => {
            let cleaned: String = text
                .trim()
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok().filter(|value| !value.is_nan())
        }
        RawCell::Date(_) | RawCell::Empty => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn text(value: &str) -> RawCell {
        RawCell::Text(value.to_string())
    }

    fn table(headers: &[&str], rows: Vec<Vec<RawCell>>) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn normalizes_headers_and_drops_incomplete_rows() {
        let table = table(
            &[" Open ", " Date", "Close  ", "Volume"],
            vec![
                vec![RawCell::Number(1.0), text("2021-01-04"), RawCell::Number(101.5), RawCell::Empty],
                vec![RawCell::Number(1.0), text("not a date"), RawCell::Number(102.0), RawCell::Empty],
                vec![RawCell::Number(1.0), text("2021-01-05"), RawCell::Empty, RawCell::Empty],
                vec![RawCell::Number(1.0), text("06/01/2021"), text("1,203.25"), RawCell::Empty],
            ],
        );

        let series = series_from_table(&table).unwrap();
        assert_eq!(series.dropped_rows, 2);
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].close, 101.5);
        assert_eq!(
            series.points[1].date,
            NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
        );
        assert_eq!(series.points[1].close, 1203.25);
    }

    #[test]
    fn sorts_points_by_date() {
        let table = table(
            &["Date", "Close"],
            vec![
                vec![text("2021-03-01"), RawCell::Number(3.0)],
                vec![RawCell::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()), RawCell::Number(1.0)],
                vec![RawCell::Number(44228.0), RawCell::Number(2.0)],
            ],
        );
        let series = series_from_table(&table).unwrap();
        let closes: Vec<f64> = series.points.iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert_eq!(
            series.points[1].date,
            NaiveDate::from_ymd_opt(2021, 2, 1).unwrap()
        );
    }

    #[test]
    fn rejects_duplicate_dates() {
        let table = table(
            &["Date", "Close"],
            vec![
                vec![text("2021-01-04"), RawCell::Number(1.0)],
                vec![text("2021-01-04 00:00:00"), RawCell::Number(2.0)],
            ],
        );
        let err = series_from_table(&table).unwrap_err();
        assert!(err.to_string().contains("Duplicate date"));
    }

    #[test]
    fn rejects_non_positive_close() {
        let table = table(
            &["Date", "Close"],
            vec![
                vec![text("2021-01-04"), RawCell::Number(10.0)],
                vec![text("2021-01-05"), RawCell::Number(0.0)],
            ],
        );
        let err = series_from_table(&table).unwrap_err();
        let engine_err = err.downcast_ref::<EngineError>().unwrap();
        assert!(matches!(engine_err, EngineError::InvalidPrice { index: 1, .. }));
    }

    #[test]
    fn reports_missing_columns() {
        let table = table(&["Day", "Price"], Vec::new());
        let err = series_from_table(&table).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'Date'"));
        assert!(message.contains("Day, Price"));
    }

    #[test]
    fn parses_common_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2022, 3, 15).unwrap();
        assert_eq!(parse_date_text("2022-03-15"), Some(expected));
        assert_eq!(parse_date_text("15-03-2022"), Some(expected));
        assert_eq!(parse_date_text("15-Mar-2022"), Some(expected));
        assert_eq!(parse_date_text("03/15/2022"), Some(expected));
        assert_eq!(parse_date_text("15/03/2022"), Some(expected));
        // Slash dates that read both ways are month-first.
        assert_eq!(parse_date_text("06/01/2021"), NaiveDate::from_ymd_opt(2021, 6, 1));
        assert_eq!(parse_date_text("12/31/2021"), NaiveDate::from_ymd_opt(2021, 12, 31));
        assert_eq!(parse_date_text("2022-03-15T09:30:00"), Some(expected));
        assert_eq!(parse_date_text("2022-03-15 09:30:00.250"), Some(expected));
        assert_eq!(parse_date_text("soon"), None);
        assert_eq!(parse_date_text(""), None);
    }

    #[test]
    fn converts_excel_serials() {
        assert_eq!(
            excel_serial_to_date(44197.0),
            NaiveDate::from_ymd_opt(2021, 1, 1)
        );
        assert_eq!(
            excel_serial_to_date(44197.75),
            NaiveDate::from_ymd_opt(2021, 1, 1)
        );
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn loads_csv_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(
            &path,
            "Date,Open,Close\n2020-01-02,1,100.5\n2020-01-03,1,\n2020-01-06,1,101\n",
        )
        .unwrap();

        let series = load_price_series(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.dropped_rows, 1);
        assert_eq!(series.points[1].close, 101.0);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = load_price_series(Path::new("prices.txt"), &LoaderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Unsupported input format"));
    }
}
