use crate::models::{BacktestRun, CagrRecord, SimulationStepRecord, SummaryReport};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const CAGR_SHEET: &str = "Historical Data with CAGR";
pub const BACKTEST_SHEET: &str = "Backtesting Results";
pub const SUMMARY_SHEET: &str = "Performance Summary";

pub const CAGR_HEADERS: [&str; 6] = [
    "Date",
    "Close",
    "Exit Date",
    "Exit Price",
    "Annualized CAGR",
    "Category",
];
pub const BACKTEST_HEADERS: [&str; 10] = [
    "Date",
    "Category",
    "Close Price",
    "Units Bought",
    "Units Sold",
    "Total Units Held",
    "Portfolio Value",
    "Total Invested",
    "Total Withdrawn",
    "Remaining Cash",
];
/// Years an Excel date cell can hold; other dates are written as ISO text.
const EXCEL_YEARS: RangeInclusive<i32> = 1900..=9999;

pub const SUMMARY_HEADERS: [&str; 2] = ["Metric", "Value"];
pub const SUMMARY_METRICS: [&str; 6] = [
    "Final Portfolio Value",
    "Remaining Cash",
    "Total Invested",
    "Total Withdrawn",
    "Net Profit",
    "CAGR (on 25L)",
];

const DATE_FORMAT: &str = "yyyy-mm-dd";

#[derive(Debug, Clone, PartialEq)]
pub enum ReportValue {
    Date(NaiveDate),
    Number(f64),
    Text(String),
}

impl ReportValue {
    fn to_csv_field(&self) -> String {
        match self {
            ReportValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            ReportValue::Number(value) => value.to_string(),
            ReportValue::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<ReportValue>>,
}

pub fn cagr_history_table(records: &[CagrRecord]) -> ReportTable {
    ReportTable {
        name: CAGR_SHEET,
        headers: CAGR_HEADERS.to_vec(),
        rows: records
            .iter()
            .map(|record| {
                vec![
                    ReportValue::Date(record.entry_date),
                    ReportValue::Number(record.entry_price),
                    ReportValue::Date(record.exit_date),
                    ReportValue::Number(record.exit_price),
                    ReportValue::Number(record.cagr),
                    ReportValue::Text(record.category.label().to_string()),
                ]
            })
            .collect(),
    }
}

pub fn backtest_table(trace: &[SimulationStepRecord]) -> ReportTable {
    ReportTable {
        name: BACKTEST_SHEET,
        headers: BACKTEST_HEADERS.to_vec(),
        rows: trace
            .iter()
            .map(|step| {
                vec![
                    ReportValue::Date(step.date),
                    ReportValue::Text(step.category.label().to_string()),
                    ReportValue::Number(step.close_price),
                    ReportValue::Number(step.units_bought),
                    ReportValue::Number(step.units_sold),
                    ReportValue::Number(step.total_units_held),
                    ReportValue::Number(step.portfolio_value),
                    ReportValue::Number(step.total_invested),
                    ReportValue::Number(step.total_withdrawn),
                    ReportValue::Number(step.remaining_cash),
                ]
            })
            .collect(),
    }
}

pub fn summary_table(summary: &SummaryReport) -> ReportTable {
    let values = [
        summary.final_portfolio_value,
        summary.remaining_cash,
        summary.total_invested,
        summary.total_withdrawn,
        summary.net_profit,
        summary.annualized_cagr,
    ];
    ReportTable {
        name: SUMMARY_SHEET,
        headers: SUMMARY_HEADERS.to_vec(),
        rows: SUMMARY_METRICS
            .iter()
            .zip(values)
            .map(|(metric, value)| {
                vec![
                    ReportValue::Text(metric.to_string()),
                    ReportValue::Number(value),
                ]
            })
            .collect(),
    }
}

/// The three report tables in sheet order.
pub fn report_tables(run: &BacktestRun) -> Vec<ReportTable> {
    vec![
        cagr_history_table(&run.cagr_history),
        backtest_table(&run.trace),
        summary_table(&run.summary),
    ]
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create report directory {}", parent.display())
            })?;
        }
    }
    Ok(())
}

/// Writes each table to its own sheet, replacing any existing file.
pub fn write_workbook(path: &Path, tables: &[ReportTable]) -> Result<()> {
    ensure_parent_dir(path)?;

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format(DATE_FORMAT);

    for table in tables {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(table.name)
            .with_context(|| format!("Invalid sheet name '{}'", table.name))?;

        for (col, header) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
            worksheet.set_column_width(col as u16, column_width(header))?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            let row_num = (row_idx + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let col = col as u16;
                match value {
                    ReportValue::Date(date) if EXCEL_YEARS.contains(&date.year()) => {
                        let excel_date = ExcelDateTime::from_ymd(
                            date.year() as u16,
                            date.month() as u8,
                            date.day() as u8,
                        )?;
                        worksheet.write_datetime_with_format(row_num, col, &excel_date, &date_format)?;
                    }
                    ReportValue::Date(date) => {
                        worksheet.write_string(row_num, col, date.format("%Y-%m-%d").to_string())?;
                    }
                    ReportValue::Number(number) => {
                        worksheet.write_number(row_num, col, *number)?;
                    }
                    ReportValue::Text(text) => {
                        worksheet.write_string(row_num, col, text.as_str())?;
                    }
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Unable to write report workbook {}", path.display()))?;
    Ok(())
}

fn column_width(header: &str) -> f64 {
    (header.len() as f64 + 4.0).max(12.0)
}

/// Writes every table as `<stem>_<sheet name>.csv` inside `dir`.
pub fn write_csv_tables(dir: &Path, stem: &str, tables: &[ReportTable]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let file_name = format!("{}_{}.csv", stem, table.name.replace(' ', "_"));
        let path = dir.join(file_name);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Unable to create {}", path.display()))?;
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(ReportValue::to_csv_field))?;
        }
        writer
            .flush()
            .with_context(|| format!("Unable to flush {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}
