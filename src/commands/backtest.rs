use crate::config::{BacktestConfig, LoaderConfig};
use crate::models::SummaryReport;
use crate::report::{report_tables, write_csv_tables, write_workbook};
use crate::series_loader::load_price_series;
use crate::simulation::run_backtest;
use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const REPORT_FILE_NAME: &str = "Backtest_Result.xlsx";

#[derive(Debug, Clone)]
pub struct BacktestOptions {
    pub output_dir: PathBuf,
    pub loader: LoaderConfig,
    pub write_csv: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedBacktest {
    pub input: PathBuf,
    pub report: PathBuf,
    pub price_points: usize,
    pub cagr_records: usize,
    pub summary: SummaryReport,
}

/// Report path for one input. A lone input keeps the fixed report name;
/// several inputs get the input's stem as a prefix so they do not collide.
pub fn report_path_for(input: &Path, output_dir: &Path, batch: bool) -> PathBuf {
    if !batch {
        return output_dir.join(REPORT_FILE_NAME);
    }
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("input");
    output_dir.join(format!("{}_{}", stem, REPORT_FILE_NAME))
}

pub fn run(inputs: &[PathBuf], options: &BacktestOptions) -> Result<Vec<CompletedBacktest>> {
    if inputs.is_empty() {
        return Err(anyhow!("At least one input file is required"));
    }

    let config = BacktestConfig::default();
    if inputs.len() == 1 {
        let report = report_path_for(&inputs[0], &options.output_dir, false);
        let completed = backtest_file(&inputs[0], &report, &config, options)?;
        return Ok(vec![completed]);
    }

    ensure_unique_stems(inputs)?;
    info!("Running {} backtests in parallel", inputs.len());

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .map_err(|err| anyhow!("Invalid progress bar template: {}", err))?
            .progress_chars("#>-"),
    );

    // Each run owns its simulator; nothing is shared between inputs.
    let outcomes: Vec<(PathBuf, Result<CompletedBacktest>)> = inputs
        .par_iter()
        .map(|input| {
            let report = report_path_for(input, &options.output_dir, true);
            let outcome = backtest_file(input, &report, &config, options);
            pb.inc(1);
            (input.clone(), outcome)
        })
        .collect();

    let mut completed = Vec::with_capacity(outcomes.len());
    let mut failures = 0usize;
    for (input, outcome) in outcomes {
        match outcome {
            Ok(done) => completed.push(done),
            Err(err) => {
                failures += 1;
                warn!("Backtest for {} failed: {:#}", input.display(), err);
            }
        }
    }

    if failures > 0 {
        pb.finish_with_message("Backtesting completed with errors");
        return Err(anyhow!(
            "{} of {} backtests failed",
            failures,
            inputs.len()
        ));
    }
    pb.finish_with_message("Backtesting completed");

    Ok(completed)
}

fn ensure_unique_stems(inputs: &[PathBuf]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for input in inputs {
        let stem = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("input")
            .to_string();
        if !seen.insert(stem.clone()) {
            return Err(anyhow!(
                "Inputs share the file name '{}'; their reports would overwrite each other",
                stem
            ));
        }
    }
    Ok(())
}

pub fn backtest_file(
    input: &Path,
    report: &Path,
    config: &BacktestConfig,
    options: &BacktestOptions,
) -> Result<CompletedBacktest> {
    let started = Instant::now();
    let series = load_price_series(input, &options.loader)?;
    if series.points.len() <= config.window {
        warn!(
            "{} has {} price points; at least {} are needed for one CAGR sample",
            input.display(),
            series.points.len(),
            config.window + 1
        );
    }

    let run = run_backtest(&series.points, config)
        .with_context(|| format!("Backtest rejected for {}", input.display()))?;

    let tables = report_tables(&run);
    write_workbook(report, &tables)?;
    if options.write_csv {
        let stem = report
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("report");
        let dir = report.parent().unwrap_or_else(|| Path::new("."));
        let written = write_csv_tables(dir, stem, &tables)?;
        info!("Wrote {} CSV tables next to {}", written.len(), report.display());
    }

    info!(
        "Backtest for {} finished in {:.2}s: final value {:.2}, net profit {:.2}, CAGR {:.4}; report at {}",
        input.display(),
        started.elapsed().as_secs_f64(),
        run.summary.final_value,
        run.summary.net_profit,
        run.summary.annualized_cagr,
        report.display()
    );

    Ok(CompletedBacktest {
        input: input.to_path_buf(),
        report: report.to_path_buf(),
        price_points: series.points.len(),
        cagr_records: run.cagr_history.len(),
        summary: run.summary,
    })
}
