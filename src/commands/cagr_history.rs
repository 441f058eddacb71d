use crate::cagr::build_cagr_history;
use crate::config::{BacktestConfig, LoaderConfig};
use crate::models::Category;
use crate::report::{cagr_history_table, write_workbook};
use crate::series_loader::load_price_series;
use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::path::Path;

/// Writes only the rolling CAGR sheet and returns how many records fell into
/// each regime.
pub fn run(input: &Path, output: &Path, loader: &LoaderConfig) -> Result<BTreeMap<Category, usize>> {
    let config = BacktestConfig::default();
    let series = load_price_series(input, loader)?;
    let history = build_cagr_history(&series.points, &config)
        .with_context(|| format!("Unable to build CAGR history for {}", input.display()))?;

    let mut counts: BTreeMap<Category, usize> = Category::ALL.iter().map(|c| (*c, 0)).collect();
    for record in &history {
        *counts.entry(record.category).or_default() += 1;
    }

    write_workbook(output, &[cagr_history_table(&history)])?;
    info!(
        "Wrote {} CAGR records for {} to {}",
        history.len(),
        input.display(),
        output.display()
    );
    for (category, count) in &counts {
        info!("  {:<16} {}", category.label(), count);
    }

    Ok(counts)
}
