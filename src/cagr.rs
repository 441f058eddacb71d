use crate::config::BacktestConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{CagrRecord, PricePoint};
use crate::regime::classify;
use chrono::NaiveDate;

/// Annualized growth between two closes `window` observations apart.
/// `exponent` is `annualization_days / window` (252/250 by default).
pub fn annualized_cagr(entry_price: f64, exit_price: f64, exponent: f64) -> f64 {
    (exit_price / entry_price).powf(exponent) - 1.0
}

/// Lazily pairs every point with the one `window` observations later.
pub struct CagrWindows<'a> {
    points: &'a [PricePoint],
    window: usize,
    exponent: f64,
    next_index: usize,
}

impl<'a> CagrWindows<'a> {
    pub fn new(points: &'a [PricePoint], config: &BacktestConfig) -> Self {
        Self {
            points,
            window: config.window,
            exponent: config.annualization_exponent(),
            next_index: 0,
        }
    }

    fn sample_count(&self) -> usize {
        self.points.len().saturating_sub(self.window)
    }
}

impl Iterator for CagrWindows<'_> {
    type Item = EngineResult<CagrRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.window == 0 || self.next_index >= self.sample_count() {
            return None;
        }

        let entry_index = self.next_index;
        let exit_index = entry_index + self.window;
        self.next_index += 1;

        let entry = self.points[entry_index];
        let exit = self.points[exit_index];
        if let Err(err) = ensure_valid_price(entry_index, entry.date, entry.close) {
            return Some(Err(err));
        }
        if let Err(err) = ensure_valid_price(exit_index, exit.date, exit.close) {
            return Some(Err(err));
        }

        let cagr = annualized_cagr(entry.close, exit.close, self.exponent);
        Some(Ok(CagrRecord {
            entry_date: entry.date,
            entry_price: entry.close,
            exit_date: exit.date,
            exit_price: exit.close,
            cagr,
            category: classify(cagr),
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.window == 0 {
            0
        } else {
            self.sample_count().saturating_sub(self.next_index)
        };
        (remaining, Some(remaining))
    }
}

pub(crate) fn ensure_valid_price(index: usize, date: NaiveDate, price: f64) -> EngineResult<()> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidPrice { index, date, price })
    }
}

/// Builds the full rolling CAGR history. A series no longer than the window
/// produces an empty history rather than an error.
pub fn build_cagr_history(
    points: &[PricePoint],
    config: &BacktestConfig,
) -> EngineResult<Vec<CagrRecord>> {
    config.validate()?;
    CagrWindows::new(points, config).collect()
}
