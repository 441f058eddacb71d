use crate::error::{EngineError, EngineResult};
use crate::models::Category;
use anyhow::{anyhow, Result};

pub const DEFAULT_WINDOW: usize = 250;
pub const DEFAULT_ANNUALIZATION_DAYS: f64 = 252.0;
pub const DEFAULT_INITIAL_CAPITAL: f64 = 2_500_000.0;
pub const DAYS_PER_YEAR: f64 = 365.25;

pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_SKIP_ROWS: u32 = 2;
pub const DEFAULT_COLUMN_RANGE: &str = "B:F";

/// Buy `units` when the step's category matches and cash covers the cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyRule {
    pub category: Category,
    pub units: f64,
}

/// Sell `units` when the step's category matches and more than
/// `min_units_held` units are held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellRule {
    pub category: Category,
    pub units: f64,
    pub min_units_held: f64,
}

/// Engine parameters. The defaults are the fixed contract of the report;
/// other values exist for tests.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Observations between entry and exit of one CAGR sample.
    pub window: usize,
    /// Numerator of the annualization exponent (`annualization_days / window`).
    pub annualization_days: f64,
    pub initial_capital: f64,
    /// Evaluated in order; the first matching affordable rule wins.
    pub buy_rules: Vec<BuyRule>,
    /// Evaluated in order; the first matching rule wins.
    pub sell_rules: Vec<SellRule>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            annualization_days: DEFAULT_ANNUALIZATION_DAYS,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            buy_rules: vec![
                BuyRule {
                    category: Category::ExtremeBearish,
                    units: 2.0,
                },
                BuyRule {
                    category: Category::Bearish,
                    units: 1.0,
                },
                BuyRule {
                    category: Category::SidewaysBearish,
                    units: 0.5,
                },
            ],
            sell_rules: vec![
                SellRule {
                    category: Category::ExtremeBullish,
                    units: 1.0,
                    min_units_held: 0.5,
                },
                SellRule {
                    category: Category::Bullish,
                    units: 0.5,
                    min_units_held: 0.5,
                },
            ],
        }
    }
}

impl BacktestConfig {
    pub fn annualization_exponent(&self) -> f64 {
        self.annualization_days / self.window as f64
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.window == 0 {
            return Err(EngineError::InvalidConfig(
                "window must be at least one observation".to_string(),
            ));
        }
        if !self.annualization_days.is_finite() || self.annualization_days <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "annualization days must be positive (value: {})",
                self.annualization_days
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "initial capital must be finite and non-negative (value: {})",
                self.initial_capital
            )));
        }
        for rule in &self.buy_rules {
            if !rule.units.is_finite() || rule.units <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "buy units for {} must be positive (value: {})",
                    rule.category, rule.units
                )));
            }
        }
        for rule in &self.sell_rules {
            if !rule.units.is_finite() || rule.units <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "sell units for {} must be positive (value: {})",
                    rule.category, rule.units
                )));
            }
            if !rule.min_units_held.is_finite() || rule.min_units_held < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "minimum units held for {} must be non-negative (value: {})",
                    rule.category, rule.min_units_held
                )));
            }
        }
        Ok(())
    }
}

/// Where the price table sits inside an input workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    pub sheet_name: String,
    /// Rows above the header row.
    pub skip_rows: u32,
    /// Zero-based, inclusive column bounds.
    pub first_column: u32,
    pub last_column: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let (first_column, last_column) = parse_column_range(DEFAULT_COLUMN_RANGE)
            .unwrap_or((1, 5));
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            skip_rows: DEFAULT_SKIP_ROWS,
            first_column,
            last_column,
        }
    }
}

impl LoaderConfig {
    pub fn with_column_range(mut self, raw: &str) -> Result<Self> {
        let (first_column, last_column) = parse_column_range(raw)?;
        self.first_column = first_column;
        self.last_column = last_column;
        Ok(self)
    }
}

/// Parses a spreadsheet column span such as `B:F` into zero-based bounds.
pub fn parse_column_range(raw: &str) -> Result<(u32, u32)> {
    let trimmed = raw.trim();
    let (start, end) = match trimmed.split_once(':') {
        Some((start, end)) => (start, end),
        None => (trimmed, trimmed),
    };
    let first = column_index(start)
        .ok_or_else(|| anyhow!("Column range must look like B:F (value: {})", raw))?;
    let last = column_index(end)
        .ok_or_else(|| anyhow!("Column range must look like B:F (value: {})", raw))?;
    if last < first {
        return Err(anyhow!(
            "Column range end must not precede its start (value: {})",
            raw
        ));
    }
    Ok((first, last))
}

fn column_index(letters: &str) -> Option<u32> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}
