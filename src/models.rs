use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Market regime derived from the trailing one-year CAGR, ordered from most
/// bearish to most bullish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    ExtremeBearish,
    Bearish,
    SidewaysBearish,
    Neutral,
    Bullish,
    ExtremeBullish,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::ExtremeBearish,
        Category::Bearish,
        Category::SidewaysBearish,
        Category::Neutral,
        Category::Bullish,
        Category::ExtremeBullish,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::ExtremeBearish => "Extreme Bearish",
            Category::Bearish => "Bearish",
            Category::SidewaysBearish => "Sideways Bearish",
            Category::Neutral => "Neutral",
            Category::Bullish => "Bullish",
            Category::ExtremeBullish => "Extreme Bullish",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CagrRecord {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub cagr: f64,
    pub category: Category,
}

/// Running capital and position state of a single simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub cash: f64,
    pub total_units: f64,
    pub invested: f64,
    pub withdrawn: f64,
}

impl SimulationState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            total_units: 0.0,
            invested: 0.0,
            withdrawn: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStepRecord {
    pub date: NaiveDate,
    pub category: Category,
    pub close_price: f64,
    pub units_bought: f64,
    pub units_sold: f64,
    pub total_units_held: f64,
    pub portfolio_value: f64,
    pub total_invested: f64,
    pub total_withdrawn: f64,
    pub remaining_cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    /// Position value at the last step, excluding cash and withdrawals.
    pub final_portfolio_value: f64,
    pub remaining_cash: f64,
    pub total_invested: f64,
    pub total_withdrawn: f64,
    pub net_profit: f64,
    pub annualized_cagr: f64,
    /// Position value plus remaining cash plus everything withdrawn.
    pub final_value: f64,
    pub years: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutcome {
    pub trace: Vec<SimulationStepRecord>,
    pub summary: SummaryReport,
}

/// Everything a report needs from one backtest: the CAGR history that drove
/// the simulation, the step trace and the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub cagr_history: Vec<CagrRecord>,
    pub trace: Vec<SimulationStepRecord>,
    pub summary: SummaryReport,
}
