use crate::config::DAYS_PER_YEAR;
use crate::error::{EngineError, EngineResult};
use crate::models::{SimulationStepRecord, SummaryReport};
use chrono::NaiveDate;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Summarizes a finished trace from its last step and the span between
    /// its first and last dates.
    pub fn summarize(
        trace: &[SimulationStepRecord],
        initial_capital: f64,
    ) -> EngineResult<SummaryReport> {
        let (Some(first), Some(last)) = (trace.first(), trace.last()) else {
            return Err(EngineError::EmptyTrace);
        };

        let start_date = trace.iter().map(|step| step.date).min().unwrap_or(first.date);
        let end_date = trace.iter().map(|step| step.date).max().unwrap_or(last.date);
        let years = Self::years_between(start_date, end_date);

        let final_value = last.portfolio_value + last.remaining_cash + last.total_withdrawn;
        let annualized_cagr = Self::calculate_cagr(initial_capital, final_value, years);

        Ok(SummaryReport {
            final_portfolio_value: last.portfolio_value,
            remaining_cash: last.remaining_cash,
            total_invested: last.total_invested,
            total_withdrawn: last.total_withdrawn,
            net_profit: final_value - initial_capital,
            annualized_cagr,
            final_value,
            years,
        })
    }

    pub fn years_between(start_date: NaiveDate, end_date: NaiveDate) -> f64 {
        (end_date - start_date).num_days() as f64 / DAYS_PER_YEAR
    }

    fn calculate_cagr(initial_capital: f64, final_value: f64, years: f64) -> f64 {
        if initial_capital <= 0.0 || !final_value.is_finite() {
            return 0.0;
        }

        // A single trading date leaves no span to annualize over.
        if years <= 0.0 {
            return 0.0;
        }

        (final_value / initial_capital).powf(1.0 / years) - 1.0
    }
}
