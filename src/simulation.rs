use crate::cagr::{build_cagr_history, ensure_valid_price};
use crate::config::BacktestConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    BacktestOutcome, BacktestRun, CagrRecord, Category, PricePoint, SimulationState,
    SimulationStepRecord,
};
use crate::performance::PerformanceCalculator;
use log::debug;

/// Runs the regime-driven accumulation strategy over one CAGR history.
///
/// A simulator owns its state for the whole run; records are applied strictly
/// in order and nothing is rolled back.
pub struct Simulator<'a> {
    config: &'a BacktestConfig,
    state: SimulationState,
}

impl<'a> Simulator<'a> {
    pub fn new(config: &'a BacktestConfig) -> Self {
        Self {
            config,
            state: SimulationState::new(config.initial_capital),
        }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Applies one record and returns the resulting snapshot.
    pub fn step(&mut self, record: &CagrRecord) -> SimulationStepRecord {
        let price = record.entry_price;
        let category = record.category;

        let bought = self.buy_units(category, price);
        self.state.invested += bought * price;
        self.state.cash -= bought * price;

        // Sell eligibility looks at units held before this step's purchase.
        let sold = self.sell_units(category);
        self.state.withdrawn += sold * price;
        self.state.cash += sold * price;

        self.state.total_units += bought - sold;
        let portfolio_value = self.state.total_units * price;

        if bought > 0.0 || sold > 0.0 {
            debug!(
                "{} {}: bought {} sold {} at {:.2}, holding {} units, cash {:.2}",
                record.entry_date,
                category,
                bought,
                sold,
                price,
                self.state.total_units,
                self.state.cash
            );
        }

        SimulationStepRecord {
            date: record.entry_date,
            category,
            close_price: price,
            units_bought: bought,
            units_sold: sold,
            total_units_held: self.state.total_units,
            portfolio_value,
            total_invested: self.state.invested,
            total_withdrawn: self.state.withdrawn,
            remaining_cash: self.state.cash,
        }
    }

    fn buy_units(&self, category: Category, price: f64) -> f64 {
        self.config
            .buy_rules
            .iter()
            .find(|rule| rule.category == category && self.state.cash >= rule.units * price)
            .map(|rule| rule.units)
            .unwrap_or(0.0)
    }

    fn sell_units(&self, category: Category) -> f64 {
        self.config
            .sell_rules
            .iter()
            .find(|rule| {
                rule.category == category && self.state.total_units > rule.min_units_held
            })
            .map(|rule| rule.units)
            .unwrap_or(0.0)
    }

    /// Consumes the simulator, producing the full trace and its summary.
    /// Fails before touching any state if the input is empty or holds an
    /// unusable price.
    pub fn run(mut self, records: &[CagrRecord]) -> EngineResult<BacktestOutcome> {
        if records.is_empty() {
            return Err(EngineError::EmptyTrace);
        }
        for (index, record) in records.iter().enumerate() {
            ensure_valid_price(index, record.entry_date, record.entry_price)?;
        }

        let trace: Vec<SimulationStepRecord> =
            records.iter().map(|record| self.step(record)).collect();
        let summary = PerformanceCalculator::summarize(&trace, self.config.initial_capital)?;

        Ok(BacktestOutcome { trace, summary })
    }
}

pub fn simulate(records: &[CagrRecord], config: &BacktestConfig) -> EngineResult<BacktestOutcome> {
    config.validate()?;
    Simulator::new(config).run(records)
}

/// Full pipeline from a loaded price series to the report bundle.
pub fn run_backtest(points: &[PricePoint], config: &BacktestConfig) -> EngineResult<BacktestRun> {
    let cagr_history = build_cagr_history(points, config)?;
    let BacktestOutcome { trace, summary } = simulate(&cagr_history, config)?;
    Ok(BacktestRun {
        cagr_history,
        trace,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn record(day: i64, price: f64, category: Category) -> CagrRecord {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        CagrRecord {
            entry_date: start + Duration::days(day),
            entry_price: price,
            exit_date: start + Duration::days(day + 365),
            exit_price: price,
            cagr: 0.0,
            category,
        }
    }

    fn config_with_capital(initial_capital: f64) -> BacktestConfig {
        BacktestConfig {
            initial_capital,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn buys_by_category() {
        let config = BacktestConfig::default();
        let records = vec![
            record(0, 100.0, Category::ExtremeBearish),
            record(1, 100.0, Category::Bearish),
            record(2, 100.0, Category::SidewaysBearish),
            record(3, 100.0, Category::Neutral),
        ];
        let outcome = simulate(&records, &config).unwrap();
        let bought: Vec<f64> = outcome.trace.iter().map(|s| s.units_bought).collect();
        assert_eq!(bought, vec![2.0, 1.0, 0.5, 0.0]);

        let last = outcome.trace.last().unwrap();
        assert_eq!(last.total_units_held, 3.5);
        assert_eq!(last.total_invested, 350.0);
        assert_eq!(last.remaining_cash, 2_500_000.0 - 350.0);
        assert_eq!(last.portfolio_value, 350.0);
    }

    #[test]
    fn sells_only_above_half_unit() {
        let config = BacktestConfig::default();
        let records = vec![
            record(0, 100.0, Category::ExtremeBullish),
            record(1, 100.0, Category::SidewaysBearish),
            record(2, 120.0, Category::Bullish),
            record(3, 100.0, Category::Bearish),
            record(4, 150.0, Category::Bullish),
            record(5, 200.0, Category::ExtremeBullish),
        ];
        let outcome = simulate(&records, &config).unwrap();
        let sold: Vec<f64> = outcome.trace.iter().map(|s| s.units_sold).collect();
        // 0 units, then 0.5 units (not above 0.5), then 1.5, then 1.0 after selling half.
        assert_eq!(sold, vec![0.0, 0.0, 0.0, 0.0, 0.5, 1.0]);

        let last = outcome.trace.last().unwrap();
        assert_eq!(last.total_units_held, 0.0);
        assert_eq!(last.total_withdrawn, 75.0 + 200.0);
        assert_eq!(last.total_invested, 150.0);
        assert_eq!(last.remaining_cash, 2_500_000.0 - 150.0 + 275.0);
        assert_eq!(last.portfolio_value, 0.0);
    }

    #[test]
    fn sell_threshold_uses_units_held_before_buy() {
        // One unit bought on a Bearish day does not count toward that day's
        // sell check, and a category can never both buy and sell in one step.
        let config = BacktestConfig::default();
        let outcome = simulate(&[record(0, 100.0, Category::Bearish)], &config).unwrap();
        assert_eq!(outcome.trace[0].units_sold, 0.0);
        assert_eq!(outcome.trace[0].total_units_held, 1.0);
    }

    #[test]
    fn extreme_bearish_without_cash_skips_buy() {
        let config = config_with_capital(150.0);
        let outcome = simulate(&[record(0, 100.0, Category::ExtremeBearish)], &config).unwrap();
        let step = &outcome.trace[0];
        assert_eq!(step.units_bought, 0.0);
        assert_eq!(step.remaining_cash, 150.0);
        assert_eq!(step.total_invested, 0.0);
        assert_eq!(step.total_units_held, 0.0);
    }

    #[test]
    fn runs_out_of_cash_then_stops_buying() {
        let config = config_with_capital(250.0);
        let records: Vec<CagrRecord> = (0..5)
            .map(|day| record(day, 100.0, Category::Bearish))
            .collect();
        let outcome = simulate(&records, &config).unwrap();
        let bought: Vec<f64> = outcome.trace.iter().map(|s| s.units_bought).collect();
        assert_eq!(bought, vec![1.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(outcome.summary.remaining_cash, 50.0);
    }

    #[test]
    fn cash_and_units_never_go_negative() {
        let config = config_with_capital(1_000.0);
        let categories = Category::ALL;
        let records: Vec<CagrRecord> = (0..600)
            .map(|day| {
                let price = 80.0 + ((day as f64) / 7.0).sin() * 40.0;
                let category = categories[(day as usize * 7 + day as usize / 3) % categories.len()];
                record(day, price, category)
            })
            .collect();
        let outcome = simulate(&records, &config).unwrap();
        for step in &outcome.trace {
            assert!(step.remaining_cash >= 0.0, "cash went negative on {}", step.date);
            assert!(step.total_units_held >= 0.0, "units went negative on {}", step.date);
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let config = BacktestConfig::default();
        let records: Vec<CagrRecord> = (0..300)
            .map(|day| {
                let category = Category::ALL[(day as usize) % 6];
                record(day, 50.0 + day as f64 * 0.37, category)
            })
            .collect();
        let first = simulate(&records, &config).unwrap();
        let second = simulate(&records, &config).unwrap();
        assert_eq!(first, second);
        for (a, b) in first.trace.iter().zip(&second.trace) {
            assert_eq!(a.remaining_cash.to_bits(), b.remaining_cash.to_bits());
            assert_eq!(a.portfolio_value.to_bits(), b.portfolio_value.to_bits());
        }
        assert_eq!(
            first.summary.annualized_cagr.to_bits(),
            second.summary.annualized_cagr.to_bits()
        );
    }

    #[test]
    fn empty_records_fail_without_output() {
        let err = simulate(&[], &BacktestConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyTrace));

        // The error is the same whatever window produced the empty history.
        let config = BacktestConfig {
            window: 5,
            ..BacktestConfig::default()
        };
        assert_eq!(simulate(&[], &config).unwrap_err(), EngineError::EmptyTrace);
    }

    #[test]
    fn invalid_entry_price_fails_fast() {
        let records = vec![
            record(0, 100.0, Category::Bearish),
            record(1, 0.0, Category::Bearish),
        ];
        let err = simulate(&records, &BacktestConfig::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidPrice {
                index: 1,
                date: records[1].entry_date,
                price: 0.0,
            }
        );
    }

    #[test]
    fn summary_counts_withdrawals_in_final_value() {
        let config = BacktestConfig::default();
        let records = vec![
            record(0, 100.0, Category::ExtremeBearish),
            record(730, 200.0, Category::ExtremeBullish),
        ];
        let outcome = simulate(&records, &config).unwrap();
        let summary = &outcome.summary;
        assert_eq!(summary.final_portfolio_value, 200.0);
        assert_eq!(summary.total_withdrawn, 200.0);
        assert_eq!(summary.remaining_cash, 2_500_000.0);
        assert_eq!(summary.final_value, 2_500_400.0);
        assert_relative_eq!(summary.net_profit, 400.0);
        let years = 730.0 / 365.25;
        assert_relative_eq!(
            summary.annualized_cagr,
            (2_500_400.0f64 / 2_500_000.0).powf(1.0 / years) - 1.0,
            epsilon = 1e-15
        );
    }

    #[test]
    fn sideways_scenario_from_rising_series() {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let points: Vec<PricePoint> = (0..252)
            .map(|idx| PricePoint {
                date: start + Duration::days(idx),
                close: if idx >= 250 { 106.0 } else { 100.0 },
            })
            .collect();
        let run = run_backtest(&points, &BacktestConfig::default()).unwrap();

        assert_eq!(run.cagr_history.len(), 2);
        assert_relative_eq!(run.cagr_history[0].cagr, 0.0605, epsilon = 1e-3);
        assert_eq!(run.cagr_history[0].category, Category::SidewaysBearish);

        let first = &run.trace[0];
        assert_eq!(first.units_bought, 0.5);
        assert_eq!(first.total_invested, 50.0);
        assert_eq!(first.remaining_cash, 2_499_950.0);
        assert_eq!(run.trace[1].units_bought, 0.5);
        assert_eq!(run.summary.total_invested, 100.0);
    }

    #[test]
    fn short_series_yields_empty_trace_error() {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let points: Vec<PricePoint> = (0..250)
            .map(|idx| PricePoint {
                date: start + Duration::days(idx),
                close: 100.0,
            })
            .collect();
        let err = run_backtest(&points, &BacktestConfig::default()).unwrap_err();
        assert_eq!(err, EngineError::EmptyTrace);
    }

    #[test]
    fn step_exposes_running_state() {
        let config = BacktestConfig::default();
        let mut simulator = Simulator::new(&config);
        simulator.step(&record(0, 100.0, Category::Bearish));
        assert_eq!(simulator.state().total_units, 1.0);
        assert_eq!(simulator.state().invested, 100.0);
        assert_eq!(simulator.state().cash, 2_499_900.0);
    }
}
