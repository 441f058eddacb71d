pub mod backtest;
pub mod cagr_history;
