pub mod cagr;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod performance;
pub mod regime;
pub mod report;
pub mod series_loader;
pub mod simulation;

pub use error::{EngineError, EngineResult};
pub use regime::classify;
pub use simulation::{run_backtest, simulate, Simulator};
