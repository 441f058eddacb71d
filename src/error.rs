use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("no CAGR records to simulate or summarize; the price series must be longer than the CAGR window")]
    EmptyTrace,

    #[error("invalid price {price} at index {index} ({date}); prices must be finite and positive")]
    InvalidPrice {
        index: usize,
        date: NaiveDate,
        price: f64,
    },

    #[error("invalid backtest configuration: {0}")]
    InvalidConfig(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
