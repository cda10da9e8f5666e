//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum GenmixError {
    #[error("No generation data available.")]
    NoData,
    #[error("Transient failure from data source: {0}")]
    TransientFetch(String),
    #[error("Data source request failed with status {status}: {body}")]
    PermanentFetch { status: u16, body: String },
    #[error("Invalid group configuration: {0}")]
    InvalidGroupConfig(String),
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Wrapped IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl GenmixError {
    /// Whether this error is the recoverable "nothing to show" condition.
    pub fn is_no_data(&self) -> bool {
        matches!(self, GenmixError::NoData)
    }
}

pub type GenmixResult<T> = Result<T, GenmixError>;
