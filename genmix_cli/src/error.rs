use genmix::error::GenmixError;

#[derive(thiserror::Error, Debug)]
pub enum GenmixCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("genmix error: {0}")]
    GenmixError(#[from] GenmixError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type GenmixCliResult<T> = Result<T, GenmixCliError>;
