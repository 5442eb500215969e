// src/error.rs
use thiserror::Error;

/// Everything that can go wrong while harvesting.
///
/// Only `Transport` and `MaxRetriesExceeded` end a chain; `MalformedValue`
/// drops a single field and the record still emits.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("Max retries exceeded for URL: {0}")]
    MaxRetriesExceeded(String),
    #[error("Malformed value for {field}: {raw:?}")]
    MalformedValue { field: &'static str, raw: String },
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl HarvestError {
    pub fn malformed(field: &'static str, raw: impl Into<String>) -> Self {
        HarvestError::MalformedValue {
            field,
            raw: raw.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
