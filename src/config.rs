// src/config.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{HarvestError, Result};

// --- Configuration ---
pub const CONCURRENT_REQUESTS: usize = 10;
pub const REQUEST_DELAY_MS: u64 = 500;
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY_MS: u64 = 500;
pub const TIMEOUT_SECS: u64 = 30;
pub const BASE_URL: &str = "https://www.etsy.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// How reviews are gathered. One kind is used for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStrategyKind {
    /// Reviews rendered on the product page itself.
    #[default]
    Inline,
    /// One AJAX call to the listing's review endpoint.
    DataEndpoint,
    /// The seller's full review history, filtered to the product.
    FullHistory,
}

impl fmt::Display for ReviewStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReviewStrategyKind::Inline => "inline",
            ReviewStrategyKind::DataEndpoint => "data_endpoint",
            ReviewStrategyKind::FullHistory => "full_history",
        };
        f.write_str(name)
    }
}

impl FromStr for ReviewStrategyKind {
    type Err = HarvestError;

    /// Accepts the names above as well as the numeric options `1`, `2`, `3`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "inline" | "1" => Ok(ReviewStrategyKind::Inline),
            "data_endpoint" | "ajax" | "2" => Ok(ReviewStrategyKind::DataEndpoint),
            "full_history" | "shop" | "3" => Ok(ReviewStrategyKind::FullHistory),
            other => Err(HarvestError::Config(format!("unknown review strategy {other:?}"))),
        }
    }
}

/// Settings for one harvest run.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub search: String,
    pub review_strategy: ReviewStrategyKind,
    /// Stop after this many records; `None` runs until results run out.
    pub max_items: Option<usize>,
    pub max_reviews_per_product: Option<usize>,
    pub max_review_pages: Option<u32>,
    pub concurrency: usize,
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub base_url: String,
    pub output: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            search: String::new(),
            review_strategy: ReviewStrategyKind::default(),
            max_items: None,
            max_reviews_per_product: None,
            max_review_pages: None,
            concurrency: CONCURRENT_REQUESTS,
            request_delay_ms: REQUEST_DELAY_MS,
            max_retries: MAX_RETRIES,
            retry_delay_ms: RETRY_DELAY_MS,
            timeout_secs: TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: BASE_URL.to_string(),
            output: None,
        }
    }
}

impl HarvestConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.trim().is_empty() {
            return Err(HarvestError::Config("search term is empty".into()));
        }
        if self.concurrency == 0 {
            return Err(HarvestError::Config("concurrency must be at least 1".into()));
        }
        if self.max_items == Some(0) {
            return Err(HarvestError::Config("max_items must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = HarvestConfig::default();
        assert_eq!(config.concurrency, CONCURRENT_REQUESTS);
        assert_eq!(config.review_strategy, ReviewStrategyKind::Inline);
        assert_eq!(config.max_items, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarvestConfig::from_toml(
            r#"
            search = "3d printed"
            review_strategy = "full_history"
            max_items = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.search, "3d printed");
        assert_eq!(config.review_strategy, ReviewStrategyKind::FullHistory);
        assert_eq!(config.max_items, Some(20));
        assert_eq!(config.max_retries, MAX_RETRIES);
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_toml_is_reported() {
        assert!(matches!(
            HarvestConfig::from_toml("review_strategy = \"carrier pigeon\""),
            Err(HarvestError::Toml(_))
        ));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!("2".parse::<ReviewStrategyKind>().unwrap(), ReviewStrategyKind::DataEndpoint);
        assert_eq!("Full-History".parse::<ReviewStrategyKind>().unwrap(), ReviewStrategyKind::FullHistory);
        assert_eq!(ReviewStrategyKind::DataEndpoint.to_string(), "data_endpoint");
        assert!("4".parse::<ReviewStrategyKind>().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_search() {
        assert!(HarvestConfig::default().validate().is_err());
    }
}
