// src/fetch.rs
//! The fetch collaborator: the [`Fetcher`] seam the harvester depends on and
//! the reqwest-backed implementation used outside tests.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Response};
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::page::Page;

/// Cookie carrying the visitor's session identity.
pub const SESSION_COOKIE: &str = "uaid";

/// One request of a chain: a GET, or a POST when a JSON payload is present.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub payload: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload: None,
            headers: Vec::new(),
        }
    }

    pub fn post_json(url: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            payload: Some(payload),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

/// Fetches pages for the harvester. A failure ends only the chain that asked.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page>;

    /// Session identity token, once the transport has seen one.
    fn session_token(&self) -> Option<String> {
        None
    }
}

/// Value of cookie `name` from a `Set-Cookie` or `Cookie` header line.
///
/// Returns `None` when the cookie is missing or has an empty value.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// Exponential backoff before retry `attempt + 1`, saturating instead of
/// overflowing for large attempt counts.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2_u64.saturating_pow(attempt)))
}

/// reqwest-backed [`Fetcher`] with a browser user agent, cookie store,
/// polite delay and retries with exponential backoff.
pub struct HttpFetcher {
    client: Client,
    request_delay: Duration,
    max_retries: u32,
    retry_delay_ms: u64,
    session: Mutex<Option<String>>,
}

impl HttpFetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| HarvestError::Config(format!("user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            request_delay: Duration::from_millis(config.request_delay_ms),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            session: Mutex::new(None),
        })
    }

    async fn send(&self, request: &FetchRequest) -> reqwest::Result<Response> {
        let mut builder = match &request.payload {
            Some(payload) => self.client.post(&request.url).json(payload),
            None => self.client.get(&request.url),
        };
        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }
        builder.send().await
    }

    fn remember_session(&self, response: &Response) {
        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|line| cookie_value(line, SESSION_COOKIE));
        if let Some(token) = token {
            if let Ok(mut slot) = self.session.lock() {
                *slot = Some(token);
            }
        }
    }

    /// Fetches a URL with a retry mechanism.
    async fn fetch_with_retries(&self, request: &FetchRequest) -> Result<Response> {
        let url = &request.url;
        for attempt in 0..=self.max_retries {
            match self.send(request).await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }
                    warn!(
                        "Request to {} failed with status: {}. Retrying (attempt {}/{})",
                        url,
                        response.status(),
                        attempt + 1,
                        self.max_retries
                    );
                }
                Err(e) => {
                    warn!(
                        "Request to {} failed with error: {}. Retrying (attempt {}/{})",
                        url,
                        e,
                        attempt + 1,
                        self.max_retries
                    );
                }
            }

            if attempt < self.max_retries {
                sleep(backoff_delay(self.retry_delay_ms, attempt)).await;
            }
        }

        Err(HarvestError::MaxRetriesExceeded(url.to_string()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page> {
        sleep(self.request_delay).await;
        debug!(url = %request.url, post = request.payload.is_some(), "fetching");

        let response = self.fetch_with_retries(request).await?;
        self.remember_session(&response);
        let url = response.url().to_string();
        let body = response.text().await.map_err(|e| HarvestError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(Page::new(url, body))
    }

    fn session_token(&self) -> Option<String> {
        self.session.lock().ok().and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let line = "uaid=abc123DEF; Path=/; Domain=.etsy.com; Secure; HttpOnly";
        assert_eq!(cookie_value(line, "uaid").as_deref(), Some("abc123DEF"));
        assert_eq!(cookie_value("a=1; uaid=\"q\"", "uaid").as_deref(), Some("q"));
        assert_eq!(cookie_value("uaid=; Path=/", "uaid"), None);
        assert_eq!(cookie_value("user_prefs=x", "uaid"), None);
        assert_eq!(cookie_value("garbage", "uaid"), None);
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay(500, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(500, 70), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_request_builders() {
        let req = FetchRequest::post_json("https://example.com/api", serde_json::json!({"a": 1}))
            .header("x-csrf-token", "tok");
        assert_eq!(req.headers, vec![("x-csrf-token".to_string(), "tok".to_string())]);
        assert!(req.payload.is_some());
        assert!(FetchRequest::get("https://example.com").payload.is_none());
    }

    #[test]
    fn test_http_fetcher_builds_from_defaults() {
        let fetcher = HttpFetcher::new(&HarvestConfig::default()).unwrap();
        assert_eq!(fetcher.session_token(), None);
    }
}
