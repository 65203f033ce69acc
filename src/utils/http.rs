// src/utils/http.rs

//! HTTP client utilities and the page fetch seam.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Fetches the raw HTML of a page.
///
/// Any failure, whatever its cause, surfaces as `AppError::Transport`.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Create a configured blocking HTTP client.
pub fn create_client(config: &HttpConfig) -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Blocking `reqwest` fetcher with a fixed per-request timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::transport(url, e))?;
        response.text().map_err(|e| AppError::transport(url, e))
    }
}
