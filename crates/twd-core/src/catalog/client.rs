//! JSON fetch client.
//!
//! Uses the curl crate (libcurl) on the blocking pool. One request per call;
//! retry is the caller's job (see [`crate::retry::run_with_retry`]).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::retry::FetchError;

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// GET `url` and parse the body as JSON. Non-2xx is [`FetchError::Http`],
    /// an unparseable body is [`FetchError::Malformed`].
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// libcurl-backed [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct CurlCatalogClient {
    timeout: Duration,
}

impl CurlCatalogClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for CurlCatalogClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CatalogClient for CurlCatalogClient {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let url = url.to_string();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || fetch_blocking(&url, timeout))
            .await
            .map_err(|e| FetchError::Transport(format!("fetch task failed: {}", e)))?
    }
}

fn fetch_blocking(url: &str, timeout: Duration) -> Result<Value, FetchError> {
    let mut body: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(timeout)?;
    easy.useragent(concat!("twd/", env!("CARGO_PKG_VERSION")))?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }
    Ok(serde_json::from_slice(&body)?)
}
