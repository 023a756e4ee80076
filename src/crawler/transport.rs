//! HTTP transport capability
//!
//! The engine only depends on the [`Transport`] trait. [`HttpTransport`] is the
//! production implementation over `reqwest`; tests substitute in-memory doubles.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed by the HTTP transport
const MAX_REDIRECTS: usize = 10;

/// Raw response handed back by a transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// URL the response was served from, after redirects
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Connection-level failure; always eligible for retry
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Transport error for {url}: {message}")]
    Other { url: String, message: String },
}

/// Fetch capability consumed by the fetcher
///
/// Implementations must be safe to call concurrently from many workers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent)?,
        })
    }
}

/// Builds an HTTP client with proper configuration
///
/// The User-Agent follows `Name/Version (+ContactURL; ContactEmail)`.
/// Per-request timeouts are applied by the caller, so the client only carries
/// a connect timeout.
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?
            .to_vec();

        Ok(TransportResponse {
            final_url,
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if error.is_timeout() {
        TransportError::Timeout { url }
    } else if error.is_connect() {
        TransportError::Connect {
            url,
            message: error.to_string(),
        }
    } else {
        TransportError::Other {
            url,
            message: error.to_string(),
        }
    }
}
