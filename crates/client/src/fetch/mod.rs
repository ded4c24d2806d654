//! Network leg of the interceptor.
//!
//! ### Fetcher seam
//! - Strategies and population talk to the network only through [`Fetcher`].
//! - Any HTTP status is a completed fetch; only transport failures are errors
//!   (connect refused, timeout, body over the byte cap).
//!
//! ### Response visibility
//! - Same-origin responses are `Basic`.
//! - Cross-origin responses are `Cors`, or `Opaque` when the request was
//!   issued in `no-cors` mode. Opaque responses are cacheable regardless of
//!   status.
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)

pub mod request;
pub mod response;
pub mod url;

use async_trait::async_trait;
use reqwest::Client;
use shellcache_core::{AppConfig, Error};
use std::time::{Duration, Instant};

pub use request::{CacheMode, Request, RequestMode};
pub use response::{Response, ResponseKind};
pub use url::{UrlError, canonicalize, resolve};

/// Anything that can put a request on the wire.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue the request and buffer the full response.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shellcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Application origin; decides same-origin vs cross-origin responses.
    pub origin: Option<::url::Url>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "shellcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            origin: None,
        }
    }
}

impl FetchConfig {
    /// Derive the fetch settings from the application config.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            origin: Some(origin),
            ..Default::default()
        })
    }
}

/// reqwest-backed [`Fetcher`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn response_kind(&self, request: &Request) -> ResponseKind {
        match &self.config.origin {
            None => ResponseKind::Basic,
            Some(origin) if request.is_same_origin(origin) => ResponseKind::Basic,
            Some(_) if request.mode == RequestMode::NoCors => ResponseKind::Opaque,
            Some(_) => ResponseKind::Cors,
        }
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::FetchTimeout(format!("{}: {}", request.url, e))
                } else {
                    Error::Network(format!("{}: {}", request.url, e))
                }
            })?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let kind = self.response_kind(request);

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            ?kind,
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(Response { url: final_url, status, headers, body, kind })
    }
}
