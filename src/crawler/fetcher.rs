//! Page fetching boundary
//!
//! The crawl core never talks to the network directly. It consumes a
//! [`PageFetcher`], which performs exactly one fetch and reports content or a
//! [`FetchError`]. [`HttpFetcher`] is the reqwest-backed default:
//! - Builds an HTTP client with the configured user agent
//! - Follows redirects (the final URL is reported back)
//! - Rejects non-HTML responses
//! - Turns 4xx/5xx into `FetchError::Http`, keeping any `Retry-After` hint

use crate::config::UserAgentConfig;
use crate::FetchError;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client, Response, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

/// Maximum redirect hops followed for one fetch
const MAX_REDIRECTS: usize = 10;

/// What a successful fetch hands back to the crawl core
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Page body; `None` when the server answered without content
    pub content: Option<String>,
    pub status_code: u16,
    /// URL after redirects
    pub final_url: String,
    pub duration: Duration,
    /// Pacing hint sent along with an otherwise successful response
    pub retry_after: Option<Duration>,
}

/// Performs one fetch and returns content or a failure
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches an HTML page
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;

    /// Fetches a plain-text resource such as robots.txt
    ///
    /// Defaults to [`PageFetcher::fetch`]; fetchers that filter on content
    /// type override it.
    async fn fetch_text(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.fetch(url).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout (the per-fetch timeout)
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from the user agent configuration
    pub fn from_config(
        config: &UserAgentConfig,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }

    async fn get(&self, url: &Url, require_html: bool) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let retry_after = parse_retry_after(&response);

        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }

        if require_html {
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !is_html(&content_type) {
                return Err(FetchError::ContentMismatch {
                    url: url.to_string(),
                    content_type,
                });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        Ok(FetchResponse {
            content: (status != StatusCode::NO_CONTENT && !body.is_empty()).then_some(body),
            status_code: status.as_u16(),
            final_url,
            duration: started.elapsed(),
            retry_after,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.get(url, true).await
    }

    async fn fetch_text(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.get(url, false).await
    }
}

/// Accepts `text/html` and `application/xhtml+xml`; a missing header is
/// treated as HTML
fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.is_empty()
        || content_type.contains("text/html")
        || content_type.contains("application/xhtml+xml")
}

/// Reads a `Retry-After` header given in seconds
///
/// The HTTP-date form is ignored; the domain's backoff applies instead.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else if error.is_redirect() {
        FetchError::Network {
            url: url.to_string(),
            message: format!("Redirect error: {}", error),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
