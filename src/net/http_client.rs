//! HTTP fetcher with per-hostname pacing, header rotation and bounded
//! retry/backoff on 429/502/503.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use super::url_safety::{validate_and_normalize_url, UrlSafetyError, UrlSafetyOptions};

/// Browser user agents rotated across requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Pick a user agent pseudo-randomly from the pool.
fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    USER_AGENTS[nanos % USER_AGENTS.len()]
}

/// Backoff schedule for 429 responses (seconds); retry-after wins if longer.
const RATE_LIMIT_BACKOFF_SECS: &[u64] = &[5, 15, 45];
/// Backoff schedule for 502/503 responses (seconds).
const SERVER_ERROR_BACKOFF_SECS: &[u64] = &[3, 8];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsafe URL: {0}")]
    UnsafeUrl(#[from] UrlSafetyError),
    #[error("transient network error: {0}")]
    Transient(String),
    #[error("rate limited (HTTP {status}) after {attempts} attempts")]
    RateLimited { status: u16, attempts: u32 },
    #[error("HTTP {0}")]
    Status(u16),
}

/// Desired response representation; controls the Accept header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Html,
    Json,
}

/// A fetched response body with its final status code.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// The rate-limited HTTP transport the core depends on. Strict calls treat
/// non-success statuses as errors; lenient calls hand back whatever final
/// status arrived, for probe endpoints where a 404 or 422 is itself signal.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, accept: Accept) -> Result<FetchedPage, FetchError>;
    async fn get_lenient(&self, url: &str, accept: Accept) -> Result<FetchedPage, FetchError>;
    async fn post_json(&self, url: &str, body: Value) -> Result<FetchedPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub url_safety: UrlSafetyOptions,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            url_safety: UrlSafetyOptions::default(),
        }
    }
}

/// Real fetcher backed by reqwest. The cookie store is enabled so the
/// order-limit prober's anonymous cart session spans add/inspect/clear calls.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    rate_limiter: RateLimiter,
    config: HttpClientConfig,
}

enum Payload {
    None,
    Json(Value),
}

impl HttpClient {
    pub fn new(config: HttpClientConfig, rate_limiter: RateLimiter) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    fn accept_header(accept: Accept) -> &'static str {
        match accept {
            Accept::Html => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            Accept::Json => "application/json, text/plain, */*",
        }
    }

    async fn execute(
        &self,
        url: &str,
        accept: Accept,
        payload: Payload,
        lenient: bool,
    ) -> Result<FetchedPage, FetchError> {
        let safe_url = validate_and_normalize_url(url, &self.config.url_safety).await?;

        let mut attempt: u32 = 0;
        loop {
            let hostname = self.rate_limiter.acquire(&safe_url).await;

            let mut request = match payload {
                Payload::None => self.client.get(&safe_url),
                Payload::Json(ref body) => self.client.post(&safe_url).json(body),
            };
            request = request
                .header("User-Agent", random_user_agent())
                .header("Accept", Self::accept_header(accept))
                .header("Accept-Language", "sl-SI,sl;q=0.9,en-US;q=0.8,en;q=0.7");

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt < SERVER_ERROR_BACKOFF_SECS.len() as u32 {
                        let backoff =
                            Duration::from_secs(SERVER_ERROR_BACKOFF_SECS[attempt as usize]);
                        debug!("network error for {}: {}, retrying in {:?}", safe_url, err, backoff);
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Transient(err.to_string()));
                }
            };

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            if status == 429 && attempt < RATE_LIMIT_BACKOFF_SECS.len() as u32 {
                if let Some(ref host) = hostname {
                    self.rate_limiter.report_rate_limit(host, status).await;
                }
                let backoff = Duration::from_secs(
                    RATE_LIMIT_BACKOFF_SECS[attempt as usize].max(retry_after.unwrap_or(0)),
                );
                warn!("429 from {}, waiting {:?} before retry", safe_url, backoff);
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            if (status == 502 || status == 503) && attempt < SERVER_ERROR_BACKOFF_SECS.len() as u32 {
                if let Some(ref host) = hostname {
                    self.rate_limiter.report_rate_limit(host, status).await;
                }
                let backoff = Duration::from_secs(SERVER_ERROR_BACKOFF_SECS[attempt as usize]);
                debug!("{} from {}, waiting {:?} before retry", status, safe_url, backoff);
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            if let Some(ref host) = hostname {
                if status == 429 || status == 503 {
                    self.rate_limiter.report_rate_limit(host, status).await;
                } else if status >= 500 {
                    self.rate_limiter.report_server_error(host).await;
                } else if (200..400).contains(&status) {
                    self.rate_limiter.report_success(host).await;
                }
            }

            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Transient(e.to_string()))?;
            let page = FetchedPage { status, body };

            if lenient {
                return Ok(page);
            }
            return match status {
                200..=399 => Ok(page),
                429 => Err(FetchError::RateLimited {
                    status,
                    attempts: attempt + 1,
                }),
                500..=599 => Err(FetchError::Transient(format!("HTTP {status}"))),
                other => Err(FetchError::Status(other)),
            };
        }
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn get(&self, url: &str, accept: Accept) -> Result<FetchedPage, FetchError> {
        self.execute(url, accept, Payload::None, false).await
    }

    async fn get_lenient(&self, url: &str, accept: Accept) -> Result<FetchedPage, FetchError> {
        self.execute(url, accept, Payload::None, true).await
    }

    async fn post_json(&self, url: &str, body: Value) -> Result<FetchedPage, FetchError> {
        self.execute(url, Accept::Json, Payload::Json(body), true)
            .await
    }
}
