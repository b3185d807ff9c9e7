//! Network plumbing: URL safety, per-hostname pacing and the HTTP fetcher.

mod http_client;
mod rate_limiter;
pub mod url_safety;

pub use http_client::{Accept, FetchError, FetchedPage, Fetcher, HttpClient, HttpClientConfig};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use url_safety::{canonical_url, validate_and_normalize_url, UrlSafetyError, UrlSafetyOptions};
