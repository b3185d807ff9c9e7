//! Per-hostname request pacing.
//!
//! Tracks the last request per hostname and enforces a minimum interval
//! between requests to the same store. Backs off on 429/503 responses and
//! gradually recovers on success.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum interval between requests to one hostname.
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub recovery_multiplier: f64,
    /// Consecutive successes needed before the delay decays.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 3.0,
            recovery_multiplier: 0.5,
            recovery_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct HostState {
    last_request: Option<Instant>,
    current_delay: Duration,
    in_backoff: bool,
    consecutive_successes: u32,
    total_requests: u64,
}

impl HostState {
    fn new(base_delay: Duration) -> Self {
        Self {
            last_request: None,
            current_delay: base_delay,
            in_backoff: false,
            consecutive_successes: 0,
            total_requests: 0,
        }
    }

    fn time_until_ready(&self) -> Duration {
        match self.last_request {
            None => Duration::ZERO,
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
        }
    }
}

/// Shared per-hostname rate limiter. Cloning yields a handle onto the same
/// state, so every fetching component paces against the same timestamps.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hosts: Arc<RwLock<HashMap<String, HostState>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            hosts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn extract_hostname(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the hostname is ready, then stamp the request.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let hostname = Self::extract_hostname(url)?;

        let wait = {
            let hosts = self.hosts.read().await;
            hosts
                .get(&hostname)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };

        if wait > Duration::ZERO {
            debug!("rate limiting {}: waiting {:?}", hostname, wait);
            tokio::time::sleep(wait).await;
        }

        {
            let mut hosts = self.hosts.write().await;
            let state = hosts
                .entry(hostname.clone())
                .or_insert_with(|| HostState::new(self.config.base_delay));
            state.last_request = Some(Instant::now());
            state.total_requests += 1;
        }

        Some(hostname)
    }

    /// Report a successful response; decays the delay after enough successes.
    pub async fn report_success(&self, hostname: &str) {
        let mut hosts = self.hosts.write().await;
        if let Some(state) = hosts.get_mut(hostname) {
            state.consecutive_successes += 1;
            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let decayed = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = decayed.max(self.config.base_delay);
                if state.current_delay <= self.config.base_delay {
                    state.in_backoff = false;
                    debug!("host {} recovered from backoff", hostname);
                }
                state.consecutive_successes = 0;
            }
        }
    }

    /// Report a definite rate limit (429/503); multiplies the delay.
    pub async fn report_rate_limit(&self, hostname: &str, status: u16) {
        let mut hosts = self.hosts.write().await;
        let state = hosts
            .entry(hostname.to_string())
            .or_insert_with(|| HostState::new(self.config.base_delay));
        state.consecutive_successes = 0;
        state.in_backoff = true;
        let raised = Duration::from_secs_f64(
            state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
        );
        state.current_delay = raised.min(self.config.max_delay);
        warn!(
            "rate limited by {} (HTTP {}), backing off to {:?}",
            hostname, status, state.current_delay
        );
    }

    /// Report a 5xx; mild backoff since the host may just be overloaded.
    pub async fn report_server_error(&self, hostname: &str) {
        let mut hosts = self.hosts.write().await;
        if let Some(state) = hosts.get_mut(hostname) {
            state.consecutive_successes = 0;
            let raised = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = raised.min(self.config.max_delay);
            debug!(
                "server error for {}, delay increased to {:?}",
                hostname, state.current_delay
            );
        }
    }

    pub async fn current_delay(&self, hostname: &str) -> Duration {
        let hosts = self.hosts.read().await;
        hosts
            .get(hostname)
            .map(|s| s.current_delay)
            .unwrap_or(self.config.base_delay)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extract_hostname_from_url() {
        assert_eq!(
            RateLimiter::extract_hostname("https://shop.example.com/products/x"),
            Some("shop.example.com".to_string())
        );
        assert_eq!(RateLimiter::extract_hostname("not a url"), None);
    }

    #[tokio::test]
    async fn backoff_raises_delay_and_recovery_restores_it() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            recovery_threshold: 1,
            ..Default::default()
        });

        limiter.acquire("https://shop.example.com/a").await;
        limiter.report_rate_limit("shop.example.com", 429).await;
        assert!(limiter.current_delay("shop.example.com").await >= Duration::from_millis(200));

        limiter.report_success("shop.example.com").await;
        assert_eq!(
            limiter.current_delay("shop.example.com").await,
            Duration::from_millis(100)
        );
    }

    #[tokio::test]
    async fn second_acquire_waits_for_base_delay() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(30),
            ..Default::default()
        });

        let start = Instant::now();
        limiter.acquire("https://shop.example.com/a").await;
        limiter.acquire("https://shop.example.com/b").await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
