//! Application configuration loaded from a TOML file with sane defaults.
//!
//! Runtime-tunable values (the check intervals) can additionally be
//! overridden through the settings store, so a long-running monitor can be
//! retuned without a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::net::{HttpClientConfig, RateLimitConfig, UrlSafetyOptions};

/// Interval bounds in minutes.
const INTERVAL_MIN: u32 = 1;
const INTERVAL_MAX: u32 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Global check interval for monitored targets, minutes.
    pub check_interval_minutes: u32,
    /// Global interval for keyword watches, minutes.
    pub watch_interval_minutes: u32,
    /// Concurrent target checks per batch.
    pub scrape_concurrency: usize,
    /// Relative price decrease that counts as a drop (0.05 = 5%).
    pub price_drop_threshold: f64,
    pub request_timeout_secs: u64,
    /// Minimum pause between requests to the same hostname, milliseconds.
    pub min_host_interval_ms: u64,
    /// JSON state file holding targets, watches and history.
    pub state_file: PathBuf,
    /// Use the headless browser fallback for script-only storefronts.
    pub enable_browser: bool,
    /// Probe order limits through the cart when a target comes in stock.
    pub probe_order_limits: bool,
    pub require_https: bool,
    /// Resolve hostnames before fetching to reject private addresses.
    pub resolve_dns: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 5,
            watch_interval_minutes: 30,
            scrape_concurrency: 3,
            price_drop_threshold: 0.05,
            request_timeout_secs: 15,
            min_host_interval_ms: 1500,
            state_file: PathBuf::from("stockwatch.json"),
            enable_browser: true,
            probe_order_limits: true,
            require_https: false,
            resolve_dns: true,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; a missing explicit path is an error, a missing
    /// default path just yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => {
                let default_path = Path::new("stockwatch.toml");
                if default_path.exists() {
                    let raw = std::fs::read_to_string(default_path)
                        .context("reading stockwatch.toml")?;
                    toml::from_str(&raw).context("parsing stockwatch.toml")?
                } else {
                    Self::default()
                }
            }
        };
        config.clamp();
        Ok(config)
    }

    fn clamp(&mut self) {
        let clamped = self.check_interval_minutes.clamp(INTERVAL_MIN, INTERVAL_MAX);
        if clamped != self.check_interval_minutes {
            warn!(
                "check_interval_minutes {} out of range, using {}",
                self.check_interval_minutes, clamped
            );
            self.check_interval_minutes = clamped;
        }
        let clamped = self.watch_interval_minutes.clamp(INTERVAL_MIN, INTERVAL_MAX);
        if clamped != self.watch_interval_minutes {
            warn!(
                "watch_interval_minutes {} out of range, using {}",
                self.watch_interval_minutes, clamped
            );
            self.watch_interval_minutes = clamped;
        }
        self.scrape_concurrency = self.scrape_concurrency.clamp(1, 10);
        if !(0.0..=1.0).contains(&self.price_drop_threshold) {
            warn!(
                "price_drop_threshold {} out of range, using 0.05",
                self.price_drop_threshold
            );
            self.price_drop_threshold = 0.05;
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            url_safety: UrlSafetyOptions {
                require_https: self.require_https,
                resolve_dns: self.resolve_dns,
            },
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(self.min_host_interval_ms),
            ..RateLimitConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let config = AppConfig::default();
        assert_eq!(config.check_interval_minutes, 5);
        assert_eq!(config.watch_interval_minutes, 30);
        assert_eq!(config.scrape_concurrency, 3);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut config = AppConfig {
            check_interval_minutes: 0,
            watch_interval_minutes: 100_000,
            scrape_concurrency: 64,
            price_drop_threshold: 3.0,
            ..Default::default()
        };
        config.clamp();
        assert_eq!(config.check_interval_minutes, 1);
        assert_eq!(config.watch_interval_minutes, 1440);
        assert_eq!(config.scrape_concurrency, 10);
        assert_eq!(config.price_drop_threshold, 0.05);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str("check_interval_minutes = 10").unwrap();
        assert_eq!(config.check_interval_minutes, 10);
        assert_eq!(config.watch_interval_minutes, 30);
    }
}
