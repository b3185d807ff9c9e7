//! Monitored product targets and their check history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profile::SelectorOverrides;

/// A single product URL under stock/price surveillance.
///
/// Mutated only by the scheduler after each check (stock, price, timestamps)
/// and by the order-limit prober (`max_order_qty`). The URL is unique across
/// all targets and is stored normalized (tracking params stripped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Store profile identifier (e.g. "shopify", "custom").
    pub store: String,
    pub target_price: Option<f64>,
    /// Per-target check interval in minutes; 0 inherits the global interval.
    #[serde(default)]
    pub check_interval_minutes: u32,
    #[serde(default)]
    pub in_stock: bool,
    pub current_price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub image_url: Option<String>,
    /// Platform variant id resolved by the evidence extractor.
    pub variant_id: Option<String>,
    /// Store-enforced maximum purchasable quantity, resolved by the prober.
    pub max_order_qty: Option<u32>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_in_stock: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub notify_on_stock: bool,
    #[serde(default = "default_true")]
    pub notify_on_price_drop: bool,
    /// Per-target selector overrides merged over the store profile.
    pub selector_overrides: Option<SelectorOverrides>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_true() -> bool {
    true
}

impl MonitoredTarget {
    /// Effective check interval: the per-target override if positive, else the
    /// given global interval.
    pub fn effective_interval_minutes(&self, global: u32) -> u32 {
        if self.check_interval_minutes > 0 {
            self.check_interval_minutes
        } else {
            global
        }
    }

    /// Whether this target is due for a check at `now`.
    pub fn is_due(&self, now: DateTime<Utc>, global_interval_minutes: u32) -> bool {
        let interval = self.effective_interval_minutes(global_interval_minutes);
        match self.last_checked {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_minutes() >= interval as i64
            }
        }
    }
}

/// Fields for inserting a freshly discovered target.
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub name: String,
    pub url: String,
    pub store: String,
    pub current_price: Option<f64>,
    pub check_interval_minutes: u32,
    pub notify_on_stock: bool,
    pub notify_on_price_drop: bool,
}

/// One row of per-target check history, strictly ordered by append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockHistoryRecord {
    pub target_id: i64,
    pub in_stock: bool,
    pub price: Option<f64>,
    pub checked_at: DateTime<Utc>,
}
