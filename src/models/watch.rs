//! Keyword watches and per-run discovery results.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evidence::Availability;

/// A recurring keyword search against one store.
///
/// `known_product_urls` and `known_stock_map` are mutated only by the
/// discovery orchestrator after each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordWatch {
    pub id: i64,
    pub keyword: String,
    pub store_url: String,
    /// Store profile hint used when auto-adding discovered products.
    pub store_name: String,
    /// Explicit search URL template with a `{keyword}` placeholder.
    pub search_url: Option<String>,
    /// 0 inherits the global watch interval.
    #[serde(default)]
    pub check_interval_minutes: u32,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    #[serde(default = "default_true")]
    pub notify_new_products: bool,
    #[serde(default)]
    pub notify_in_stock: bool,
    #[serde(default)]
    pub auto_add_tracking: bool,
    #[serde(default)]
    pub known_product_urls: BTreeSet<String>,
    /// URL -> last seen stock state.
    #[serde(default)]
    pub known_stock_map: BTreeMap<String, bool>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_found_count: u32,
}

fn default_true() -> bool {
    true
}

impl KeywordWatch {
    pub fn effective_interval_minutes(&self, global: u32) -> u32 {
        if self.check_interval_minutes > 0 {
            self.check_interval_minutes
        } else {
            global
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>, global_interval_minutes: u32) -> bool {
        let interval = self.effective_interval_minutes(global_interval_minutes);
        match self.last_checked {
            None => true,
            Some(last) => now.signed_duration_since(last).num_minutes() >= interval as i64,
        }
    }
}

/// Ephemeral per-run discovery result; folded into watch state and optionally
/// promoted to a new monitored target.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredProduct {
    pub name: String,
    /// Canonical product URL, query stripped.
    pub url: String,
    pub price: Option<f64>,
    pub in_stock: Availability,
    pub image: String,
}
