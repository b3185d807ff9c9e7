//! Domain events raised toward the notifier.

use super::target::MonitoredTarget;
use super::watch::{DiscoveredProduct, KeywordWatch};

/// A target flipped stock state (or was force re-announced while in stock).
#[derive(Debug, Clone)]
pub struct TargetStateChanged {
    pub target: MonitoredTarget,
    pub previously_in_stock: bool,
    pub in_stock: bool,
    /// Pre-built cart URL for platform stores, when a variant is known.
    pub cart_hint_url: Option<String>,
}

/// A target's price dropped by at least the configured threshold.
#[derive(Debug, Clone)]
pub struct TargetPriceDropped {
    pub target: MonitoredTarget,
    pub old_price: f64,
    pub new_price: f64,
}

/// One discovery run's findings for a watch.
#[derive(Debug, Clone)]
pub struct WatchDiscovery {
    pub watch: KeywordWatch,
    pub new_items: Vec<DiscoveredProduct>,
    pub back_in_stock: Vec<DiscoveredProduct>,
}
