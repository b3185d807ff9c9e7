//! Order-limit probing through the platform's anonymous cart endpoints.
//!
//! When a target flips to in stock it is worth knowing how many units one
//! order can carry. The storefront answers this through `/cart/add.js`:
//! either with an explicit limit message, by silently capping the cart
//! line, or by rejecting the add outright.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::net::{Accept, Fetcher};

static AT_MOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)at most (\d+)").expect("valid regex"));
static MAX_QTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)max(?:imum)?\s+(?:qty|quantity)[^0-9]{0,12}(\d+)").expect("valid regex")
});

/// Highest quantity attempted on the first add.
const PROBE_QTY_MIN: u32 = 5;
const PROBE_QTY_MAX: u32 = 25;

/// Build the platform cart permalink that preloads `qty` units of a variant.
pub fn build_cart_url(store_root: &str, variant_id: &str, qty: u32) -> String {
    format!(
        "{}/cart/{}:{}?return_to=/cart",
        store_root.trim_end_matches('/'),
        variant_id,
        qty.max(1)
    )
}

/// Permalink that lands straight on checkout instead of the cart page.
pub fn build_checkout_url(store_root: &str, variant_id: &str, qty: u32) -> String {
    format!(
        "{}/cart/{}:{}?checkout",
        store_root.trim_end_matches('/'),
        variant_id,
        qty.max(1)
    )
}

/// Limit assumed when the cart never gave a usable answer.
fn conservative_limit(stock_hint: u32) -> u32 {
    if stock_hint > 0 {
        stock_hint.min(10)
    } else {
        1
    }
}

enum AddOutcome {
    /// Accepted; the cart line afterwards holds this many units.
    Added(u32),
    /// Rejected with an explicit limit in the error message.
    Limited(u32),
    /// Rejected without a usable limit.
    Rejected,
    /// Transport failure; the probe cannot continue.
    Failed,
}

pub struct OrderLimitProber {
    fetcher: Arc<dyn Fetcher>,
}

impl OrderLimitProber {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Probe the per-order quantity limit for a variant. Returns `None` when
    /// no limit below the probe quantity was observed; a probe the transport
    /// would not carry yields a conservative limit from the inventory hint.
    /// The anonymous cart is cleared before returning.
    pub async fn probe(
        &self,
        store_root: &str,
        variant_id: &str,
        stock_hint: u32,
    ) -> Option<u32> {
        let probe_qty = if stock_hint > 0 {
            stock_hint.clamp(PROBE_QTY_MIN, PROBE_QTY_MAX)
        } else {
            PROBE_QTY_MAX
        };

        let limit = self.probe_inner(store_root, variant_id, probe_qty, stock_hint).await;
        self.clear_cart(store_root).await;
        if let Some(limit) = limit {
            info!("order limit for variant {} is {}", variant_id, limit);
        }
        limit
    }

    async fn probe_inner(
        &self,
        store_root: &str,
        variant_id: &str,
        probe_qty: u32,
        stock_hint: u32,
    ) -> Option<u32> {
        match self.try_add(store_root, variant_id, probe_qty).await {
            AddOutcome::Limited(limit) => Some(limit),
            AddOutcome::Added(line_qty) if line_qty >= probe_qty => None,
            AddOutcome::Added(line_qty) if line_qty > 0 => Some(line_qty),
            AddOutcome::Added(_) | AddOutcome::Rejected => {
                // The storefront would not even take one unit into the cart;
                // the bisection result or the inventory hint decides.
                self.binary_search(store_root, variant_id, probe_qty)
                    .await
                    .or_else(|| Some(conservative_limit(stock_hint)))
            }
            AddOutcome::Failed => Some(conservative_limit(stock_hint)),
        }
    }

    /// Largest quantity the cart accepts, found by bisection. Each attempt
    /// starts from an empty cart so line quantities do not accumulate.
    async fn binary_search(&self, store_root: &str, variant_id: &str, hi: u32) -> Option<u32> {
        let mut lo = 0u32;
        let mut hi = hi;
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            self.clear_cart(store_root).await;
            match self.try_add(store_root, variant_id, mid).await {
                AddOutcome::Limited(limit) => return Some(limit),
                AddOutcome::Added(line_qty) if line_qty >= mid => lo = mid,
                AddOutcome::Added(line_qty) if line_qty > 0 => return Some(line_qty),
                AddOutcome::Added(_) | AddOutcome::Rejected => hi = mid - 1,
                AddOutcome::Failed => return None,
            }
        }
        (lo > 0).then_some(lo)
    }

    async fn try_add(&self, store_root: &str, variant_id: &str, qty: u32) -> AddOutcome {
        let endpoint = format!("{}/cart/add.js", store_root.trim_end_matches('/'));
        let id: Value = match variant_id.parse::<i64>() {
            Ok(n) => json!(n),
            Err(_) => json!(variant_id),
        };
        let body = json!({ "items": [{ "id": id, "quantity": qty }] });

        let page = match self.fetcher.post_json(&endpoint, body).await {
            Ok(page) => page,
            Err(err) => {
                debug!("cart add failed for {}: {}", endpoint, err);
                return AddOutcome::Failed;
            }
        };

        if page.is_success() {
            return match self.cart_line_qty(store_root, variant_id).await {
                Some(line_qty) => AddOutcome::Added(line_qty),
                None => AddOutcome::Added(qty),
            };
        }

        let message = page
            .json()
            .and_then(|v| {
                ["description", "message"]
                    .iter()
                    .find_map(|k| v.get(k).and_then(|m| m.as_str()).map(|m| m.to_string()))
            })
            .unwrap_or_else(|| page.body.clone());

        if let Some(limit) = AT_MOST
            .captures(&message)
            .or_else(|| MAX_QTY.captures(&message))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            return AddOutcome::Limited(limit);
        }
        AddOutcome::Rejected
    }

    /// Read the cart line quantity for a variant from `/cart.js`.
    async fn cart_line_qty(&self, store_root: &str, variant_id: &str) -> Option<u32> {
        let endpoint = format!("{}/cart.js", store_root.trim_end_matches('/'));
        let page = self.fetcher.get_lenient(&endpoint, Accept::Json).await.ok()?;
        if !page.is_success() {
            return None;
        }
        let cart = page.json()?;
        let items = cart.get("items")?.as_array()?;
        for item in items {
            let matches = match item.get("variant_id") {
                Some(Value::Number(n)) => n.to_string() == variant_id,
                Some(Value::String(s)) => s == variant_id,
                _ => false,
            };
            if matches {
                return item
                    .get("quantity")
                    .and_then(|q| q.as_u64())
                    .map(|q| q as u32);
            }
        }
        Some(0)
    }

    async fn clear_cart(&self, store_root: &str) {
        let endpoint = format!("{}/cart/clear.js", store_root.trim_end_matches('/'));
        if let Err(err) = self.fetcher.post_json(&endpoint, json!({})).await {
            debug!("cart clear failed for {}: {}", endpoint, err);
        }
    }
}
