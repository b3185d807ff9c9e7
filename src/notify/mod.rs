//! Notification seam. Delivery transports live behind the trait; the
//! bundled implementation writes structured log lines.

use async_trait::async_trait;
use tracing::info;

use crate::models::{TargetPriceDropped, TargetStateChanged, WatchDiscovery};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn stock_changed(&self, event: &TargetStateChanged);
    async fn price_dropped(&self, event: &TargetPriceDropped);
    async fn watch_results(&self, event: &WatchDiscovery);
}

/// Notifier that reports through the tracing pipeline.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn stock_changed(&self, event: &TargetStateChanged) {
        if event.in_stock {
            info!(
                target_id = event.target.id,
                name = %event.target.name,
                price = ?event.target.current_price,
                max_order_qty = ?event.target.max_order_qty,
                cart_url = ?event.cart_hint_url,
                "back in stock"
            );
        } else {
            info!(
                target_id = event.target.id,
                name = %event.target.name,
                "went out of stock"
            );
        }
    }

    async fn price_dropped(&self, event: &TargetPriceDropped) {
        info!(
            target_id = event.target.id,
            name = %event.target.name,
            old_price = event.old_price,
            new_price = event.new_price,
            currency = %event.target.currency,
            "price dropped"
        );
    }

    async fn watch_results(&self, event: &WatchDiscovery) {
        info!(
            watch_id = event.watch.id,
            keyword = %event.watch.keyword,
            new_items = event.new_items.len(),
            back_in_stock = event.back_in_stock.len(),
            "keyword watch results"
        );
        for item in &event.new_items {
            info!(keyword = %event.watch.keyword, name = %item.name, url = %item.url, price = ?item.price, "new product");
        }
        for item in &event.back_in_stock {
            info!(keyword = %event.watch.keyword, name = %item.name, url = %item.url, "back in stock");
        }
    }
}
