//! Periodic target checking: due selection, paced concurrent checks,
//! state transitions and notification fan-out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::models::{
    Availability, MonitoredTarget, ScrapeEvidence, StockHistoryRecord, StoreProfile,
    TargetPriceDropped, TargetStateChanged, PLATFORM_PROFILE,
};
use crate::notify::Notifier;
use crate::probe::{build_cart_url, OrderLimitProber};
use crate::repository::{SettingsRepository, TargetRepository};
use crate::scrape::EvidenceExtractor;

/// Pseudo-random sleep between `base` and `base + spread` milliseconds, so
/// consecutive requests do not land in a rigid cadence.
pub(crate) fn jitter(base_ms: u64, spread_ms: u64) -> Duration {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    Duration::from_millis(base_ms + nanos % spread_ms.max(1))
}

/// Outcome of one scheduler pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckStats {
    pub checked: usize,
    pub failed: usize,
    pub stock_changes: usize,
}

pub struct CheckScheduler {
    targets: Arc<dyn TargetRepository>,
    settings: Arc<dyn SettingsRepository>,
    extractor: EvidenceExtractor,
    prober: Option<OrderLimitProber>,
    notifier: Arc<dyn Notifier>,
    config: AppConfig,
    /// Held for the duration of a pass so overlapping timers skip instead
    /// of doubling up on the same targets.
    pass_guard: Mutex<()>,
    stats: Mutex<CheckStats>,
}

impl CheckScheduler {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        settings: Arc<dyn SettingsRepository>,
        extractor: EvidenceExtractor,
        prober: Option<OrderLimitProber>,
        notifier: Arc<dyn Notifier>,
        config: AppConfig,
    ) -> Self {
        Self {
            targets,
            settings,
            extractor,
            prober,
            notifier,
            config,
            pass_guard: Mutex::new(()),
            stats: Mutex::new(CheckStats::default()),
        }
    }

    /// The global check interval, with the settings-store override applied.
    async fn global_interval_minutes(&self) -> u32 {
        match self.settings.get_setting("check_interval_minutes").await {
            Ok(Some(raw)) => raw
                .parse::<u32>()
                .ok()
                .filter(|m| (1..=1440).contains(m))
                .unwrap_or(self.config.check_interval_minutes),
            _ => self.config.check_interval_minutes,
        }
    }

    /// Run one pass over all due targets. A pass already in flight makes
    /// this a no-op.
    pub async fn check_due(&self, force: bool) -> Result<CheckStats> {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            warn!("check pass already running, skipping");
            return Ok(CheckStats::default());
        };

        let interval = self.global_interval_minutes().await;
        let now = Utc::now();
        let due: Vec<MonitoredTarget> = self
            .targets
            .list_targets()
            .await?
            .into_iter()
            .filter(|t| force || t.is_due(now, interval))
            .collect();

        if due.is_empty() {
            debug!("no targets due");
            return Ok(CheckStats::default());
        }
        info!("checking {} targets", due.len());

        *self.stats.lock().await = CheckStats::default();
        futures::stream::iter(due)
            .for_each_concurrent(self.config.scrape_concurrency, |target| async move {
                tokio::time::sleep(jitter(800, 1200)).await;
                let id = target.id;
                let outcome = self.check_target(target, false).await;
                let mut stats = self.stats.lock().await;
                stats.checked += 1;
                match outcome {
                    Ok(changed) => stats.stock_changes += usize::from(changed),
                    Err(err) => {
                        stats.failed += 1;
                        warn!("check failed for target {}: {:#}", id, err);
                    }
                }
            })
            .await;

        let stats = *self.stats.lock().await;
        self.record_pass(stats).await;
        Ok(stats)
    }

    /// Check one target immediately, outside the due schedule. A manual
    /// check re-announces an item that is still in stock.
    pub async fn check_one(&self, target_id: i64) -> Result<bool> {
        let Some(target) = self.targets.get_target(target_id).await? else {
            anyhow::bail!("no such target: {target_id}");
        };
        self.check_target(target, true).await
    }

    async fn record_pass(&self, stats: CheckStats) {
        let _ = self
            .settings
            .set_setting("last_check_at", &Utc::now().to_rfc3339())
            .await;
        let total = match self.settings.get_setting("total_checks").await {
            Ok(Some(raw)) => raw.parse::<u64>().unwrap_or(0),
            _ => 0,
        };
        let _ = self
            .settings
            .set_setting("total_checks", &(total + stats.checked as u64).to_string())
            .await;
    }

    /// Full pipeline for a single target. Returns whether the stock state
    /// flipped.
    async fn check_target(&self, mut target: MonitoredTarget, reannounce: bool) -> Result<bool> {
        let mut profile = StoreProfile::for_store(&target.store);
        if let Some(ref overrides) = target.selector_overrides {
            profile.apply_overrides(overrides);
        }

        let Some(evidence) = self.extractor.extract(&target.url, &profile).await else {
            // A failed fetch still advances the clock so a dead URL cannot
            // starve the rest of the schedule.
            target.last_checked = Some(Utc::now());
            self.targets.update_target(&target).await?;
            anyhow::bail!("no evidence extracted for {}", target.url);
        };

        if evidence.is_recognized_platform && target.store != PLATFORM_PROFILE {
            debug!(
                "reclassifying target {} from {} to {}",
                target.id, target.store, PLATFORM_PROFILE
            );
            target.store = PLATFORM_PROFILE.to_string();
        }

        let was_in_stock = target.in_stock;
        let now_in_stock = evidence.in_stock.persisted();
        let old_price = target.current_price;

        if let Some(ref variant_id) = evidence.variant_id {
            target.variant_id = Some(variant_id.clone());
        }
        if evidence.image_url.is_some() {
            target.image_url = evidence.image_url.clone();
        }
        if evidence.price.is_some() {
            target.current_price = evidence.price;
        }
        target.in_stock = now_in_stock;
        target.last_checked = Some(Utc::now());
        if now_in_stock {
            target.last_in_stock = target.last_checked;
        }

        let mut cart_hint_url = None;
        if now_in_stock && (!was_in_stock || reannounce) {
            if let Some((limit, hint)) = self.resolve_order_limit(&target, &evidence).await {
                // An inconclusive probe keeps the last known limit.
                if limit.is_some() {
                    target.max_order_qty = limit;
                }
                cart_hint_url = hint;
            }
        }

        self.targets.update_target(&target).await?;
        self.targets
            .record_history(StockHistoryRecord {
                target_id: target.id,
                in_stock: now_in_stock,
                price: target.current_price,
                checked_at: target.last_checked.unwrap_or_else(Utc::now),
            })
            .await?;

        let flipped = was_in_stock != now_in_stock;
        // Ambiguous evidence is stored as out-of-stock but never alerted on.
        let definite = evidence.in_stock != Availability::Unknown;
        let announce = definite && (flipped || (reannounce && now_in_stock));
        if announce && target.notify_on_stock {
            self.notifier
                .stock_changed(&TargetStateChanged {
                    target: target.clone(),
                    previously_in_stock: was_in_stock,
                    in_stock: now_in_stock,
                    cart_hint_url,
                })
                .await;
        }
        self.maybe_notify_price(&target, old_price).await;

        Ok(flipped)
    }

    /// Probe the order limit and build the cart permalink when the target
    /// sits on a recognized platform with a known variant.
    async fn resolve_order_limit(
        &self,
        target: &MonitoredTarget,
        evidence: &ScrapeEvidence,
    ) -> Option<(Option<u32>, Option<String>)> {
        if evidence.in_stock != Availability::InStock {
            return None;
        }
        let variant_id = target.variant_id.as_deref()?;
        let root = store_root(&target.url)?;

        let limit = match self.prober {
            Some(ref prober) if self.config.probe_order_limits => {
                prober.probe(&root, variant_id, evidence.stock_qty_hint).await
            }
            _ => None,
        };
        // The permalink carries a single unit; the notification states the
        // limit separately.
        let hint = build_cart_url(&root, variant_id, 1);
        Some((limit, Some(hint)))
    }

    async fn maybe_notify_price(&self, target: &MonitoredTarget, old_price: Option<f64>) {
        if !target.notify_on_price_drop {
            return;
        }
        let (Some(old), Some(new)) = (old_price, target.current_price) else {
            return;
        };
        if old <= 0.0 || new >= old {
            return;
        }

        let relative_drop = (old - new) / old;
        let crossed_target = target
            .target_price
            .map(|wanted| new <= wanted && old > wanted)
            .unwrap_or(false);
        if relative_drop >= self.config.price_drop_threshold || crossed_target {
            self.notifier
                .price_dropped(&TargetPriceDropped {
                    target: target.clone(),
                    old_price: old,
                    new_price: new,
                })
                .await;
        }
    }
}

/// Scheme plus host of a product URL, the base for cart endpoints.
pub(crate) fn store_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}
