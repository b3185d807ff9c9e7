//! Keyword discovery: run the channels for each watch, fold the results
//! into watch state and optionally promote findings to monitored targets.

pub mod channels;
pub mod merge;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::{
    Availability, DiscoveredProduct, KeywordWatch, NewTarget, WatchDiscovery,
};
use crate::net::Fetcher;
use crate::notify::Notifier;
use crate::repository::{SettingsRepository, TargetRepository, WatchRepository};
use crate::scheduler::{jitter, CheckScheduler};

pub struct DiscoveryEngine {
    watches: Arc<dyn WatchRepository>,
    targets: Arc<dyn TargetRepository>,
    settings: Arc<dyn SettingsRepository>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    /// Used to check freshly auto-added targets right away.
    scheduler: Option<Arc<CheckScheduler>>,
    config: AppConfig,
    /// Watch ids currently being processed.
    in_flight: Mutex<HashSet<i64>>,
    batch_guard: Mutex<()>,
}

impl DiscoveryEngine {
    pub fn new(
        watches: Arc<dyn WatchRepository>,
        targets: Arc<dyn TargetRepository>,
        settings: Arc<dyn SettingsRepository>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        scheduler: Option<Arc<CheckScheduler>>,
        config: AppConfig,
    ) -> Self {
        Self {
            watches,
            targets,
            settings,
            fetcher,
            notifier,
            scheduler,
            config,
            in_flight: Mutex::new(HashSet::new()),
            batch_guard: Mutex::new(()),
        }
    }

    async fn global_interval_minutes(&self) -> u32 {
        match self.settings.get_setting("watch_interval_minutes").await {
            Ok(Some(raw)) => raw
                .parse::<u32>()
                .ok()
                .filter(|m| (1..=1440).contains(m))
                .unwrap_or(self.config.watch_interval_minutes),
            _ => self.config.watch_interval_minutes,
        }
    }

    /// Run all due watches sequentially, with a pause between stores. A
    /// batch already in flight makes this a no-op.
    pub async fn check_all_due(&self, force: bool) -> Result<usize> {
        let Ok(_guard) = self.batch_guard.try_lock() else {
            warn!("watch batch already running, skipping");
            return Ok(0);
        };

        let interval = self.global_interval_minutes().await;
        let now = Utc::now();
        let due: Vec<KeywordWatch> = self
            .watches
            .list_watches()
            .await?
            .into_iter()
            .filter(|w| w.active && (force || w.is_due(now, interval)))
            .collect();

        let mut ran = 0;
        for (i, watch) in due.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(jitter(3000, 2000)).await;
            }
            match self.check_watch(watch.id).await {
                Ok(_) => ran += 1,
                Err(err) => warn!("watch {} failed: {:#}", watch.id, err),
            }
        }
        Ok(ran)
    }

    /// Run discovery for one watch. Returns how many relevant products the
    /// run found. Re-entrant calls for the same watch are dropped.
    pub async fn check_watch(&self, watch_id: i64) -> Result<usize> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(watch_id) {
                warn!("watch {} already running, skipping", watch_id);
                return Ok(0);
            }
        }
        let result = self.run_watch(watch_id).await;
        self.in_flight.lock().await.remove(&watch_id);
        result
    }

    async fn run_watch(&self, watch_id: i64) -> Result<usize> {
        let Some(mut watch) = self.watches.get_watch(watch_id).await? else {
            anyhow::bail!("no such watch: {watch_id}");
        };

        info!("running watch {} ({:?})", watch.id, watch.keyword);
        let channels = channels::run_all_channels(self.fetcher.as_ref(), &watch).await;
        let found: Vec<DiscoveredProduct> = merge::merge_candidates(channels)
            .into_iter()
            .filter(|p| {
                merge::is_relevant(&watch.keyword, &p.name)
                    || merge::is_relevant(&watch.keyword, &p.url)
            })
            .filter(|p| merge::within_price_band(p.price, watch.min_price, watch.max_price))
            .collect();
        debug!("watch {}: {} relevant products", watch.id, found.len());

        let (new_items, back_in_stock) = merge::diff_run(&watch, &found);

        if watch.auto_add_tracking {
            self.promote_to_targets(&watch, &new_items).await;
        }

        let tracked: BTreeSet<String> = self
            .targets
            .list_targets()
            .await?
            .into_iter()
            .map(|t| t.url)
            .collect();
        watch.known_product_urls =
            merge::collect_known_urls(&watch.known_product_urls, &tracked, &found);
        for product in &found {
            if product.in_stock != Availability::Unknown {
                watch
                    .known_stock_map
                    .insert(product.url.clone(), product.in_stock.persisted());
            }
        }
        watch
            .known_stock_map
            .retain(|url, _| watch.known_product_urls.contains(url));
        watch.last_checked = Some(Utc::now());
        watch.last_found_count = found.len() as u32;
        self.watches.update_watch(&watch).await?;

        let event = WatchDiscovery {
            new_items: if watch.notify_new_products {
                new_items
            } else {
                Vec::new()
            },
            back_in_stock: if watch.notify_in_stock {
                back_in_stock
            } else {
                Vec::new()
            },
            watch,
        };
        if !event.new_items.is_empty() || !event.back_in_stock.is_empty() {
            self.notifier.watch_results(&event).await;
        }

        Ok(found.len())
    }

    /// Insert newly discovered products as monitored targets and check them
    /// immediately so they carry real stock state from the start.
    async fn promote_to_targets(&self, watch: &KeywordWatch, new_items: &[DiscoveredProduct]) {
        for item in new_items {
            match self.targets.find_target_by_url(&item.url).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    warn!("target lookup failed for {}: {:#}", item.url, err);
                    continue;
                }
            }
            let inserted = self
                .targets
                .insert_target(NewTarget {
                    name: item.name.clone(),
                    url: item.url.clone(),
                    store: watch.store_name.clone(),
                    current_price: item.price,
                    check_interval_minutes: 0,
                    notify_on_stock: true,
                    notify_on_price_drop: true,
                })
                .await;
            match inserted {
                Ok(target) => {
                    info!("auto-added target {} for {}", target.id, target.url);
                    if let Some(ref scheduler) = self.scheduler {
                        if let Err(err) = scheduler.check_one(target.id).await {
                            warn!("initial check failed for target {}: {:#}", target.id, err);
                        }
                    }
                }
                Err(err) => warn!("auto-add failed for {}: {:#}", item.url, err),
            }
        }
    }
}
