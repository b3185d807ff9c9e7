//! End-to-end keyword discovery runs over scripted storefronts.

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::{RecordingNotifier, StubFetcher};
use stockwatch::config::AppConfig;
use stockwatch::discovery::DiscoveryEngine;
use stockwatch::models::KeywordWatch;
use stockwatch::probe::OrderLimitProber;
use stockwatch::repository::{MemoryRepository, TargetRepository, WatchRepository};
use stockwatch::scheduler::CheckScheduler;
use stockwatch::scrape::EvidenceExtractor;

const CATALOG_URL: &str = "https://s.example/collections/all/products.json?limit=50&page=1";

fn watch(keyword: &str) -> KeywordWatch {
    KeywordWatch {
        id: 1,
        keyword: keyword.into(),
        store_url: "https://s.example".into(),
        store_name: "shopify".into(),
        search_url: None,
        check_interval_minutes: 0,
        min_price: None,
        max_price: None,
        notify_new_products: true,
        notify_in_stock: true,
        auto_add_tracking: false,
        known_product_urls: BTreeSet::new(),
        known_stock_map: BTreeMap::new(),
        active: true,
        last_checked: None,
        last_found_count: 0,
    }
}

struct Harness {
    repo: Arc<MemoryRepository>,
    fetcher: Arc<StubFetcher>,
    notifier: Arc<RecordingNotifier>,
    engine: DiscoveryEngine,
}

fn harness(with_scheduler: bool) -> Harness {
    let repo = Arc::new(MemoryRepository::new());
    let fetcher = Arc::new(StubFetcher::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = with_scheduler.then(|| {
        Arc::new(CheckScheduler::new(
            repo.clone(),
            repo.clone(),
            EvidenceExtractor::new(fetcher.clone(), None),
            Some(OrderLimitProber::new(fetcher.clone())),
            notifier.clone(),
            AppConfig::default(),
        ))
    });
    let engine = DiscoveryEngine::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        fetcher.clone(),
        notifier.clone(),
        scheduler,
        AppConfig::default(),
    );
    Harness {
        repo,
        fetcher,
        notifier,
        engine,
    }
}

fn route_catalog(fetcher: &StubFetcher) {
    fetcher.route(
        CATALOG_URL,
        200,
        r#"{"products":[
            {"handle":"matcha-widget","title":"Matcha Widget 40g",
             "variants":[{"price":"12.00","available":true}],
             "images":[{"src":"https://cdn.example/m.jpg"}]},
            {"handle":"earl-grey","title":"Earl Grey",
             "variants":[{"price":"8.00","available":true}],"images":[]}
        ]}"#,
    );
}

#[tokio::test(start_paused = true)]
async fn new_relevant_product_is_reported_and_remembered() {
    let h = harness(false);
    h.repo.insert_watch(watch("matcha")).await.unwrap();
    route_catalog(&h.fetcher);

    let found = h.engine.check_watch(1).await.unwrap();
    assert_eq!(found, 1);

    let events = h.notifier.watch_events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].new_items.len(), 1);
    assert_eq!(
        events[0].new_items[0].url,
        "https://s.example/products/matcha-widget"
    );
    assert_eq!(events[0].new_items[0].price, Some(12.0));
    drop(events);

    let reloaded = h.repo.get_watch(1).await.unwrap().unwrap();
    assert!(reloaded
        .known_product_urls
        .contains("https://s.example/products/matcha-widget"));
    assert_eq!(
        reloaded
            .known_stock_map
            .get("https://s.example/products/matcha-widget"),
        Some(&true)
    );
    assert_eq!(reloaded.last_found_count, 1);
    assert!(reloaded.last_checked.is_some());
}

#[tokio::test(start_paused = true)]
async fn known_product_back_in_stock_is_reported() {
    let h = harness(false);
    let mut w = watch("matcha");
    w.known_product_urls
        .insert("https://s.example/products/matcha-widget".into());
    w.known_stock_map
        .insert("https://s.example/products/matcha-widget".into(), false);
    h.repo.insert_watch(w).await.unwrap();
    route_catalog(&h.fetcher);

    h.engine.check_watch(1).await.unwrap();

    let events = h.notifier.watch_events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].new_items.is_empty());
    assert_eq!(events[0].back_in_stock.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn price_band_filters_candidates() {
    let h = harness(false);
    let mut w = watch("matcha");
    w.min_price = Some(20.0);
    h.repo.insert_watch(w).await.unwrap();
    route_catalog(&h.fetcher);

    let found = h.engine.check_watch(1).await.unwrap();
    assert_eq!(found, 0);
    assert!(h.notifier.watch_events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_add_promotes_and_checks_new_product() {
    let h = harness(true);
    let mut w = watch("matcha");
    w.auto_add_tracking = true;
    h.repo.insert_watch(w).await.unwrap();
    route_catalog(&h.fetcher);
    h.fetcher.route(
        "https://s.example/products/matcha-widget.js",
        200,
        r#"{"variants":[{"id":5,"available":true,"price":"12.00","inventory_quantity":2}]}"#,
    );
    h.fetcher.route("https://s.example/cart/add.js", 200, "{}");
    h.fetcher.route(
        "https://s.example/cart.js",
        200,
        r#"{"items":[{"variant_id":5,"quantity":5}]}"#,
    );
    h.fetcher.route("https://s.example/cart/clear.js", 200, "{}");

    h.engine.check_watch(1).await.unwrap();

    let target = h
        .repo
        .find_target_by_url("https://s.example/products/matcha-widget")
        .await
        .unwrap()
        .expect("auto-added target");
    assert_eq!(target.store, "shopify");
    assert!(target.in_stock);
    assert_eq!(target.variant_id.as_deref(), Some("5"));

    // The immediate first check raised a stock notification.
    assert_eq!(h.notifier.stock_events.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_known_urls_age_out_unless_tracked() {
    let h = harness(false);
    let mut w = watch("matcha");
    w.known_product_urls
        .insert("https://s.example/products/discontinued".into());
    w.known_stock_map
        .insert("https://s.example/products/discontinued".into(), true);
    h.repo.insert_watch(w).await.unwrap();
    route_catalog(&h.fetcher);

    h.engine.check_watch(1).await.unwrap();

    let reloaded = h.repo.get_watch(1).await.unwrap().unwrap();
    assert!(!reloaded
        .known_product_urls
        .contains("https://s.example/products/discontinued"));
    assert!(!reloaded
        .known_stock_map
        .contains_key("https://s.example/products/discontinued"));
    assert!(reloaded
        .known_product_urls
        .contains("https://s.example/products/matcha-widget"));
}
