//! End-to-end scheduler passes over scripted storefronts.

mod common;

use std::sync::Arc;

use common::{RecordingNotifier, StubFetcher};
use stockwatch::config::AppConfig;
use stockwatch::models::NewTarget;
use stockwatch::probe::OrderLimitProber;
use stockwatch::repository::{
    MemoryRepository, SettingsRepository, TargetRepository,
};
use stockwatch::scheduler::CheckScheduler;
use stockwatch::scrape::EvidenceExtractor;

struct Harness {
    repo: Arc<MemoryRepository>,
    fetcher: Arc<StubFetcher>,
    notifier: Arc<RecordingNotifier>,
    scheduler: CheckScheduler,
}

fn harness(with_prober: bool) -> Harness {
    let repo = Arc::new(MemoryRepository::new());
    let fetcher = Arc::new(StubFetcher::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let extractor = EvidenceExtractor::new(fetcher.clone(), None);
    let prober = with_prober.then(|| OrderLimitProber::new(fetcher.clone()));
    let scheduler = CheckScheduler::new(
        repo.clone(),
        repo.clone(),
        extractor,
        prober,
        notifier.clone(),
        AppConfig::default(),
    );
    Harness {
        repo,
        fetcher,
        notifier,
        scheduler,
    }
}

fn new_target(url: &str, store: &str) -> NewTarget {
    NewTarget {
        name: "Widget".into(),
        url: url.into(),
        store: store.into(),
        current_price: None,
        check_interval_minutes: 0,
        notify_on_stock: true,
        notify_on_price_drop: true,
    }
}

#[tokio::test(start_paused = true)]
async fn page_evidence_overrides_platform_unavailable() {
    let h = harness(false);
    let target = h
        .repo
        .insert_target(new_target("https://s.example/products/widget", "shopify"))
        .await
        .unwrap();

    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":111,"available":false,"price":"19.99"}],"images":[]}"#,
    );
    h.fetcher.route(
        "https://s.example/products/widget",
        200,
        r#"<form action="/cart/add">
             <div class="product-form__buttons">Na zalogi</div>
             <button name="add">Add to cart</button>
           </form>"#,
    );

    let stats = h.scheduler.check_due(true).await.unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.stock_changes, 1);

    let reloaded = h.repo.get_target(target.id).await.unwrap().unwrap();
    assert!(reloaded.in_stock);
    assert_eq!(reloaded.current_price, Some(19.99));
    assert_eq!(reloaded.variant_id.as_deref(), Some("111"));
    assert!(reloaded.last_in_stock.is_some());

    let events = h.notifier.stock_events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].in_stock);
    assert!(!events[0].previously_in_stock);
    assert_eq!(
        events[0].cart_hint_url.as_deref(),
        Some("https://s.example/cart/111:1?return_to=/cart")
    );

    assert_eq!(h.repo.history(target.id, 10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn definite_platform_availability_skips_the_page_fetch() {
    let h = harness(false);
    h.repo
        .insert_target(new_target("https://s.example/products/widget", "shopify"))
        .await
        .unwrap();

    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":7,"available":true,"price":1350,"inventory_quantity":3}]}"#,
    );

    let stats = h.scheduler.check_due(true).await.unwrap();
    assert_eq!(stats.stock_changes, 1);

    let requests = h.fetcher.requests.lock().unwrap();
    assert!(requests.contains(&"https://s.example/products/widget.js".to_string()));
    assert!(!requests.contains(&"https://s.example/products/widget".to_string()));
}

#[tokio::test(start_paused = true)]
async fn price_drop_is_notified_without_stock_flip() {
    let h = harness(false);
    let mut target = h
        .repo
        .insert_target(new_target("https://s.example/item/widget", "custom"))
        .await
        .unwrap();
    target.in_stock = true;
    target.current_price = Some(20.0);
    h.repo.update_target(&target).await.unwrap();

    h.fetcher.route(
        "https://s.example/item/widget",
        200,
        r#"<div class="stock">In stock</div><span class="price">€ 18,00</span>"#,
    );

    h.scheduler.check_due(true).await.unwrap();

    assert!(h.notifier.stock_events.lock().unwrap().is_empty());
    let price_events = h.notifier.price_events.lock().unwrap();
    assert_eq!(price_events.len(), 1);
    assert_eq!(price_events[0].old_price, 20.0);
    assert_eq!(price_events[0].new_price, 18.0);
}

#[tokio::test(start_paused = true)]
async fn small_price_move_is_not_notified() {
    let h = harness(false);
    let mut target = h
        .repo
        .insert_target(new_target("https://s.example/item/widget", "custom"))
        .await
        .unwrap();
    target.in_stock = true;
    target.current_price = Some(20.0);
    h.repo.update_target(&target).await.unwrap();

    h.fetcher.route(
        "https://s.example/item/widget",
        200,
        r#"<div class="stock">In stock</div><span class="price">€ 19,80</span>"#,
    );

    h.scheduler.check_due(true).await.unwrap();
    assert!(h.notifier.price_events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_advances_clock_without_state_change() {
    let h = harness(false);
    let target = h
        .repo
        .insert_target(new_target("https://s.example/item/widget", "custom"))
        .await
        .unwrap();

    let stats = h.scheduler.check_due(true).await.unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.failed, 1);

    let reloaded = h.repo.get_target(target.id).await.unwrap().unwrap();
    assert!(!reloaded.in_stock);
    assert!(reloaded.last_checked.is_some());
    assert!(h.notifier.stock_events.lock().unwrap().is_empty());
    assert!(h.repo.history(target.id, 10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn flip_to_in_stock_probes_order_limit_and_reclassifies_store() {
    let h = harness(true);
    let target = h
        .repo
        .insert_target(new_target("https://s.example/products/widget", "custom"))
        .await
        .unwrap();

    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":42,"available":true,"price":"9.99","inventory_quantity":10}]}"#,
    );
    h.fetcher.route(
        "https://s.example/cart/add.js",
        422,
        r#"{"description":"You can add at most 2 of this item to your cart."}"#,
    );
    h.fetcher.route("https://s.example/cart/clear.js", 200, "{}");

    h.scheduler.check_due(true).await.unwrap();

    let reloaded = h.repo.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(reloaded.store, "shopify");
    assert_eq!(reloaded.max_order_qty, Some(2));

    let events = h.notifier.stock_events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].target.max_order_qty, Some(2));
}

#[tokio::test(start_paused = true)]
async fn never_checked_target_is_due_once_per_interval() {
    let h = harness(false);
    h.repo
        .insert_target(new_target("https://s.example/products/widget", "shopify"))
        .await
        .unwrap();
    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":7,"available":true,"price":"5.00"}]}"#,
    );

    // A target with no last_checked is due immediately.
    let first = h.scheduler.check_due(false).await.unwrap();
    assert_eq!(first.checked, 1);

    // Once stamped, it stays off the schedule until the interval elapses.
    let second = h.scheduler.check_due(false).await.unwrap();
    assert_eq!(second.checked, 0);
}

#[tokio::test(start_paused = true)]
async fn manual_check_reannounces_an_in_stock_target() {
    let h = harness(false);
    let mut target = h
        .repo
        .insert_target(new_target("https://s.example/products/widget", "shopify"))
        .await
        .unwrap();
    target.in_stock = true;
    h.repo.update_target(&target).await.unwrap();

    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":42,"available":true,"price":"9.99"}]}"#,
    );

    let flipped = h.scheduler.check_one(target.id).await.unwrap();
    assert!(!flipped);

    let events = h.notifier.stock_events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].previously_in_stock);
    assert!(events[0].in_stock);
    assert_eq!(
        events[0].cart_hint_url.as_deref(),
        Some("https://s.example/cart/42:1?return_to=/cart")
    );
}

#[tokio::test(start_paused = true)]
async fn inconclusive_probe_keeps_previously_resolved_order_limit() {
    let h = harness(false);
    let mut target = h
        .repo
        .insert_target(new_target("https://s.example/products/widget", "shopify"))
        .await
        .unwrap();
    target.in_stock = true;
    target.max_order_qty = Some(3);
    h.repo.update_target(&target).await.unwrap();

    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":42,"available":true,"price":"9.99"}]}"#,
    );

    h.scheduler.check_one(target.id).await.unwrap();

    let reloaded = h.repo.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(reloaded.max_order_qty, Some(3));
}

#[tokio::test(start_paused = true)]
async fn pass_records_global_stats() {
    let h = harness(false);
    h.repo
        .insert_target(new_target("https://s.example/products/widget", "shopify"))
        .await
        .unwrap();
    h.fetcher.route(
        "https://s.example/products/widget.js",
        200,
        r#"{"variants":[{"id":7,"available":true,"price":"5.00"}]}"#,
    );

    h.scheduler.check_due(true).await.unwrap();
    assert!(h.repo.get_setting("last_check_at").await.unwrap().is_some());
    assert_eq!(
        h.repo.get_setting("total_checks").await.unwrap(),
        Some("1".to_string())
    );
}
