//! Shared test doubles: a scripted HTTP transport and a recording notifier.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use stockwatch::models::{TargetPriceDropped, TargetStateChanged, WatchDiscovery};
use stockwatch::net::{Accept, FetchError, FetchedPage, Fetcher};
use stockwatch::notify::Notifier;

/// Transport stub that serves canned responses by exact URL and records
/// every request. Unrouted URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    routes: Mutex<HashMap<String, (u16, String)>>,
    pub requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    fn lookup(&self, url: &str) -> FetchedPage {
        self.requests.lock().unwrap().push(url.to_string());
        match self.routes.lock().unwrap().get(url) {
            Some((status, body)) => FetchedPage {
                status: *status,
                body: body.clone(),
            },
            None => FetchedPage {
                status: 404,
                body: String::new(),
            },
        }
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn get(&self, url: &str, _accept: Accept) -> Result<FetchedPage, FetchError> {
        let page = self.lookup(url);
        match page.status {
            200..=399 => Ok(page),
            status => Err(FetchError::Status(status)),
        }
    }

    async fn get_lenient(&self, url: &str, _accept: Accept) -> Result<FetchedPage, FetchError> {
        Ok(self.lookup(url))
    }

    async fn post_json(&self, url: &str, _body: Value) -> Result<FetchedPage, FetchError> {
        Ok(self.lookup(url))
    }
}

/// Notifier that stores every event for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub stock_events: Mutex<Vec<TargetStateChanged>>,
    pub price_events: Mutex<Vec<TargetPriceDropped>>,
    pub watch_events: Mutex<Vec<WatchDiscovery>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn stock_changed(&self, event: &TargetStateChanged) {
        self.stock_events.lock().unwrap().push(event.clone());
    }

    async fn price_dropped(&self, event: &TargetPriceDropped) {
        self.price_events.lock().unwrap().push(event.clone());
    }

    async fn watch_results(&self, event: &WatchDiscovery) {
        self.watch_events.lock().unwrap().push(event.clone());
    }
}
