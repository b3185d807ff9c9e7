//! In-memory repository with an optional JSON state file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{KeywordWatch, MonitoredTarget, NewTarget, StockHistoryRecord};

use super::{SettingsRepository, TargetRepository, WatchRepository};

/// On-disk shape of the whole monitor state.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    targets: Vec<MonitoredTarget>,
    #[serde(default)]
    watches: Vec<KeywordWatch>,
    #[serde(default)]
    history: Vec<StockHistoryRecord>,
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    next_target_id: i64,
}

/// Bounded history length per target kept in the state file.
const HISTORY_CAP: usize = 500;

pub struct MemoryRepository {
    state: RwLock<StateFile>,
    path: Option<PathBuf>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StateFile::default()),
            path: None,
        }
    }

    /// Load state from a JSON file, creating an empty state when the file
    /// does not exist yet.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("invalid state file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("state file {} not found, starting empty", path.display());
                StateFile::default()
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Add a watch directly; watches are normally seeded through the state
    /// file rather than a runtime API.
    pub async fn insert_watch(&self, watch: KeywordWatch) -> Result<()> {
        let mut state = self.state.write().await;
        state.watches.push(watch);
        self.persist(&state).await
    }

    async fn persist(&self, state: &StateFile) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(state)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetRepository for MemoryRepository {
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>> {
        Ok(self.state.read().await.targets.clone())
    }

    async fn get_target(&self, id: i64) -> Result<Option<MonitoredTarget>> {
        Ok(self
            .state
            .read()
            .await
            .targets
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn find_target_by_url(&self, url: &str) -> Result<Option<MonitoredTarget>> {
        Ok(self
            .state
            .read()
            .await
            .targets
            .iter()
            .find(|t| t.url == url)
            .cloned())
    }

    async fn insert_target(&self, target: NewTarget) -> Result<MonitoredTarget> {
        let mut state = self.state.write().await;
        // A URL is tracked at most once; a duplicate insert yields the row
        // that already owns it instead of a second target.
        if let Some(existing) = state.targets.iter().find(|t| t.url == target.url) {
            return Ok(existing.clone());
        }
        state.next_target_id += 1;
        let target = MonitoredTarget {
            id: state.next_target_id,
            name: target.name,
            url: target.url,
            store: target.store,
            target_price: None,
            check_interval_minutes: target.check_interval_minutes,
            in_stock: false,
            current_price: target.current_price,
            currency: "EUR".to_string(),
            image_url: None,
            variant_id: None,
            max_order_qty: None,
            last_checked: None,
            last_in_stock: None,
            notify_on_stock: target.notify_on_stock,
            notify_on_price_drop: target.notify_on_price_drop,
            selector_overrides: None,
        };
        state.targets.push(target.clone());
        self.persist(&state).await?;
        Ok(target)
    }

    async fn update_target(&self, target: &MonitoredTarget) -> Result<()> {
        let mut state = self.state.write().await;
        match state.targets.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => *existing = target.clone(),
            None => anyhow::bail!("no such target: {}", target.id),
        }
        self.persist(&state).await
    }

    async fn record_history(&self, record: StockHistoryRecord) -> Result<()> {
        let mut state = self.state.write().await;
        let target_id = record.target_id;
        state.history.push(record);
        let per_target = state
            .history
            .iter()
            .filter(|r| r.target_id == target_id)
            .count();
        if per_target > HISTORY_CAP {
            let excess = per_target - HISTORY_CAP;
            let mut dropped = 0;
            state.history.retain(|r| {
                if r.target_id == target_id && dropped < excess {
                    dropped += 1;
                    false
                } else {
                    true
                }
            });
        }
        self.persist(&state).await
    }

    async fn history(&self, target_id: i64, limit: usize) -> Result<Vec<StockHistoryRecord>> {
        let state = self.state.read().await;
        let mut rows: Vec<StockHistoryRecord> = state
            .history
            .iter()
            .filter(|r| r.target_id == target_id)
            .cloned()
            .collect();
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        Ok(rows)
    }
}

#[async_trait]
impl WatchRepository for MemoryRepository {
    async fn list_watches(&self) -> Result<Vec<KeywordWatch>> {
        Ok(self.state.read().await.watches.clone())
    }

    async fn get_watch(&self, id: i64) -> Result<Option<KeywordWatch>> {
        Ok(self
            .state
            .read()
            .await
            .watches
            .iter()
            .find(|w| w.id == id)
            .cloned())
    }

    async fn update_watch(&self, watch: &KeywordWatch) -> Result<()> {
        let mut state = self.state.write().await;
        match state.watches.iter_mut().find(|w| w.id == watch.id) {
            Some(existing) => *existing = watch.clone(),
            None => anyhow::bail!("no such watch: {}", watch.id),
        }
        self.persist(&state).await
    }
}

#[async_trait]
impl SettingsRepository for MemoryRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.read().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.settings.insert(key.to_string(), value.to_string());
        self.persist(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_target(url: &str) -> NewTarget {
        NewTarget {
            name: "Widget".into(),
            url: url.into(),
            store: "shopify".into(),
            current_price: Some(19.99),
            check_interval_minutes: 0,
            notify_on_stock: true,
            notify_on_price_drop: true,
        }
    }

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let repo = MemoryRepository::new();
        let a = repo
            .insert_target(new_target("https://s.example/products/a"))
            .await
            .unwrap();
        let b = repo
            .insert_target(new_target("https://s.example/products/b"))
            .await
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(repo.list_targets().await.unwrap().len(), 2);
        assert!(repo
            .find_target_by_url("https://s.example/products/a")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn duplicate_url_insert_returns_the_existing_row() {
        let repo = MemoryRepository::new();
        let first = repo
            .insert_target(new_target("https://s.example/products/a"))
            .await
            .unwrap();
        let second = repo
            .insert_target(new_target("https://s.example/products/a"))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(repo.list_targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_target_in_place() {
        let repo = MemoryRepository::new();
        let mut target = repo
            .insert_target(new_target("https://s.example/products/a"))
            .await
            .unwrap();
        target.in_stock = true;
        target.current_price = Some(9.99);
        repo.update_target(&target).await.unwrap();

        let reloaded = repo.get_target(target.id).await.unwrap().unwrap();
        assert!(reloaded.in_stock);
        assert_eq!(reloaded.current_price, Some(9.99));
    }

    #[tokio::test]
    async fn history_is_filtered_and_bounded() {
        let repo = MemoryRepository::new();
        for i in 0..3 {
            repo.record_history(StockHistoryRecord {
                target_id: 1,
                in_stock: i % 2 == 0,
                price: None,
                checked_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        repo.record_history(StockHistoryRecord {
            target_id: 2,
            in_stock: true,
            price: None,
            checked_at: Utc::now(),
        })
        .await
        .unwrap();

        assert_eq!(repo.history(1, 10).await.unwrap().len(), 3);
        assert_eq!(repo.history(1, 2).await.unwrap().len(), 2);
        assert_eq!(repo.history(2, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn state_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("stockwatch-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("state.json");

        {
            let repo = MemoryRepository::open(path.clone()).await.unwrap();
            repo.insert_target(new_target("https://s.example/products/a"))
                .await
                .unwrap();
            repo.set_setting("check_interval_minutes", "7").await.unwrap();
        }

        let repo = MemoryRepository::open(path.clone()).await.unwrap();
        assert_eq!(repo.list_targets().await.unwrap().len(), 1);
        assert_eq!(
            repo.get_setting("check_interval_minutes").await.unwrap(),
            Some("7".to_string())
        );
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
