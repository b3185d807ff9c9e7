//! Persistence seams. The monitor core only talks to these traits; the
//! bundled implementation keeps everything in memory behind a JSON state
//! file so the CLI works without external services.

mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{KeywordWatch, MonitoredTarget, NewTarget, StockHistoryRecord};

pub use memory::MemoryRepository;

#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>>;
    async fn get_target(&self, id: i64) -> Result<Option<MonitoredTarget>>;
    async fn find_target_by_url(&self, url: &str) -> Result<Option<MonitoredTarget>>;
    /// URLs are unique; inserting a URL that is already tracked returns the
    /// existing target.
    async fn insert_target(&self, target: NewTarget) -> Result<MonitoredTarget>;
    async fn update_target(&self, target: &MonitoredTarget) -> Result<()>;
    async fn record_history(&self, record: StockHistoryRecord) -> Result<()>;
    async fn history(&self, target_id: i64, limit: usize) -> Result<Vec<StockHistoryRecord>>;
}

#[async_trait]
pub trait WatchRepository: Send + Sync {
    async fn list_watches(&self) -> Result<Vec<KeywordWatch>>;
    async fn get_watch(&self, id: i64) -> Result<Option<KeywordWatch>>;
    async fn update_watch(&self, watch: &KeywordWatch) -> Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}
