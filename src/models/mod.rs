//! Domain models for stock monitoring and keyword discovery.

mod evidence;
mod events;
mod profile;
mod target;
mod watch;

pub use evidence::{resolve_signals, Availability, ScrapeEvidence, SignalSource, StockSignal};
pub use events::{TargetPriceDropped, TargetStateChanged, WatchDiscovery};
pub use profile::{SelectorOverrides, StoreProfile, PLATFORM_PROFILE};
pub use target::{MonitoredTarget, NewTarget, StockHistoryRecord};
pub use watch::{DiscoveredProduct, KeywordWatch};
