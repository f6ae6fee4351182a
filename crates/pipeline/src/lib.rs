//! Client-side wind pipeline: single-flight cache, trend window, local
//! history and persisted display settings.

pub mod blob;
pub mod cache;
pub mod generation;
pub mod history;
pub mod settings;
pub mod trend;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use cache::{CacheEntry, ResourceKind, SingleFlightCache};
pub use generation::{Debouncer, GenerationGate};
pub use history::{HistoryRecord, HistoryStats, HistoryStore, HISTORY_KEY};
pub use settings::{DisplaySettings, SettingsStore, SETTINGS_KEY};
pub use trend::{TrendAnalyzer, TrendWindowInfo};
