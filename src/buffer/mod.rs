//! Buffer pool: fixed-capacity page cache with a midpoint-insertion LRU,
//! pin-count-based eviction safety, and background dirty-page writeback.

mod buffer_pool_manager;
mod flusher;
mod frame;
mod lru;
mod page_guard;
mod prefetch;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use flusher::BackgroundFlusher;
pub use frame::Frame;
pub use lru::LruReplacer;
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use prefetch::PrefetchWorker;
pub use stats::{BufferPoolStats, StatsSnapshot};
