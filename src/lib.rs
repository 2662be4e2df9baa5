//! InnoCore -- the storage engine core of an InnoDB-compatible relational
//! database: tablespaces and the on-disk page format, a buffer pool with
//! midpoint-insertion LRU, a B+tree index engine, write-ahead redo and
//! undo logs, a lock table with deadlock detection, MVCC read views, and
//! the space/segment/extent allocator tying it all to disk.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         engine (facades)                         │
//! │         StorageManager  ·  IndexManager  ·  Dictionary           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │   txn (I/J)        │   lock (H)        │   redo (F) / undo (G)    │
//! │   transaction mgr   │   lock table +    │   write-ahead log +     │
//! │   + MVCC read views │   deadlock detect │   undo chains           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                     index::btree (E)                              │
//! │              ordered key/value B+tree engine                      │
//! ├───────────────────────────────────────────────────────────────────┤
//! │   buffer (C)                        │   alloc (B)                 │
//! │   midpoint-insertion LRU pool        │   space/segment/extent      │
//! ├───────────────────────────────────────────────────────────────────┤
//! │               storage::{page (D), tablespace (A)}                 │
//! │                  on-disk page format + file I/O                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] -- shared ids, error-independent config, size constants
//! - [`error`] -- the crate's unified `Error`/`Result`
//! - [`storage`] -- tablespace files and the on-disk page format
//! - [`alloc`] -- space/segment/extent allocation
//! - [`buffer`] -- the buffer pool
//! - [`index`] -- the B+tree index engine
//! - [`redo`] -- write-ahead redo log
//! - [`undo`] -- per-transaction undo chains
//! - [`lock`] -- lock table and deadlock detection
//! - [`txn`] -- transaction lifecycle and MVCC read views
//! - [`dict`] -- the data dictionary
//! - [`sysvars`] -- system variables store
//! - [`engine`] -- [`engine::StorageManager`] and [`engine::IndexManager`],
//!   the facades most callers actually use
//!
//! # Quick Start
//! ```no_run
//! use innocore::common::config::StorageEngineConfig;
//! use innocore::engine::StorageManager;
//!
//! let config = StorageEngineConfig::default();
//! let manager = StorageManager::open(config).unwrap();
//! let table_id = manager
//!     .create_table(innocore::dict::TableDef {
//!         name: "orders".to_string(),
//!         columns: vec![("id".to_string(), 1)],
//!     })
//!     .unwrap();
//! ```

pub mod alloc;
pub mod buffer;
pub mod common;
pub mod dict;
pub mod engine;
pub mod error;
pub mod index;
pub mod lock;
pub mod redo;
pub mod storage;
pub mod sysvars;
pub mod txn;
pub mod undo;

pub use common::config::PAGE_SIZE;
pub use common::{FrameId, PageId};
pub use error::{Error, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use engine::{IndexManager, StorageManager};
pub use storage::page::{Page, PageHeaderFields, PageType};
pub use storage::TablespaceRegistry;
