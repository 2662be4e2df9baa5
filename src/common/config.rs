//! Configuration constants and the host-facing configuration struct.

/// Size of a page in bytes. InnoDB's default and the only size this crate
/// supports — the on-disk format in [`crate::storage::page`] is sized
/// against this constant at compile time.
pub const PAGE_SIZE: usize = 16384;

/// Number of pages in one extent (the bulk allocation unit).
pub const PAGES_PER_EXTENT: u32 = 64;

/// Fixed page reservations within the system tablespace (space 0), per the
/// storage core specification's system-tablespace page table.
pub mod system_pages {
    pub const FSP_HEADER: u32 = 0;
    pub const IBUF_BITMAP: u32 = 1;
    pub const INODE: u32 = 2;
    pub const SYSTEM: u32 = 3;
    pub const INDEX_HEADER: u32 = 4;
    pub const DICTIONARY_ROOT: u32 = 5;
    pub const TRANSACTION_SYSTEM: u32 = 6;
    pub const FIRST_ROLLBACK_SEGMENT: u32 = 7;
}

/// Id of the shared system tablespace.
pub const SYSTEM_SPACE_ID: u32 = 0;

/// `innodb_flush_log_at_trx_commit` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushLogAtTrxCommit {
    /// Write and flush the log buffer once per second only (fastest, least
    /// durable).
    EverySecond = 0,
    /// Write and fsync on every commit (default, fully durable).
    EveryCommit = 1,
    /// Write on every commit, fsync once per second.
    WriteEveryCommitFlushEverySecond = 2,
}

impl Default for FlushLogAtTrxCommit {
    fn default() -> Self {
        FlushLogAtTrxCommit::EveryCommit
    }
}

/// Host-supplied configuration. Constructed by the caller (no file parsing
/// lives in this crate — that is the configuration-loading layer's job)
/// and handed to [`crate::engine::StorageManager::open`].
#[derive(Debug, Clone)]
pub struct StorageEngineConfig {
    /// Directory holding `ibdata1`, per-table `.ibd` files, and the
    /// `redo/`, `undo/` subdirectories.
    pub data_dir: std::path::PathBuf,
    /// Page size in bytes. Must equal [`PAGE_SIZE`]; kept as a field so the
    /// host can validate it against its own expectations before opening.
    pub innodb_page_size: usize,
    /// Buffer pool capacity, in bytes. Divided by `innodb_page_size` to
    /// obtain the frame count.
    pub innodb_buffer_pool_size_bytes: u64,
    /// Size, in bytes, of the redo log file (or per-file size in a ring).
    pub innodb_log_file_size: u64,
    /// Durability discipline for commit.
    pub innodb_flush_log_at_trx_commit: FlushLogAtTrxCommit,
    /// Whether user tables get their own `.ibd` file (vs living in the
    /// shared tablespace).
    pub innodb_file_per_table: bool,
    /// Data-file specification for the system tablespace, e.g.
    /// `"ibdata1:100M:autoextend"`. Parsed by [`crate::storage::tablespace`]
    /// only to the extent of the leading file name; sizing hints are
    /// informational in this core.
    pub innodb_data_file_path: String,
    /// Directory for the redo log (defaults under `data_dir/redo`).
    pub innodb_redo_log_dir: std::path::PathBuf,
    /// Directory for undo log files (defaults under `data_dir/undo`).
    pub innodb_undo_log_dir: std::path::PathBuf,
    /// Midpoint-insertion LRU young/old ratio, young_percent in `[1, 99]`.
    pub buffer_pool_young_ratio_percent: u8,
    /// Minimum dwell time (ms) in the OLD sublist before promotion.
    pub buffer_pool_old_block_time_ms: u64,
    /// Background flusher wake interval.
    pub buffer_pool_flush_interval_ms: u64,
    /// Deadlock detector tick interval.
    pub lock_wait_timeout_ms: u64,
    /// Idle-transaction sweep interval and timeout.
    pub trx_idle_timeout_ms: u64,
}

impl Default for StorageEngineConfig {
    fn default() -> Self {
        let data_dir = std::path::PathBuf::from("./data");
        Self {
            innodb_redo_log_dir: data_dir.join("redo"),
            innodb_undo_log_dir: data_dir.join("undo"),
            data_dir,
            innodb_page_size: PAGE_SIZE,
            innodb_buffer_pool_size_bytes: 128 * 1024 * 1024,
            innodb_log_file_size: 48 * 1024 * 1024,
            innodb_flush_log_at_trx_commit: FlushLogAtTrxCommit::EveryCommit,
            innodb_file_per_table: true,
            innodb_data_file_path: "ibdata1:100M:autoextend".to_string(),
            buffer_pool_young_ratio_percent: 75,
            buffer_pool_old_block_time_ms: 1000,
            buffer_pool_flush_interval_ms: 1000,
            lock_wait_timeout_ms: 50_000,
            trx_idle_timeout_ms: 600_000,
        }
    }
}
