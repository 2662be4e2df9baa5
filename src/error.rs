//! Unified error taxonomy for InnoCore.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Variants
//! mirror the error-kind table in the storage core specification: each
//! surfaces to the caller except where a local recovery path is explicitly
//! documented (zero-initialized pages, transient lock timeouts).

use thiserror::Error;

use crate::common::ids::{PageId, SpaceId, TrxId};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the storage core can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure from a tablespace file read/write/fsync.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Page codec validation failed (bad header, missing sentinels, size
    /// mismatch, checksum mismatch).
    #[error("page {space}:{page} invalid: {reason}")]
    PageInvalid {
        space: SpaceId,
        page: u32,
        reason: String,
    },

    /// A requested tablespace, index, key, or transaction was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A named tablespace already exists.
    #[error("tablespace {0:?} already exists")]
    TablespaceExists(String),

    /// A named tablespace could not be located.
    #[error("tablespace {0:?} not found")]
    TablespaceNotFound(String),

    /// Unique-index insert collided with an existing key.
    #[error("duplicate key")]
    Duplicate,

    /// Requested key is absent from an index.
    #[error("key not found")]
    KeyNotFound,

    /// A transaction was asked to commit/rollback from a state that does
    /// not allow it.
    #[error("transaction {0:?} is in an invalid state for this operation")]
    TxInvalidState(TrxId),

    /// The deadlock detector chose this transaction as its victim.
    #[error("transaction {0:?} aborted to break a deadlock")]
    DeadlockAborted(TrxId),

    /// A lock request exceeded its configured wait timeout.
    #[error("lock wait timed out")]
    LockTimeout,

    /// Every buffer-pool frame is pinned; no victim is available.
    #[error("no free frames available in buffer pool")]
    NoFreePages,

    /// An on-disk invariant was violated (header/trailer mismatch, interior
    /// node with no children, etc). Fatal — the caller should stop trusting
    /// the affected page/tree and may trigger recovery.
    #[error("corruption detected: {0}")]
    Corrupt(String),

    /// An internal capacity limit was exceeded (e.g. max active
    /// transactions).
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The requested page id does not correspond to an allocated page.
    #[error("page {0:?} not found")]
    PageNotFound(PageId),
}

impl Error {
    /// True for errors a caller may reasonably retry (lock timeouts,
    /// deadlock victims). Other errors are not transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout | Error::DeadlockAborted(_))
    }
}
