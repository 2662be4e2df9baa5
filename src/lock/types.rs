//! Lock table types: modes, resources, and internal wait-queue records.

use std::time::Instant;

use crate::common::ids::TrxId;

/// Lock mode. Shared locks are mutually compatible with each other;
/// exclusive locks are incompatible with every other mode on the same
/// resource (S/S ok, S/X and X/X not).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn compatible_with(self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Opaque identifier for whatever is being locked -- a row id or page id,
/// packed into 64 bits by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Holder {
    pub trx_id: TrxId,
    pub mode: LockMode,
}

#[derive(Debug, Clone)]
pub(crate) struct WaitRequest {
    pub trx_id: TrxId,
    pub mode: LockMode,
    pub enqueued_at: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct ResourceState {
    pub holders: Vec<Holder>,
    pub waiters: std::collections::VecDeque<WaitRequest>,
}
