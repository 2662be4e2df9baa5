//! MVCC read view: a snapshot of which transactions' writes are visible,
//! captured at transaction start (repeatable read) or statement start
//! (read committed).

use crate::common::ids::TrxId;

/// `{trx_ids, min_trx_id, max_trx_id, creator_trx_id}` per spec §3.
#[derive(Debug, Clone)]
pub struct ReadView {
    /// Transactions active (and therefore invisible, unless they are the
    /// creator) at the moment this view was captured.
    active_set: Vec<TrxId>,
    min_trx_id: TrxId,
    max_trx_id: TrxId,
    creator_trx_id: TrxId,
}

impl ReadView {
    /// Capture a view given the set of currently-active transaction ids
    /// and the next id that will be assigned (`max_trx_id` is exclusive:
    /// anything `>= max_trx_id` did not exist yet and is invisible).
    pub fn capture(active: &[TrxId], next_trx_id: TrxId, creator_trx_id: TrxId) -> Self {
        let min_trx_id = active.iter().copied().min().unwrap_or(next_trx_id);
        Self {
            active_set: active.to_vec(),
            min_trx_id,
            max_trx_id: next_trx_id,
            creator_trx_id,
        }
    }

    pub fn creator_trx_id(&self) -> TrxId {
        self.creator_trx_id
    }

    /// A version written by `writer` is visible iff it was already
    /// committed before this view's min watermark, or it was written by a
    /// transaction below the view's high watermark that wasn't part of
    /// the active set, or the view's own creator wrote it (a transaction
    /// always sees its own uncommitted writes).
    pub fn is_visible(&self, writer: TrxId) -> bool {
        if writer == self.creator_trx_id {
            return true;
        }
        if writer < self.min_trx_id {
            return true;
        }
        if writer >= self.max_trx_id {
            return false;
        }
        !self.active_set.contains(&writer)
    }
}
