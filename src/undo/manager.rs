//! Per-transaction undo chains: append a before-image on write, replay the
//! chain in reverse on rollback, drop it on commit.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::ids::TrxId;
use crate::error::Result;

use super::record::UndoEntry;

/// Tracks one before-image chain per transaction that has written
/// anything. Read-only transactions never appear here.
pub struct UndoManager {
    chains: Mutex<HashMap<TrxId, Vec<UndoEntry>>>,
}

impl UndoManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chains: Mutex::new(HashMap::new()),
        })
    }

    /// Record a before-image for `trx_id`, appended to the tail of its
    /// chain so [`Self::rollback`] replays most-recent-first.
    pub fn append(&self, trx_id: TrxId, entry: UndoEntry) {
        self.chains.lock().entry(trx_id).or_default().push(entry);
    }

    /// Replay `trx_id`'s chain in reverse order, handing each entry to
    /// `restore` to reinstate via the page layer, then drop the chain. A
    /// transaction with no chain (read-only, or nothing written yet) is a
    /// no-op.
    pub fn rollback(
        &self,
        trx_id: TrxId,
        mut restore: impl FnMut(&UndoEntry) -> Result<()>,
    ) -> Result<()> {
        let chain = self.chains.lock().remove(&trx_id).unwrap_or_default();
        for entry in chain.iter().rev() {
            restore(entry)?;
        }
        Ok(())
    }

    /// Drop `trx_id`'s chain without replaying it, once its redo is
    /// durable and rollback is no longer possible.
    pub fn cleanup(&self, trx_id: TrxId) {
        self.chains.lock().remove(&trx_id);
    }

    pub fn chain_len(&self, trx_id: TrxId) -> usize {
        self.chains.lock().get(&trx_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SpaceId;
    use crate::common::PageId;

    fn entry(before: u8) -> UndoEntry {
        UndoEntry {
            page_id: PageId::new(SpaceId::new(0), 1),
            offset: 0,
            before: vec![before],
        }
    }

    #[test]
    fn rollback_replays_in_reverse_order() {
        let manager = UndoManager::new();
        manager.append(TrxId(1), entry(1));
        manager.append(TrxId(1), entry(2));
        manager.append(TrxId(1), entry(3));

        let mut replayed = Vec::new();
        manager
            .rollback(TrxId(1), |e| {
                replayed.push(e.before[0]);
                Ok(())
            })
            .unwrap();
        assert_eq!(replayed, vec![3, 2, 1]);
        assert_eq!(manager.chain_len(TrxId(1)), 0);
    }

    #[test]
    fn rollback_of_untouched_transaction_is_a_no_op() {
        let manager = UndoManager::new();
        let mut calls = 0;
        manager.rollback(TrxId(9), |_| {
            calls += 1;
            Ok(())
        }).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn cleanup_drops_the_chain_without_replay() {
        let manager = UndoManager::new();
        manager.append(TrxId(1), entry(1));
        manager.cleanup(TrxId(1));
        assert_eq!(manager.chain_len(TrxId(1)), 0);
    }
}
