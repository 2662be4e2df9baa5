//! Transaction lifecycle: begin/commit/rollback orchestration plus an idle
//! sweeper thread, in the same constructor/`start`/`stop` shape as
//! [`crate::buffer::BackgroundFlusher`] and [`crate::redo::RedoManager`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::common::ids::TrxId;
use crate::error::{Error, Result};
use crate::lock::LockManager;
use crate::undo::UndoManager;

use super::read_view::ReadView;
use super::transaction::{IsolationLevel, Transaction, TrxState};

/// Owns the active-transaction table and coordinates the lock and undo
/// managers around commit/rollback. Read views and redo durability are the
/// caller's (the storage engine facade's) concern for the actual I/O; this
/// manager tracks state and orchestrates the undo/lock side effects spec
/// §4.I describes.
pub struct TransactionManager {
    next_trx_id: AtomicU64,
    active: Mutex<HashMap<TrxId, Transaction>>,
    lock_manager: Arc<LockManager>,
    undo_manager: Arc<UndoManager>,
    idle_timeout: Duration,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionManager {
    pub fn new(
        lock_manager: Arc<LockManager>,
        undo_manager: Arc<UndoManager>,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            next_trx_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
            lock_manager,
            undo_manager,
            idle_timeout,
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    /// Allocate a trx_id, optionally capture a read view (RC and above
    /// per spec §4.I), and register it as active.
    pub fn begin(&self, read_only: bool, isolation: IsolationLevel) -> TrxId {
        let trx_id = TrxId(self.next_trx_id.fetch_add(1, Ordering::SeqCst));
        let mut active = self.active.lock();
        let read_view = if isolation != IsolationLevel::ReadUncommitted {
            Some(capture_view(&active, TrxId(self.next_trx_id.load(Ordering::SeqCst)), trx_id))
        } else {
            None
        };
        active.insert(
            trx_id,
            Transaction {
                trx_id,
                isolation,
                read_only,
                state: TrxState::Active,
                read_view,
                last_active: Instant::now(),
            },
        );
        trx_id
    }

    /// Re-capture a statement-level read view for a read-committed
    /// transaction, so each statement sees the latest committed state.
    pub fn refresh_statement_read_view(&self, trx_id: TrxId) -> Result<()> {
        let mut active = self.active.lock();
        let next = TrxId(self.next_trx_id.load(Ordering::SeqCst));
        let trx = active.get(&trx_id).ok_or(Error::TxInvalidState(trx_id))?;
        if trx.isolation != IsolationLevel::ReadCommitted {
            return Ok(());
        }
        let view = capture_view(&active, next, trx_id);
        active.get_mut(&trx_id).unwrap().read_view = Some(view);
        Ok(())
    }

    pub fn touch(&self, trx_id: TrxId) -> Result<()> {
        let mut active = self.active.lock();
        let trx = active.get_mut(&trx_id).ok_or(Error::TxInvalidState(trx_id))?;
        trx.last_active = Instant::now();
        Ok(())
    }

    pub fn isolation_of(&self, trx_id: TrxId) -> Result<IsolationLevel> {
        let active = self.active.lock();
        Ok(active.get(&trx_id).ok_or(Error::TxInvalidState(trx_id))?.isolation)
    }

    pub fn read_view_of(&self, trx_id: TrxId) -> Result<Option<ReadView>> {
        let active = self.active.lock();
        Ok(active
            .get(&trx_id)
            .ok_or(Error::TxInvalidState(trx_id))?
            .read_view
            .clone())
    }

    /// Commit: `trx` must be ACTIVE. The caller is responsible for having
    /// flushed redo through the transaction's final LSN before calling
    /// this (the facade layer owns the redo manager); this just marks the
    /// state, frees the undo chain, and unregisters.
    pub fn commit(&self, trx_id: TrxId) -> Result<()> {
        {
            let mut active = self.active.lock();
            let trx = active.get_mut(&trx_id).ok_or(Error::TxInvalidState(trx_id))?;
            if trx.state != TrxState::Active {
                return Err(Error::TxInvalidState(trx_id));
            }
            trx.state = TrxState::Committed;
        }
        self.undo_manager.cleanup(trx_id);
        self.lock_manager.release(trx_id);
        self.active.lock().remove(&trx_id);
        Ok(())
    }

    /// Rollback: replay `trx`'s undo chain via `restore`, mark
    /// ROLLED_BACK, release locks, unregister.
    pub fn rollback(
        &self,
        trx_id: TrxId,
        restore: impl FnMut(&crate::undo::UndoEntry) -> Result<()>,
    ) -> Result<()> {
        {
            let mut active = self.active.lock();
            let trx = active.get_mut(&trx_id).ok_or(Error::TxInvalidState(trx_id))?;
            if trx.state != TrxState::Active {
                return Err(Error::TxInvalidState(trx_id));
            }
            trx.state = TrxState::RolledBack;
        }
        self.undo_manager.rollback(trx_id, restore)?;
        self.lock_manager.release(trx_id);
        self.active.lock().remove(&trx_id);
        Ok(())
    }

    pub fn active_trx_ids(&self) -> Vec<TrxId> {
        self.active.lock().keys().copied().collect()
    }

    /// Roll back every transaction whose idle time exceeds the configured
    /// timeout. Called by the background sweeper; exposed directly for
    /// tests that don't want to wait on the real thread.
    pub fn sweep_idle(&self) -> Vec<TrxId> {
        let overdue: Vec<TrxId> = {
            let active = self.active.lock();
            active
                .values()
                .filter(|t| t.last_active.elapsed() >= self.idle_timeout)
                .map(|t| t.trx_id)
                .collect()
        };
        for trx_id in &overdue {
            let _ = self.rollback(*trx_id, |_| Ok(()));
        }
        overdue
    }

    pub fn start(self: &Arc<Self>, interval: Duration) {
        let (tx, rx): (Sender<()>, Receiver<()>) = std::sync::mpsc::channel();
        *self.stop_tx.lock() = Some(tx);
        let manager = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("innocore-trx-sweeper".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(()) => return,
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                        manager.sweep_idle();
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("failed to spawn transaction sweeper thread");
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_view(active: &HashMap<TrxId, Transaction>, next_trx_id: TrxId, creator: TrxId) -> ReadView {
    let mut ids: Vec<TrxId> = active.keys().copied().collect();
    ids.push(creator);
    ReadView::capture(&ids, next_trx_id, creator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Arc<TransactionManager> {
        let lock_manager = LockManager::new();
        let undo_manager = UndoManager::new();
        TransactionManager::new(lock_manager, undo_manager, Duration::from_secs(600))
    }

    #[test]
    fn begin_allocates_monotonic_ids_and_registers_as_active() {
        let mgr = fixture();
        let t1 = mgr.begin(false, IsolationLevel::RepeatableRead);
        let t2 = mgr.begin(false, IsolationLevel::RepeatableRead);
        assert!(t2.0 > t1.0);
        assert_eq!(mgr.active_trx_ids().len(), 2);
    }

    #[test]
    fn read_uncommitted_never_captures_a_read_view() {
        let mgr = fixture();
        let t1 = mgr.begin(false, IsolationLevel::ReadUncommitted);
        assert!(mgr.read_view_of(t1).unwrap().is_none());
    }

    #[test]
    fn repeatable_read_captures_a_view_that_excludes_concurrent_actives() {
        let mgr = fixture();
        let t1 = mgr.begin(false, IsolationLevel::RepeatableRead);
        let t2 = mgr.begin(false, IsolationLevel::RepeatableRead);
        let view = mgr.read_view_of(t1).unwrap().unwrap();
        assert!(!view.is_visible(t2));
    }

    #[test]
    fn commit_unregisters_and_frees_undo_chain() {
        let mgr = fixture();
        let t1 = mgr.begin(false, IsolationLevel::RepeatableRead);
        mgr.commit(t1).unwrap();
        assert!(mgr.active_trx_ids().is_empty());
        assert!(mgr.commit(t1).is_err());
    }

    #[test]
    fn rollback_replays_undo_and_unregisters() {
        let mgr = fixture();
        let t1 = mgr.begin(false, IsolationLevel::RepeatableRead);
        mgr.undo_manager.append(
            t1,
            crate::undo::UndoEntry {
                page_id: crate::common::PageId::new(crate::common::ids::SpaceId::new(0), 1),
                offset: 0,
                before: vec![9],
            },
        );
        let mut replayed = Vec::new();
        mgr.rollback(t1, |e| {
            replayed.push(e.before[0]);
            Ok(())
        })
        .unwrap();
        assert_eq!(replayed, vec![9]);
        assert!(mgr.active_trx_ids().is_empty());
    }

    #[test]
    fn sweep_idle_rolls_back_transactions_past_the_timeout() {
        let lock_manager = LockManager::new();
        let undo_manager = UndoManager::new();
        let mgr = TransactionManager::new(lock_manager, undo_manager, Duration::from_millis(1));
        let t1 = mgr.begin(false, IsolationLevel::RepeatableRead);
        std::thread::sleep(Duration::from_millis(5));
        let swept = mgr.sweep_idle();
        assert_eq!(swept, vec![t1]);
        assert!(mgr.active_trx_ids().is_empty());
    }
}
