//! Lock table with FIFO-fair granting and periodic deadlock detection.
//!
//! One global table behind a `parking_lot::Mutex` + `Condvar`, in the same
//! spirit as the buffer pool's single-mutex `BufferPoolManager`: resource
//! counts here are expected to be small enough that one lock is not a
//! bottleneck, and it keeps the wait-for graph trivial to build. The
//! detector runs as a background thread using the same
//! constructor-then-`start()`/`stop()` shape as
//! [`crate::buffer::BackgroundFlusher`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::common::ids::TrxId;
use crate::error::{Error, Result};

use super::types::{Holder, LockMode, ResourceId, ResourceState, WaitRequest};

struct LockTable {
    resources: HashMap<ResourceId, ResourceState>,
    held_by_trx: HashMap<TrxId, HashSet<ResourceId>>,
}

impl LockTable {
    fn new() -> Self {
        Self {
            resources: HashMap::new(),
            held_by_trx: HashMap::new(),
        }
    }
}

pub struct LockManager {
    table: Mutex<LockTable>,
    cv: Condvar,
    aborted: Mutex<HashSet<TrxId>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(LockTable::new()),
            cv: Condvar::new(),
            aborted: Mutex::new(HashSet::new()),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    /// Acquire `mode` on `resource` for `trx_id`, blocking (up to
    /// `timeout`) if it conflicts with a current holder. Returns
    /// `Error::DeadlockAborted` if the background detector picks this
    /// transaction as a cycle's victim while it waits, or
    /// `Error::LockTimeout` if `timeout` elapses first.
    pub fn acquire(
        &self,
        trx_id: TrxId,
        resource: ResourceId,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();
        loop {
            if try_grant(&mut table, trx_id, resource, mode) {
                return Ok(());
            }
            if self.aborted.lock().remove(&trx_id) {
                dequeue_waiter(&mut table, resource, trx_id);
                return Err(Error::DeadlockAborted(trx_id));
            }
            let now = Instant::now();
            if now >= deadline {
                dequeue_waiter(&mut table, resource, trx_id);
                return Err(Error::LockTimeout);
            }
            let slice = (deadline - now).min(Duration::from_millis(50));
            self.cv.wait_for(&mut table, slice);
        }
    }

    /// Release every resource `trx_id` holds, granting the next compatible
    /// waiters (FIFO, filtered by compatibility) on each.
    pub fn release(&self, trx_id: TrxId) {
        let mut table = self.table.lock();
        let resources = table.held_by_trx.remove(&trx_id).unwrap_or_default();
        for resource in resources {
            if let Some(state) = table.resources.get_mut(&resource) {
                state.holders.retain(|h| h.trx_id != trx_id);
                grant_waiters(state);
            }
        }
        drop(table);
        self.cv.notify_all();
    }

    /// DFS cycle detection over the wait-for graph (waiter -> holder
    /// edges). On finding a cycle, marks the earliest-enqueued transaction
    /// in it as the victim and wakes every waiter so it can notice.
    pub fn detect_and_break_deadlocks(&self) {
        let victim = {
            let table = self.table.lock();
            find_deadlock_victim(&table)
        };
        if let Some(trx_id) = victim {
            self.aborted.lock().insert(trx_id);
            self.cv.notify_all();
        }
    }

    /// Spawn the background detector, ticking every `interval` (spec: 1s).
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let (tx, rx): (Sender<()>, Receiver<()>) = std::sync::mpsc::channel();
        *self.stop_tx.lock() = Some(tx);
        let manager = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("innocore-deadlock-detector".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(()) => return,
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                        manager.detect_and_break_deadlocks();
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("failed to spawn deadlock detector thread");
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

impl Drop for LockManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Try to grant `trx_id`'s request immediately; if it can't be granted yet,
/// make sure it is queued and return `false`.
fn try_grant(table: &mut LockTable, trx_id: TrxId, resource: ResourceId, mode: LockMode) -> bool {
    let state = table.resources.entry(resource).or_default();

    if let Some(holder) = state.holders.iter_mut().find(|h| h.trx_id == trx_id) {
        if holder.mode == LockMode::Exclusive || holder.mode == mode {
            return true;
        }
        // Shared -> Exclusive upgrade: allowed iff no other transaction
        // holds a conflicting Shared lock.
        let conflict = state
            .holders
            .iter()
            .any(|h| h.trx_id != trx_id && h.mode == LockMode::Shared);
        if !conflict {
            holder.mode = LockMode::Exclusive;
            return true;
        }
        enqueue_waiter(state, trx_id, mode);
        return false;
    }

    let compatible = state.holders.iter().all(|h| h.mode.compatible_with(mode));
    let is_next = state
        .waiters
        .front()
        .map_or(true, |w| w.trx_id == trx_id);
    if compatible && is_next {
        state.waiters.retain(|w| w.trx_id != trx_id);
        state.holders.push(Holder { trx_id, mode });
        table.held_by_trx.entry(trx_id).or_default().insert(resource);
        return true;
    }

    enqueue_waiter(state, trx_id, mode);
    false
}

fn enqueue_waiter(state: &mut ResourceState, trx_id: TrxId, mode: LockMode) {
    if !state.waiters.iter().any(|w| w.trx_id == trx_id) {
        state.waiters.push_back(WaitRequest {
            trx_id,
            mode,
            enqueued_at: Instant::now(),
        });
    }
}

fn dequeue_waiter(table: &mut LockTable, resource: ResourceId, trx_id: TrxId) {
    if let Some(state) = table.resources.get_mut(&resource) {
        state.waiters.retain(|w| w.trx_id != trx_id);
    }
}

/// Grant as many front-of-queue waiters as are mutually compatible and
/// compatible with whatever is already granted this round.
fn grant_waiters(state: &mut ResourceState) {
    let mut granted_mode: Option<LockMode> = None;
    let mut remaining = VecDeque::new();
    while let Some(waiter) = state.waiters.pop_front() {
        let ok_with_holders = state.holders.iter().all(|h| h.mode.compatible_with(waiter.mode));
        let ok_with_round = granted_mode.map_or(true, |m| m.compatible_with(waiter.mode));
        if ok_with_holders && ok_with_round {
            granted_mode = Some(waiter.mode);
            state.holders.push(Holder {
                trx_id: waiter.trx_id,
                mode: waiter.mode,
            });
        } else {
            remaining.push_back(waiter);
            break;
        }
    }
    remaining.extend(state.waiters.drain(..));
    state.waiters = remaining;
}

fn find_deadlock_victim(table: &LockTable) -> Option<TrxId> {
    let mut edges: HashMap<TrxId, Vec<TrxId>> = HashMap::new();
    let mut enqueued_at: HashMap<TrxId, Instant> = HashMap::new();
    for state in table.resources.values() {
        for waiter in &state.waiters {
            enqueued_at
                .entry(waiter.trx_id)
                .and_modify(|t| *t = (*t).min(waiter.enqueued_at))
                .or_insert(waiter.enqueued_at);
            for holder in &state.holders {
                if holder.trx_id != waiter.trx_id && !holder.mode.compatible_with(waiter.mode) {
                    edges.entry(waiter.trx_id).or_default().push(holder.trx_id);
                }
            }
        }
    }

    for &start in edges.keys() {
        let mut stack = vec![start];
        let mut visiting = HashSet::new();
        let mut path = Vec::new();
        if let Some(cycle) = dfs_find_cycle(start, &edges, &mut visiting, &mut path, &mut stack) {
            return cycle
                .into_iter()
                .min_by_key(|trx_id| enqueued_at.get(trx_id).copied().unwrap_or_else(Instant::now));
        }
    }
    None
}

fn dfs_find_cycle(
    node: TrxId,
    edges: &HashMap<TrxId, Vec<TrxId>>,
    visiting: &mut HashSet<TrxId>,
    path: &mut Vec<TrxId>,
    _scratch: &mut Vec<TrxId>,
) -> Option<Vec<TrxId>> {
    if let Some(pos) = path.iter().position(|&n| n == node) {
        return Some(path[pos..].to_vec());
    }
    if visiting.contains(&node) {
        return None;
    }
    visiting.insert(node);
    path.push(node);
    if let Some(neighbors) = edges.get(&node) {
        for &next in neighbors {
            if let Some(cycle) = dfs_find_cycle(next, edges, visiting, path, _scratch) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_are_compatible() {
        let lm = LockManager::new();
        let r = ResourceId(1);
        lm.acquire(TrxId(1), r, LockMode::Shared, Duration::from_millis(100))
            .unwrap();
        lm.acquire(TrxId(2), r, LockMode::Shared, Duration::from_millis(100))
            .unwrap();
    }

    #[test]
    fn exclusive_blocks_until_released() {
        let lm = LockManager::new();
        let r = ResourceId(1);
        lm.acquire(TrxId(1), r, LockMode::Exclusive, Duration::from_millis(100))
            .unwrap();
        let err = lm
            .acquire(TrxId(2), r, LockMode::Exclusive, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout));
        lm.release(TrxId(1));
        lm.acquire(TrxId(2), r, LockMode::Exclusive, Duration::from_millis(100))
            .unwrap();
    }

    #[test]
    fn upgrade_succeeds_with_no_other_shared_holder() {
        let lm = LockManager::new();
        let r = ResourceId(1);
        lm.acquire(TrxId(1), r, LockMode::Shared, Duration::from_millis(100))
            .unwrap();
        lm.acquire(TrxId(1), r, LockMode::Exclusive, Duration::from_millis(100))
            .unwrap();
    }

    #[test]
    fn two_cycle_deadlock_is_detected_and_a_victim_aborted() {
        let lm = LockManager::new();
        let a = ResourceId(1);
        let b = ResourceId(2);
        lm.acquire(TrxId(1), a, LockMode::Exclusive, Duration::from_secs(5))
            .unwrap();
        lm.acquire(TrxId(2), b, LockMode::Exclusive, Duration::from_secs(5))
            .unwrap();

        let lm2 = Arc::clone(&lm);
        let t1 = std::thread::spawn(move || {
            lm2.acquire(TrxId(1), b, LockMode::Exclusive, Duration::from_secs(5))
        });
        // Make sure trx 1 is enqueued as a waiter on b before trx 2 waits on a.
        std::thread::sleep(Duration::from_millis(20));
        let t2_result = lm.acquire(TrxId(2), a, LockMode::Exclusive, Duration::from_secs(5));

        std::thread::sleep(Duration::from_millis(10));
        lm.detect_and_break_deadlocks();

        let t1_result = t1.join().unwrap();
        let results = [t1_result, t2_result];
        assert!(results.iter().any(|r| matches!(r, Err(Error::DeadlockAborted(_)))));
    }
}
