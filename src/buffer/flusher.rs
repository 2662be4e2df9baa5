//! Background dirty-page flusher and pool-size maintenance task.
//!
//! Construction only allocates; call [`BackgroundFlusher::start`]
//! separately to spawn the thread, and [`BackgroundFlusher::stop`] to shut
//! it down in an orderly way through a stop channel — the same
//! construct-then-start split the storage core uses for every background
//! task (redo group flusher, deadlock detector, transaction sweeper).

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, warn};

use super::buffer_pool_manager::BufferPoolManager;

const DIRTY_RATIO_THRESHOLD: f64 = 0.25;
const FLUSH_BATCH_SIZE: usize = 100;
const EVICT_BATCH_SIZE: usize = 10;

/// Runs on a timer: flushes a bounded batch of dirty pages when the
/// dirty/resident ratio crosses 25%, then evicts a bounded batch to keep
/// the pool within its size cap.
pub struct BackgroundFlusher {
    bpm: Arc<BufferPoolManager>,
    interval: Duration,
    pool_capacity: usize,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundFlusher {
    pub fn new(bpm: Arc<BufferPoolManager>, interval: Duration) -> Self {
        let pool_capacity = bpm.pool_size();
        Self {
            bpm,
            interval,
            pool_capacity,
            stop_tx: None,
            handle: None,
        }
    }

    /// Spawn the background thread. A no-op if already started.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let bpm = Arc::clone(&self.bpm);
        let interval = self.interval;
        let pool_capacity = self.pool_capacity;

        let handle = thread::Builder::new()
            .name("innocore-buffer-flusher".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) => return,
                    Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }

                let resident = bpm.page_count().max(1);
                let dirty = bpm.dirty_page_count();
                if dirty as f64 / resident as f64 > DIRTY_RATIO_THRESHOLD {
                    if let Err(e) = bpm.flush_dirty_batch(FLUSH_BATCH_SIZE) {
                        error!("background flush batch failed: {e}");
                    }
                }

                if bpm.page_count() > pool_capacity {
                    if let Err(e) = bpm.evict_batch(EVICT_BATCH_SIZE) {
                        warn!("background eviction batch failed: {e}");
                    }
                }
            })
            .expect("failed to spawn buffer flusher thread");

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
    }

    /// Signal the thread to stop and wait for it to exit.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundFlusher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tablespace::{ExtentPurpose, TablespaceRegistry};
    use tempfile::tempdir;

    #[test]
    fn start_then_stop_does_not_hang() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
        let space = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Data))
            .unwrap();
        let bpm = Arc::new(BufferPoolManager::new(
            4,
            registry,
            75,
            Duration::from_millis(1000),
        ));

        let mut flusher = BackgroundFlusher::new(Arc::clone(&bpm), Duration::from_millis(10));
        flusher.start();
        std::thread::sleep(Duration::from_millis(30));
        flusher.stop();
    }
}
