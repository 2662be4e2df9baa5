//! Optional asynchronous prefetch workers.
//!
//! `prefetch(space, page)` enqueues a load request; one worker thread
//! drains the queue and warms the cache by fetching and immediately
//! releasing each page, so a later synchronous reader finds it resident.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::common::PageId;

use super::buffer_pool_manager::BufferPoolManager;

enum Request {
    Load(PageId),
    Stop,
}

/// A bounded queue of prefetch requests drained by a single background
/// worker. Construction only allocates the channel; [`Self::start`]
/// spawns the worker.
pub struct PrefetchWorker {
    bpm: Arc<BufferPoolManager>,
    tx: Sender<Request>,
    rx: Option<Receiver<Request>>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchWorker {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            bpm,
            tx,
            rx: Some(rx),
            handle: None,
        }
    }

    /// Enqueue an asynchronous load request. Never blocks on I/O.
    pub fn prefetch(&self, page_id: PageId) {
        let _ = self.tx.send(Request::Load(page_id));
    }

    pub fn start(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let bpm = Arc::clone(&self.bpm);
        let handle = thread::Builder::new()
            .name("innocore-prefetch".into())
            .spawn(move || {
                for request in rx {
                    match request {
                        Request::Stop => return,
                        Request::Load(page_id) => {
                            // Fetching and immediately dropping the guard
                            // warms the cache without holding a pin.
                            match bpm.fetch_page_read(page_id) {
                                Ok(_guard) => {}
                                Err(e) => debug!("prefetch of {page_id} failed: {e}"),
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn prefetch worker thread");
        self.handle = Some(handle);
    }

    pub fn stop(&mut self) {
        let _ = self.tx.send(Request::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PrefetchWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
