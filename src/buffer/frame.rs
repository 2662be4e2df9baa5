//! Frame — a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the metadata needed for buffer
//! management: which page is loaded, its pin count, and its dirty flag.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A frame in the buffer pool. The pool allocates a fixed `Vec<Frame>` at
/// startup; each frame can hold exactly one page at a time.
///
/// All fields use interior mutability: `page` behind an `RwLock` for
/// concurrent readers, `page_id` behind a `Mutex`, and `pin_count`/
/// `is_dirty` as lock-free atomics.
pub struct Frame {
    page: RwLock<Page>,
    page_id: Mutex<Option<PageId>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    last_modified_lsn: AtomicU64,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            last_modified_lsn: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    /// Increment the pin count. Returns the new value.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count. Returns the new value.
    ///
    /// # Panics
    /// Panics if pin count is already 0.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    /// LSN of the most recent write this frame's page hasn't yet had
    /// flushed to its tablespace. Watermarks how far the redo log must be
    /// durable before `flush_frame` may write the page out.
    #[inline]
    pub fn last_modified_lsn(&self) -> u64 {
        self.last_modified_lsn.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_last_modified_lsn(&self, lsn: u64) {
        self.last_modified_lsn.store(lsn, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id().is_none()
    }

    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.page_id().is_some() && !self.is_pinned()
    }

    /// Reset the frame to empty state. Called after eviction/deletion to
    /// prepare it for reuse.
    pub fn reset(&self) {
        self.page_mut().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Relaxed);
        self.is_dirty.store(false, Ordering::Relaxed);
        self.last_modified_lsn.store(0, Ordering::Relaxed);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
