//! RAII guards for page access: [`PageReadGuard`] (shared) and
//! [`PageWriteGuard`] (exclusive, auto-marks dirty). Both auto-unpin their
//! frame on drop.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::header::FileHeader;
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: RwLockReadGuard<'a, Page>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page_internal(self.frame_id, false, 0);
    }
}

pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: RwLockWriteGuard<'a, Page>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        // Peek the LSN the write just stamped into the header bytes
        // (spec-fixed offset) while `self.lock` is still held -- it
        // releases only after this body returns.
        let lsn = FileHeader::peek_lsn(self.lock.as_slice());
        self.bpm.unpin_page_internal(self.frame_id, true, lsn);
    }
}
