//! Space/segment/extent allocator — the `SpaceAllocator` facade described
//! in the storage core spec's §4.B, sitting directly on top of
//! [`crate::storage::tablespace::TablespaceRegistry`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::ids::{ExtentId, PageId, SegmentId, SpaceId};
use crate::error::{Error, Result};
use crate::storage::tablespace::{ExtentPurpose, TablespaceRegistry};

use super::segment::{Segment, SegmentKind, SegmentStats};

/// Allocates extents and segments across all open tablespaces.
///
/// Holds one lock over the segment table; extent-level bookkeeping
/// (page bitmaps within an extent) lives inside each `Segment` and is
/// reached only while that lock is held, mirroring the teacher's
/// single-mutex `BufferPoolManager` rather than per-segment locks — segment
/// operations are expected to be short.
pub struct SpaceAllocator {
    tablespaces: Arc<TablespaceRegistry>,
    segments: Mutex<HashMap<SegmentId, Segment>>,
    next_segment_id: AtomicU64,
}

impl SpaceAllocator {
    pub fn new(tablespaces: Arc<TablespaceRegistry>) -> Self {
        Self {
            tablespaces,
            segments: Mutex::new(HashMap::new()),
            next_segment_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh 64-page extent directly from a tablespace, with no
    /// segment ownership attached yet.
    pub fn allocate_extent(&self, space: SpaceId, purpose: ExtentPurpose) -> Result<ExtentId> {
        self.tablespaces
            .with_space(space, |ts| ts.allocate_extent(purpose))
    }

    /// Return a bare extent to its tablespace's free list.
    pub fn free_extent(&self, space: SpaceId, extent_id: ExtentId) -> Result<()> {
        self.tablespaces
            .with_space(space, |ts| ts.free_extent(extent_id))
    }

    /// Create a new, initially extent-less segment.
    pub fn create_segment(&self, space: SpaceId, kind: SegmentKind) -> SegmentId {
        let id = SegmentId(self.next_segment_id.fetch_add(1, Ordering::Relaxed));
        let segment = Segment::new(id, space, kind);
        self.segments.lock().insert(id, segment);
        id
    }

    /// Allocate one page for `segment_id`, acquiring a new extent from the
    /// owning space first if the segment's current extent is full.
    pub fn allocate_page(&self, segment_id: SegmentId) -> Result<PageId> {
        let mut segments = self.segments.lock();
        let segment = segments
            .get_mut(&segment_id)
            .ok_or_else(|| Error::NotFound(format!("segment {:?}", segment_id)))?;

        if let Some((extent_id, slot)) = segment.try_allocate_in_place() {
            return Ok(page_id_for(segment.space(), extent_id, slot));
        }

        let purpose = match segment.kind() {
            SegmentKind::Leaf | SegmentKind::NonLeaf => ExtentPurpose::Index,
            SegmentKind::System => ExtentPurpose::System,
        };
        let space = segment.space();
        let extent_id = self
            .tablespaces
            .with_space(space, |ts| ts.allocate_extent(purpose))?;
        segment.adopt_extent(extent_id);
        let (extent_id, slot) = segment
            .try_allocate_in_place()
            .expect("freshly adopted extent has free slots");
        Ok(page_id_for(space, extent_id, slot))
    }

    /// Release one page back to its segment. If this empties the owning
    /// extent and the segment is not temporary, the extent is returned to
    /// the space's free list.
    pub fn free_page(&self, segment_id: SegmentId, page: PageId) -> Result<()> {
        let mut segments = self.segments.lock();
        let segment = segments
            .get_mut(&segment_id)
            .ok_or_else(|| Error::NotFound(format!("segment {:?}", segment_id)))?;

        let (extent_id, slot) = extent_and_slot_for(page);
        let now_empty = segment
            .free_page(extent_id, slot)
            .ok_or_else(|| Error::NotFound(format!("extent {:?} on segment {:?}", extent_id, segment_id)))?;

        if now_empty && !segment.is_temporary() {
            let space = segment.space();
            segment.forget_extent(extent_id);
            self.tablespaces
                .with_space(space, |ts| ts.free_extent(extent_id))?;
        }
        Ok(())
    }

    /// Tear down a segment, returning every extent it still owns to the
    /// space's free list.
    pub fn drop_segment(&self, segment_id: SegmentId) -> Result<()> {
        let mut segments = self.segments.lock();
        let segment = segments
            .remove(&segment_id)
            .ok_or_else(|| Error::NotFound(format!("segment {:?}", segment_id)))?;
        let space = segment.space();
        for extent_id in segment.extent_ids() {
            self.tablespaces
                .with_space(space, |ts| ts.free_extent(extent_id))?;
        }
        Ok(())
    }

    pub fn segment_stats(&self, segment_id: SegmentId) -> Result<SegmentStats> {
        let segments = self.segments.lock();
        segments
            .get(&segment_id)
            .map(|s| s.stats())
            .ok_or_else(|| Error::NotFound(format!("segment {:?}", segment_id)))
    }
}

fn page_id_for(space: SpaceId, extent_id: ExtentId, slot: u32) -> PageId {
    PageId::new(space, extent_id.first_page(crate::common::config::PAGES_PER_EXTENT) + slot)
}

fn extent_and_slot_for(page: PageId) -> (ExtentId, u32) {
    let pages_per_extent = crate::common::config::PAGES_PER_EXTENT;
    let extent_id = ExtentId::new(page.page_no / pages_per_extent);
    let slot = page.page_no % pages_per_extent;
    (extent_id, slot)
}
