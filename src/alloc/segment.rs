//! Segments: the set of extents owned by one logical object (the leaf or
//! non-leaf half of a B+tree index, or a system object such as undo).

use crate::common::ids::{ExtentId, SegmentId, SpaceId};

use super::extent::ExtentBitmap;

/// What kind of B+tree half (or system object) a segment backs. Kept as a
/// closed tag rather than a trait: segments do not behave differently by
/// kind, only their owner's accounting does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Leaf,
    NonLeaf,
    System,
}

/// Point-in-time accounting for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStats {
    pub extent_count: u32,
    pub page_count: u32,
    pub free_space_bytes: u64,
    /// Fraction of allocated pages that are *not* in use, in `[0.0, 1.0]`.
    pub fragmentation_ratio: f64,
}

struct OwnedExtent {
    id: ExtentId,
    bitmap: ExtentBitmap,
}

/// A segment owns zero or more extents, allocating pages from the current
/// (last, non-full) extent before asking the space for a new one.
pub struct Segment {
    id: SegmentId,
    space: SpaceId,
    kind: SegmentKind,
    extents: Vec<OwnedExtent>,
    /// Index into `extents` of the extent new page allocations are tried
    /// against first.
    last_extent: Option<usize>,
}

impl Segment {
    pub fn new(id: SegmentId, space: SpaceId, kind: SegmentKind) -> Self {
        Self {
            id,
            space,
            kind,
            extents: Vec::new(),
            last_extent: None,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn is_temporary(&self) -> bool {
        false
    }

    pub fn extent_ids(&self) -> Vec<ExtentId> {
        self.extents.iter().map(|e| e.id).collect()
    }

    /// Record a freshly allocated extent as belonging to this segment and
    /// make it the allocation target.
    pub fn adopt_extent(&mut self, extent_id: ExtentId) {
        self.extents.push(OwnedExtent {
            id: extent_id,
            bitmap: ExtentBitmap::empty(),
        });
        self.last_extent = Some(self.extents.len() - 1);
    }

    /// Try to claim a free page slot from the current last extent.
    /// Returns `(extent_id, slot)` on success; `None` means the segment
    /// needs a new extent before it can allocate further.
    pub fn try_allocate_in_place(&mut self) -> Option<(ExtentId, u32)> {
        let idx = self.last_extent?;
        let entry = &mut self.extents[idx];
        let slot = entry.bitmap.allocate()?;
        Some((entry.id, slot))
    }

    /// Release a page slot. Returns the owning extent's id and whether it
    /// is now fully empty (a candidate for returning to the space's free
    /// list).
    pub fn free_page(&mut self, extent_id: ExtentId, slot: u32) -> Option<bool> {
        let entry = self.extents.iter_mut().find(|e| e.id == extent_id)?;
        entry.bitmap.free(slot);
        Some(entry.bitmap.is_empty())
    }

    /// Drop an emptied extent from this segment's bookkeeping (it has
    /// already been returned to the space's free list by the caller).
    pub fn forget_extent(&mut self, extent_id: ExtentId) {
        self.extents.retain(|e| e.id != extent_id);
        self.last_extent = if self.extents.is_empty() {
            None
        } else {
            Some(self.extents.len() - 1)
        };
    }

    pub fn stats(&self) -> SegmentStats {
        let extent_count = self.extents.len() as u32;
        let allocated_pages: u32 = self
            .extents
            .iter()
            .map(|_| crate::common::config::PAGES_PER_EXTENT)
            .sum();
        let used_pages: u32 = self.extents.iter().map(|e| e.bitmap.used_count()).sum();
        let free_pages = allocated_pages.saturating_sub(used_pages);
        let fragmentation_ratio = if allocated_pages == 0 {
            0.0
        } else {
            free_pages as f64 / allocated_pages as f64
        };
        SegmentStats {
            extent_count,
            page_count: used_pages,
            free_space_bytes: free_pages as u64 * crate::common::config::PAGE_SIZE as u64,
            fragmentation_ratio,
        }
    }
}
