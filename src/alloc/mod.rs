//! Space/segment/extent allocator: carves tablespaces into 64-page
//! extents and groups extents into segments, one per B+tree index half.

pub mod allocator;
pub mod extent;
pub mod segment;

pub use allocator::SpaceAllocator;
pub use extent::ExtentBitmap;
pub use segment::{Segment, SegmentKind, SegmentStats};
