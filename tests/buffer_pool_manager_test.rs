//! Buffer pool manager tests exercising the public surface end to end:
//! page guards, pinning, eviction under pressure, and concurrent access.

use innocore::alloc::SpaceAllocator;
use innocore::buffer::BufferPoolManager;
use innocore::common::{PageId, SpaceId};
use innocore::storage::tablespace::{ExtentPurpose, TablespaceRegistry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn setup(pool_size: usize) -> (BufferPoolManager, SpaceAllocator, SpaceId, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
    let space = registry.create_tablespace("t1").unwrap();
    registry
        .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Data))
        .unwrap();
    let allocator = SpaceAllocator::new(Arc::clone(&registry));
    let bpm = BufferPoolManager::new(pool_size, registry, 75, Duration::from_millis(1000));
    (bpm, allocator, space, dir)
}

fn copy_string(data: &mut [u8], s: &str) {
    data[..s.len()].copy_from_slice(s.as_bytes());
    data[s.len()] = 0;
}

fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

#[test]
fn write_then_read_back_through_fresh_guards() {
    let (bpm, allocator, space, _dir) = setup(10);
    let seg = allocator.create_segment(space, innocore::alloc::SegmentKind::Leaf);
    let pid = allocator.allocate_page(seg).unwrap();

    {
        let mut guard = bpm.new_page(pid).unwrap();
        copy_string(guard.as_mut_slice(), "Hello, world!");
    }
    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), "Hello, world!");
    }
    // A second independent read guard should see the same data.
    let guard = bpm.fetch_page_read(pid).unwrap();
    assert_eq!(read_string(guard.as_slice()), "Hello, world!");
}

#[test]
fn fetching_beyond_page_count_is_not_found() {
    let (bpm, _allocator, space, _dir) = setup(4);
    let err = bpm.fetch_page_read(PageId::new(space, 999)).unwrap_err();
    assert!(matches!(err, innocore::Error::PageNotFound(_)));
}

#[test]
fn pool_fills_up_then_drains_as_guards_drop() {
    let (bpm, allocator, space, _dir) = setup(4);
    let seg = allocator.create_segment(space, innocore::alloc::SegmentKind::Leaf);

    let mut guards = Vec::new();
    for _ in 0..4 {
        let pid = allocator.allocate_page(seg).unwrap();
        guards.push(bpm.new_page(pid).unwrap());
    }
    assert_eq!(bpm.free_frame_count(), 0);

    // All frames pinned: fetching one more distinct page must evict,
    // which is impossible with nothing evictable -- this should error.
    let extra_pid = allocator.allocate_page(seg).unwrap();
    assert!(bpm.new_page(extra_pid).is_err());

    // Drop half the guards, freeing their frames for reuse.
    guards.truncate(2);
    assert_eq!(bpm.free_frame_count(), 2);

    let extra_guard = bpm.new_page(extra_pid).unwrap();
    drop(extra_guard);
}

#[test]
fn dirty_page_survives_eviction_and_reload() {
    let (bpm, allocator, space, _dir) = setup(1);
    let seg = allocator.create_segment(space, innocore::alloc::SegmentKind::Leaf);
    let pid0 = allocator.allocate_page(seg).unwrap();
    let pid1 = allocator.allocate_page(seg).unwrap();

    {
        let mut guard = bpm.new_page(pid0).unwrap();
        guard.as_mut_slice()[0] = 0x42;
    }
    // Only one frame: loading page 1 evicts page 0, flushing it to disk.
    {
        let _guard = bpm.new_page(pid1).unwrap();
    }
    assert_eq!(bpm.stats().snapshot().evictions, 1);

    let guard = bpm.fetch_page_read(pid0).unwrap();
    assert_eq!(guard.as_slice()[0], 0x42);
}

#[test]
fn holding_a_write_guard_on_one_page_does_not_block_another() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    let (bpm, allocator, space, _dir) = setup(10);
    let seg = allocator.create_segment(space, innocore::alloc::SegmentKind::Leaf);
    let pid0 = allocator.allocate_page(seg).unwrap();
    let pid1 = allocator.allocate_page(seg).unwrap();
    drop(bpm.new_page(pid0).unwrap());
    drop(bpm.new_page(pid1).unwrap());

    let bpm = Arc::new(bpm);
    let guard0 = bpm.fetch_page_write(pid0).unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let started_clone = Arc::clone(&started);
    let bpm_clone = Arc::clone(&bpm);
    let child = thread::spawn(move || {
        started_clone.store(true, Ordering::SeqCst);
        let _guard = bpm_clone.fetch_page_write(pid0).unwrap();
    });

    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(50));

    // This would deadlock if page-level write locks were coarsened to
    // the whole pool.
    let _guard1 = bpm.fetch_page_write(pid1).unwrap();

    drop(guard0);
    child.join().unwrap();
}

#[test]
fn concurrent_readers_see_a_consistent_committed_value() {
    let (bpm, allocator, space, _dir) = setup(10);
    let seg = allocator.create_segment(space, innocore::alloc::SegmentKind::Leaf);
    let pid = allocator.allocate_page(seg).unwrap();
    {
        let mut guard = bpm.new_page(pid).unwrap();
        guard.as_mut_slice()[0] = 7;
    }

    let bpm = Arc::new(bpm);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let bpm_clone = Arc::clone(&bpm);
        handles.push(std::thread::spawn(move || {
            let guard = bpm_clone.fetch_page_read(pid).unwrap();
            assert_eq!(guard.as_slice()[0], 7);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(bpm.stats().snapshot().cache_hits >= 8);
}
