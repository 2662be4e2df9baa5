//! Throughput benchmarks for the buffer pool's hot paths: cache hits,
//! cache misses forcing eviction, and dirty-page flush.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use innocore::alloc::{SegmentKind, SpaceAllocator};
use innocore::buffer::BufferPoolManager;
use innocore::common::PageId;
use innocore::storage::tablespace::{ExtentPurpose, TablespaceRegistry};

fn setup(pool_size: usize, resident_pages: usize) -> (BufferPoolManager, Vec<PageId>, TempDir) {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
    let space = registry.create_tablespace("bench").unwrap();
    registry
        .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Data))
        .unwrap();
    let allocator = SpaceAllocator::new(Arc::clone(&registry));
    let seg = allocator.create_segment(space, SegmentKind::Leaf);
    let bpm = BufferPoolManager::new(pool_size, registry, 75, Duration::from_millis(1000));

    let mut page_ids = Vec::with_capacity(resident_pages);
    for i in 0..resident_pages {
        let pid = allocator.allocate_page(seg).unwrap();
        let mut guard = bpm.new_page(pid).unwrap();
        guard.as_mut_slice()[0] = (i % 256) as u8;
        page_ids.push(pid);
    }
    (bpm, page_ids, dir)
}

fn bench_cache_hit_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_cache_hit");
    for &pool_size in &[16usize, 64, 256] {
        let (bpm, page_ids, _dir) = setup(pool_size, pool_size);
        group.bench_with_input(BenchmarkId::from_parameter(pool_size), &pool_size, |b, _| {
            b.iter(|| {
                for &pid in &page_ids {
                    let guard = bpm.fetch_page_read(pid).unwrap();
                    black_box(guard.as_slice()[0]);
                }
            })
        });
    }
    group.finish();
}

fn bench_eviction_churn(c: &mut Criterion) {
    // A working set twice the pool size: every other fetch forces an
    // eviction, exercising the replacer's hot path under pressure.
    let pool_size = 8;
    let (bpm, page_ids, _dir) = setup(pool_size, pool_size * 2);
    c.bench_function("buffer_pool_evict_and_reload", |b| {
        b.iter(|| {
            for &pid in &page_ids {
                let guard = bpm.fetch_page_read(pid).unwrap();
                black_box(guard.as_slice()[0]);
            }
        })
    });
}

fn bench_flush_all(c: &mut Criterion) {
    c.bench_function("buffer_pool_flush_all_dirty", |b| {
        let (bpm, page_ids, _dir) = setup(64, 64);
        b.iter(|| {
            for &pid in &page_ids {
                let mut guard = bpm.fetch_page_write(pid).unwrap();
                guard.as_mut_slice()[1] ^= 0xFF;
            }
            bpm.flush_all_pages().unwrap();
        })
    });
}

criterion_group!(benches, bench_cache_hit_reads, bench_eviction_churn, bench_flush_all);
criterion_main!(benches);
