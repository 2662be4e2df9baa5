//! Per-index cache of parsed [`PageFields`] on top of the buffer pool, so
//! repeated tree descents don't pay the codec cost on every touch.
//!
//! Grounded on the same shape as [`crate::buffer::LruReplacer`] (an
//! MRU-front order list plus a size cap), generalized from tracking bare
//! frame ids to owning decoded page content and writing it back through
//! the codec on eviction or explicit flush.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::PageId;
use crate::error::Result;
use crate::storage::page::{self, PageFields};

struct CachedPage {
    fields: PageFields,
    dirty: bool,
}

struct Inner {
    entries: HashMap<PageId, CachedPage>,
    order: Vec<PageId>,
    capacity: usize,
}

/// Caches decoded B+tree pages for one index. Not shared across indexes:
/// each [`super::tree::BTree`] owns one.
pub struct ParsedPageCache {
    bpm: Arc<BufferPoolManager>,
    inner: Mutex<Inner>,
}

impl ParsedPageCache {
    pub fn new(bpm: Arc<BufferPoolManager>, capacity: usize) -> Self {
        assert!(capacity > 0, "parsed page cache capacity must be > 0");
        Self {
            bpm,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                capacity,
            }),
        }
    }

    /// Read a copy of the page's decoded content, loading it from the
    /// buffer pool on a cache miss.
    pub fn read(&self, page_id: PageId) -> Result<PageFields> {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.entries.get(&page_id) {
            let fields = cached.fields.clone();
            touch(&mut inner.order, page_id);
            return Ok(fields);
        }
        drop(inner);

        let guard = self.bpm.fetch_page_read(page_id)?;
        let fields = page::decode(guard.as_slice())?;
        drop(guard);

        let mut inner = self.inner.lock();
        insert(&mut inner, page_id, fields.clone(), false);
        self.evict_if_needed(&mut inner)?;
        Ok(fields)
    }

    /// Load, mutate, and write back a page's content in one step. The
    /// result replaces the cached entry and is marked dirty.
    pub fn write(&self, page_id: PageId, fields: PageFields) -> Result<()> {
        let mut inner = self.inner.lock();
        insert(&mut inner, page_id, fields, true);
        self.evict_if_needed(&mut inner)?;
        Ok(())
    }

    /// Register a brand-new page (already allocated by the allocator) and
    /// flush it to disk immediately so later reads under any path see
    /// consistent content.
    pub fn create(&self, page_id: PageId, fields: PageFields) -> Result<()> {
        self.flush_to_disk(page_id, &fields)?;
        let mut inner = self.inner.lock();
        insert(&mut inner, page_id, fields, false);
        self.evict_if_needed(&mut inner)?;
        Ok(())
    }

    /// Materialize a freshly allocated page in the buffer pool and persist
    /// `fields` as its content in one step, so callers (the B+tree engine)
    /// never have to reach past this cache to the buffer pool directly.
    pub fn create_new(&self, page_id: PageId, fields: PageFields) -> Result<()> {
        {
            let _guard = self.bpm.new_page(page_id)?;
        }
        self.create(page_id, fields)
    }

    pub fn flush(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.entries.get_mut(&page_id) {
            if cached.dirty {
                self.flush_to_disk(page_id, &cached.fields)?;
                cached.dirty = false;
            }
        }
        Ok(())
    }

    pub fn flush_all(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let inner = self.inner.lock();
            inner.order.clone()
        };
        for page_id in page_ids {
            self.flush(page_id)?;
        }
        Ok(())
    }

    fn flush_to_disk(&self, page_id: PageId, fields: &PageFields) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        let bytes = page::encode(fields)?;
        guard.as_mut_slice().copy_from_slice(&bytes);
        Ok(())
    }

    fn evict_if_needed(&self, inner: &mut Inner) -> Result<()> {
        while inner.order.len() > inner.capacity {
            let victim = inner.order.pop().expect("order non-empty");
            if let Some(cached) = inner.entries.remove(&victim) {
                if cached.dirty {
                    self.flush_to_disk(victim, &cached.fields)?;
                }
            }
        }
        Ok(())
    }
}

fn insert(inner: &mut Inner, page_id: PageId, fields: PageFields, dirty: bool) {
    if inner.entries.contains_key(&page_id) {
        touch(&mut inner.order, page_id);
    } else {
        inner.order.insert(0, page_id);
    }
    inner.entries.insert(page_id, CachedPage { fields, dirty });
}

fn touch(order: &mut Vec<PageId>, page_id: PageId) {
    if let Some(pos) = order.iter().position(|&p| p == page_id) {
        order.remove(pos);
        order.insert(0, page_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SpaceId;
    use crate::storage::page::PageType;
    use crate::storage::tablespace::{ExtentPurpose, TablespaceRegistry};
    use std::time::Duration;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, Arc<BufferPoolManager>, SpaceId) {
        let dir = tempdir().unwrap();
        let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
        let space = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Index))
            .unwrap();
        let bpm = Arc::new(BufferPoolManager::new(4, registry, 75, Duration::from_millis(1000)));
        (dir, bpm, space)
    }

    #[test]
    fn create_then_read_roundtrips() {
        let (_dir, bpm, space) = fixture();
        let cache = ParsedPageCache::new(Arc::clone(&bpm), 4);
        let page_id = PageId::new(space, 0);
        {
            let _guard = bpm.new_page(page_id).unwrap();
        }
        let fields = PageFields::new(space, 0, PageType::Index, 0);
        cache.create(page_id, fields.clone()).unwrap();
        let read_back = cache.read(page_id).unwrap();
        assert_eq!(read_back.header.page_no, fields.header.page_no);
    }

    #[test]
    fn eviction_flushes_dirty_entries() {
        let (_dir, bpm, space) = fixture();
        let cache = ParsedPageCache::new(Arc::clone(&bpm), 1);
        for i in 0..2u32 {
            let page_id = PageId::new(space, i);
            {
                let _guard = bpm.new_page(page_id).unwrap();
            }
            let fields = PageFields::new(space, i, PageType::Index, 0);
            cache.write(page_id, fields).unwrap();
        }
        // Capacity 1 means page 0 was evicted (and flushed) when page 1
        // was inserted; reading it back should still work via the bpm.
        let read_back = cache.read(PageId::new(space, 0)).unwrap();
        assert_eq!(read_back.header.page_no, 0);
    }
}
