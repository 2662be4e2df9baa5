//! The core ordered key/value B+tree over one index's leaf and non-leaf
//! segments.
//!
//! Leaf and interior pages share one on-disk record format: interior
//! records store a separator key plus a 4-byte child page number as their
//! value (see [`super::node`]). A split allocates a brand-new page for the
//! *left* half of the overflowing page and keeps the old page number for
//! the right half, so the only parent-side change a non-root split needs
//! is inserting one new separator — no existing child pointer ever has to
//! be rewritten.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::alloc::{SegmentKind, SpaceAllocator};
use crate::common::{IndexId, PageId, SegmentId, SpaceId, TrxId};
use crate::error::{Error, Result};
use crate::lock::{LockManager, LockMode, ResourceId};
use crate::redo::RedoManager;
use crate::storage::page::header::NO_PAGE;
use crate::storage::page::{self, PageFields, PageType, UserRecord};
use crate::txn::ReadView;
use crate::undo::{UndoEntry, UndoManager};

use super::comparator::compare_keys;
use super::node;
use super::page_cache::ParsedPageCache;
use super::record::{KeyValue, SearchResult};

/// Hash `(index_id, key)` into a lock-table resource id. The lock table's
/// `ResourceId` is opaque and caller-defined (see `lock::types`); this is
/// this tree's convention for naming one row's lock.
fn resource_for_key(index_id: IndexId, key: &[u8]) -> ResourceId {
    let mut hasher = DefaultHasher::new();
    index_id.0.hash(&mut hasher);
    key.hash(&mut hasher);
    ResourceId(hasher.finish())
}

/// Below this many records, a leaf or interior page is a merge candidate
/// after a purge shrinks it.
const MIN_RECORDS_BEFORE_MERGE: usize = 4;

/// An ordered key-value index over the pages of one leaf/non-leaf segment
/// pair.
///
/// Structural operations (insert, delete, purge) take the tree-wide write
/// lock; reads take only the read lock. This is the coarse index-level
/// mutex the storage core spec calls for; latch-coupling down the tree
/// (acquire child before releasing parent) is the documented further
/// refinement this type does not implement.
pub struct BTree {
    allocator: Arc<SpaceAllocator>,
    cache: ParsedPageCache,
    space: SpaceId,
    index_id: IndexId,
    unique: bool,
    leaf_segment: SegmentId,
    non_leaf_segment: SegmentId,
    root_page_no: AtomicU32,
    tree_lock: RwLock<()>,
    redo: Arc<RedoManager>,
    undo: Arc<UndoManager>,
    lock_manager: Arc<LockManager>,
    lock_timeout: Duration,
}

impl BTree {
    /// Create a brand-new, empty index: allocates its two segments and a
    /// single empty leaf page to act as the initial root.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        allocator: Arc<SpaceAllocator>,
        cache: ParsedPageCache,
        space: SpaceId,
        index_id: IndexId,
        unique: bool,
        redo: Arc<RedoManager>,
        undo: Arc<UndoManager>,
        lock_manager: Arc<LockManager>,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let leaf_segment = allocator.create_segment(space, SegmentKind::Leaf);
        let non_leaf_segment = allocator.create_segment(space, SegmentKind::NonLeaf);
        let root_page_id = allocator.allocate_page(leaf_segment)?;

        let mut fields = PageFields::new(space, root_page_id.page_no, PageType::Index, 0);
        fields.page_header.index_id = index_id.0;
        cache.create_new(root_page_id, fields)?;

        Ok(Self {
            allocator,
            cache,
            space,
            index_id,
            unique,
            leaf_segment,
            non_leaf_segment,
            root_page_no: AtomicU32::new(root_page_id.page_no),
            tree_lock: RwLock::new(()),
            redo,
            undo,
            lock_manager,
            lock_timeout,
        })
    }

    /// Reopen an index whose segments and root page already exist (as
    /// recorded by the data dictionary). No I/O happens until first use.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        allocator: Arc<SpaceAllocator>,
        cache: ParsedPageCache,
        space: SpaceId,
        index_id: IndexId,
        unique: bool,
        root_page_no: u32,
        leaf_segment: SegmentId,
        non_leaf_segment: SegmentId,
        redo: Arc<RedoManager>,
        undo: Arc<UndoManager>,
        lock_manager: Arc<LockManager>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            allocator,
            cache,
            space,
            index_id,
            unique,
            leaf_segment,
            non_leaf_segment,
            root_page_no: AtomicU32::new(root_page_no),
            tree_lock: RwLock::new(()),
            redo,
            undo,
            lock_manager,
            lock_timeout,
        }
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn root_page_no(&self) -> u32 {
        self.root_page_no.load(Ordering::Acquire)
    }

    pub fn leaf_segment(&self) -> SegmentId {
        self.leaf_segment
    }

    pub fn non_leaf_segment(&self) -> SegmentId {
        self.non_leaf_segment
    }

    /// Point lookup. `Err(Error::KeyNotFound)` covers an absent key, a
    /// record whose only version is delete-marked but not yet purged, and
    /// (when `view` is given) a record not yet visible to it.
    pub fn search(&self, key: &[u8], view: Option<&ReadView>) -> Result<SearchResult> {
        let _guard = self.tree_lock.read();
        let (_, leaf) = self.descend(key)?;
        let idx = leaf
            .records
            .binary_search_by(|r| compare_keys(&r.key, key))
            .map_err(|_| Error::KeyNotFound)?;
        let rec = &leaf.records[idx];
        if rec.delete_mark {
            return Err(Error::KeyNotFound);
        }
        if let Some(view) = view {
            if !view.is_visible(TrxId(rec.trx_id)) {
                return Err(Error::KeyNotFound);
            }
        }
        Ok(SearchResult {
            page: leaf.page_id(),
            slot: idx,
            value: rec.value.clone(),
        })
    }

    /// Insert `key` -> `value` under `trx_id`. On a unique index, a live
    /// (non-tombstoned) record at `key` is rejected with
    /// `Error::Duplicate`. Takes the row's exclusive lock, and logs the
    /// holding page's new image to redo (and, since the page already
    /// existed, to undo) before the in-memory page cache is updated.
    pub fn insert(&self, trx_id: TrxId, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let resource = resource_for_key(self.index_id, &key);
        self.lock_manager.acquire(trx_id, resource, LockMode::Exclusive, self.lock_timeout)?;

        let _guard = self.tree_lock.write();
        let (path, mut leaf) = self.descend(&key)?;
        let before = leaf.clone();

        let pos = leaf.records.partition_point(|r| r.key.as_slice() < key.as_slice());
        if self.unique {
            if let Some(existing) = leaf.records.get(pos) {
                if existing.key == key && !existing.delete_mark {
                    return Err(Error::Duplicate);
                }
            }
        }
        leaf.records.insert(
            pos,
            UserRecord {
                key,
                value,
                trx_id: trx_id.0,
                delete_mark: false,
            },
        );

        if page::fits(&leaf.records) {
            let page_id = leaf.page_id();
            self.log_write(trx_id, page_id, Some(&before), leaf)
        } else {
            self.split_and_promote(trx_id, leaf, path)
        }
    }

    /// Mark the record at `key` as deleted under `trx_id`. The record
    /// stays on the page (so in-flight MVCC readers with an older snapshot
    /// can still see it) until a later [`Self::purge`].
    pub fn delete(&self, trx_id: TrxId, key: &[u8]) -> Result<()> {
        let resource = resource_for_key(self.index_id, key);
        self.lock_manager.acquire(trx_id, resource, LockMode::Exclusive, self.lock_timeout)?;

        let _guard = self.tree_lock.write();
        let (_, mut leaf) = self.descend(key)?;
        let before = leaf.clone();
        let idx = leaf
            .records
            .binary_search_by(|r| compare_keys(&r.key, key))
            .map_err(|_| Error::KeyNotFound)?;
        if leaf.records[idx].delete_mark {
            return Err(Error::KeyNotFound);
        }
        leaf.records[idx].delete_mark = true;
        leaf.records[idx].trx_id = trx_id.0;
        let page_id = leaf.page_id();
        self.log_write(trx_id, page_id, Some(&before), leaf)
    }

    /// Physically remove a delete-marked record once no active read view
    /// can still need it. May merge the holding page with its right-hand
    /// sibling (and propagate the resulting underflow upward) if doing so
    /// fits within one page.
    pub fn purge(&self, trx_id: TrxId, key: &[u8]) -> Result<()> {
        let resource = resource_for_key(self.index_id, key);
        self.lock_manager.acquire(trx_id, resource, LockMode::Exclusive, self.lock_timeout)?;

        let _guard = self.tree_lock.write();
        let (path, mut leaf) = self.descend(key)?;
        let before = leaf.clone();
        let idx = leaf
            .records
            .binary_search_by(|r| compare_keys(&r.key, key))
            .map_err(|_| Error::KeyNotFound)?;
        if !leaf.records[idx].delete_mark {
            return Err(Error::KeyNotFound);
        }
        leaf.records.remove(idx);
        let leaf_page_no = leaf.header.page_no;
        let underflowed = leaf.records.len() < MIN_RECORDS_BEFORE_MERGE;
        let leaf_id = leaf.page_id();
        self.log_write(trx_id, leaf_id, Some(&before), leaf)?;

        if underflowed {
            self.try_merge_and_propagate(trx_id, leaf_page_no, path)?;
        }
        Ok(())
    }

    /// Records with `start_key <= key <= end_key`, in ascending order,
    /// skipping tombstones and (when `view` is given) versions not yet
    /// visible to it.
    pub fn range_search(
        &self,
        start_key: &[u8],
        end_key: &[u8],
        view: Option<&ReadView>,
    ) -> Result<Vec<KeyValue>> {
        let _guard = self.tree_lock.read();
        let (_, mut leaf) = self.descend(start_key)?;
        let mut start_idx = leaf.records.partition_point(|r| r.key.as_slice() < start_key);
        let mut results = Vec::new();
        loop {
            for rec in &leaf.records[start_idx..] {
                if rec.key.as_slice() > end_key {
                    return Ok(results);
                }
                let visible = !rec.delete_mark && view.map_or(true, |v| v.is_visible(TrxId(rec.trx_id)));
                if visible {
                    results.push(KeyValue {
                        key: rec.key.clone(),
                        value: rec.value.clone(),
                    });
                }
            }
            if leaf.header.next_page == NO_PAGE {
                return Ok(results);
            }
            leaf = self.read_page(leaf.header.next_page)?;
            start_idx = 0;
        }
    }

    /// Page number of the leftmost leaf.
    pub fn first_leaf_page(&self) -> Result<u32> {
        let _guard = self.tree_lock.read();
        Ok(self.first_leaf_fields()?.header.page_no)
    }

    /// Every leaf page number, in key order, following `NextPage`.
    pub fn all_leaf_pages(&self) -> Result<Vec<u32>> {
        let _guard = self.tree_lock.read();
        let mut page_no = self.first_leaf_fields()?.header.page_no;
        let mut pages = Vec::new();
        loop {
            pages.push(page_no);
            let fields = self.read_page(page_no)?;
            if fields.header.next_page == NO_PAGE {
                return Ok(pages);
            }
            page_no = fields.header.next_page;
        }
    }

    /// A bidirectional cursor positioned before the first record.
    pub fn cursor(&self) -> super::cursor::Cursor<'_> {
        super::cursor::Cursor::new(self)
    }

    pub(crate) fn space(&self) -> SpaceId {
        self.space
    }

    pub(crate) fn read_page(&self, page_no: u32) -> Result<PageFields> {
        self.cache.read(PageId::new(self.space, page_no))
    }

    pub(crate) fn leaf_for_key(&self, key: &[u8]) -> Result<PageFields> {
        let (_, leaf) = self.descend(key)?;
        Ok(leaf)
    }

    pub(crate) fn first_leaf_fields(&self) -> Result<PageFields> {
        self.leaf_for_key(&[])
    }

    pub(crate) fn last_leaf_fields(&self) -> Result<PageFields> {
        let mut page_no = self.root_page_no();
        loop {
            let fields = self.read_page(page_no)?;
            if fields.is_leaf() {
                return Ok(fields);
            }
            let last = fields
                .records
                .last()
                .ok_or_else(|| Error::Corrupt(format!("interior page {} has no children", page_no)))?;
            page_no = node::decode_child_pointer(&last.value);
        }
    }

    /// Descend from the root to the leaf that would hold `key`, returning
    /// the interior page numbers visited (root first) alongside the leaf.
    fn descend(&self, key: &[u8]) -> Result<(Vec<u32>, PageFields)> {
        let mut path = Vec::new();
        let mut page_no = self.root_page_no();
        loop {
            let fields = self.read_page(page_no)?;
            if fields.is_leaf() {
                return Ok((path, fields));
            }
            if fields.records.is_empty() {
                return Err(Error::Corrupt(format!("interior page {} has no children", page_no)));
            }
            path.push(page_no);
            page_no = node::find_child(&fields.records, key);
        }
    }

    fn segment_for_level(&self, level: u16) -> SegmentId {
        if level == 0 {
            self.leaf_segment
        } else {
            self.non_leaf_segment
        }
    }

    /// Log a page write to redo (and, when `before` holds the page's prior
    /// content, to undo too) before handing the new image to the cache.
    /// `before` is `None` only for a page with nothing to roll back to --
    /// one allocated fresh this call; see [`Self::log_create`].
    fn log_write(
        &self,
        trx_id: TrxId,
        page_id: PageId,
        before: Option<&PageFields>,
        mut fields: PageFields,
    ) -> Result<()> {
        let after = page::encode(&fields)?.to_vec();
        let before_bytes = match before {
            Some(b) => page::encode(b)?.to_vec(),
            None => Vec::new(),
        };
        let lsn = self.redo.append(trx_id, page_id, 0, before_bytes.clone(), after)?;
        if before.is_some() {
            self.undo.append(
                trx_id,
                UndoEntry {
                    page_id,
                    offset: 0,
                    before: before_bytes,
                },
            );
        }
        fields.header.lsn = lsn.0;
        self.cache.write(page_id, fields)
    }

    /// Same as [`Self::log_write`] for a page allocated fresh this call:
    /// no prior content exists to log to undo, and the cache learns of the
    /// page via `create_new` rather than `write`.
    fn log_create(&self, trx_id: TrxId, page_id: PageId, mut fields: PageFields) -> Result<()> {
        let after = page::encode(&fields)?.to_vec();
        let lsn = self.redo.append(trx_id, page_id, 0, Vec::new(), after)?;
        fields.header.lsn = lsn.0;
        self.cache.create_new(page_id, fields)
    }

    /// Flush every page this index has cached but not yet written to its
    /// tablespace.
    pub(crate) fn flush_cache(&self) -> Result<()> {
        self.cache.flush_all()
    }

    /// Split an overflowing page (`fields.records` already holds the
    /// to-be-inserted record). Allocates a new page for the left half,
    /// reuses the old page number for the right half, and inserts (or
    /// recursively splits) the new separator into the parent.
    fn split_and_promote(&self, trx_id: TrxId, fields: PageFields, mut path: Vec<u32>) -> Result<()> {
        let page_no = fields.header.page_no;
        let level = fields.page_header.page_level;
        let segment = self.segment_for_level(level);

        let mid = fields.records.len() / 2;
        debug_assert!(mid >= 1, "an overflowing page must hold at least two records");
        let left_records: Vec<UserRecord> = fields.records[..mid].to_vec();
        let right_records: Vec<UserRecord> = fields.records[mid..].to_vec();

        let left_page_id = self.allocator.allocate_page(segment)?;
        let left_page_no = left_page_id.page_no;

        let mut left_fields = PageFields::new(self.space, left_page_no, fields.header.page_type, level);
        left_fields.page_header.index_id = self.index_id.0;
        left_fields.header.next_page = page_no;
        left_fields.header.prev_page = fields.header.prev_page;
        left_fields.records = left_records.clone();

        let old_page_id = PageId::new(self.space, page_no);
        let before_right = self.cache.read(old_page_id)?;

        let mut right_fields = fields;
        right_fields.header.prev_page = left_page_no;
        right_fields.records = right_records.clone();

        if left_fields.header.prev_page != NO_PAGE {
            let pred_id = PageId::new(self.space, left_fields.header.prev_page);
            let pred_before = self.cache.read(pred_id)?;
            let mut pred_fields = pred_before.clone();
            pred_fields.header.next_page = left_page_no;
            self.log_write(trx_id, pred_id, Some(&pred_before), pred_fields)?;
        }

        self.log_create(trx_id, left_page_id, left_fields)?;
        self.log_write(trx_id, old_page_id, Some(&before_right), right_fields)?;

        let left_max_key = left_records
            .last()
            .expect("left half of a split is never empty")
            .key
            .clone();

        if page_no == self.root_page_no() {
            let new_root_id = self.allocator.allocate_page(self.non_leaf_segment)?;
            let right_max_key = right_records
                .last()
                .expect("right half of a split is never empty")
                .key
                .clone();
            let mut new_root_fields =
                PageFields::new(self.space, new_root_id.page_no, PageType::Index, level + 1);
            new_root_fields.page_header.index_id = self.index_id.0;
            new_root_fields.records = vec![
                node::separator(left_max_key, left_page_no),
                node::separator(right_max_key, page_no),
            ];
            self.log_create(trx_id, new_root_id, new_root_fields)?;
            self.root_page_no.store(new_root_id.page_no, Ordering::Release);
            return Ok(());
        }

        let parent_no = path.pop().expect("a non-root split always has a parent on the descent path");
        let parent_id = PageId::new(self.space, parent_no);
        let parent_before = self.cache.read(parent_id)?;
        let mut parent_fields = parent_before.clone();
        let idx = parent_fields
            .records
            .iter()
            .position(|r| node::decode_child_pointer(&r.value) == page_no)
            .expect("parent must hold a separator pointing at the child that split");
        parent_fields
            .records
            .insert(idx, node::separator(left_max_key, left_page_no));

        if page::fits(&parent_fields.records) {
            self.log_write(trx_id, parent_id, Some(&parent_before), parent_fields)
        } else {
            self.split_and_promote(trx_id, parent_fields, path)
        }
    }

    /// After a purge shrinks `page_no` below the merge threshold, try to
    /// fold it together with its right-hand sibling (found via the parent
    /// on `path`), propagating the resulting parent underflow upward.
    fn try_merge_and_propagate(&self, trx_id: TrxId, page_no: u32, mut path: Vec<u32>) -> Result<()> {
        let parent_no = match path.pop() {
            Some(p) => p,
            None => return self.maybe_collapse_root(page_no),
        };

        let parent_id = PageId::new(self.space, parent_no);
        let parent_before = self.cache.read(parent_id)?;
        let mut parent_fields = parent_before.clone();
        let idx = match parent_fields
            .records
            .iter()
            .position(|r| node::decode_child_pointer(&r.value) == page_no)
        {
            Some(i) => i,
            None => return Ok(()),
        };
        if idx + 1 >= parent_fields.records.len() {
            return Ok(());
        }

        let page_id = PageId::new(self.space, page_no);
        let page_before = self.cache.read(page_id)?;
        let mut page_fields = page_before.clone();
        let level = page_fields.page_header.page_level;
        let sibling_page_no = node::decode_child_pointer(&parent_fields.records[idx + 1].value);
        if page_fields.header.next_page != sibling_page_no {
            // Not chain-adjacent under this parent; leave the underflow.
            return Ok(());
        }

        let sibling_id = PageId::new(self.space, sibling_page_no);
        let sibling_fields = self.cache.read(sibling_id)?;

        let mut merged_records = page_fields.records.clone();
        merged_records.extend(sibling_fields.records.clone());
        if !page::fits(&merged_records) {
            return Ok(());
        }

        page_fields.records = merged_records;
        page_fields.header.next_page = sibling_fields.header.next_page;
        self.log_write(trx_id, page_id, Some(&page_before), page_fields)?;

        if sibling_fields.header.next_page != NO_PAGE {
            let successor_id = PageId::new(self.space, sibling_fields.header.next_page);
            let successor_before = self.cache.read(successor_id)?;
            let mut successor_fields = successor_before.clone();
            successor_fields.header.prev_page = page_no;
            self.log_write(trx_id, successor_id, Some(&successor_before), successor_fields)?;
        }

        self.allocator.free_page(self.segment_for_level(level), sibling_id)?;

        parent_fields.records[idx].key = parent_fields.records[idx + 1].key.clone();
        parent_fields.records.remove(idx + 1);
        let parent_underflowed = parent_fields.records.len() < MIN_RECORDS_BEFORE_MERGE;
        self.log_write(trx_id, parent_id, Some(&parent_before), parent_fields)?;

        if parent_underflowed {
            self.try_merge_and_propagate(trx_id, parent_no, path)?;
        }
        Ok(())
    }

    /// If the root is an interior node with a single child, drop that
    /// level of the tree by making the child the new root.
    fn maybe_collapse_root(&self, root_page_no: u32) -> Result<()> {
        let root_fields = self.read_page(root_page_no)?;
        if root_fields.is_leaf() || root_fields.records.len() != 1 {
            return Ok(());
        }
        let only_child = node::decode_child_pointer(&root_fields.records[0].value);
        self.root_page_no.store(only_child, Ordering::Release);
        self.allocator
            .free_page(self.non_leaf_segment, PageId::new(self.space, root_page_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::lock::LockManager;
    use crate::redo::RedoManager;
    use crate::storage::tablespace::{ExtentPurpose, TablespaceRegistry};
    use crate::undo::UndoManager;
    use tempfile::tempdir;

    const TRX: TrxId = TrxId(1);

    fn fixture() -> (tempfile::TempDir, BTree) {
        let dir = tempdir().unwrap();
        let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
        let space = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Index))
            .unwrap();
        let allocator = Arc::new(SpaceAllocator::new(Arc::clone(&registry)));
        let bpm = Arc::new(BufferPoolManager::new(64, registry, 75, Duration::from_millis(1000)));
        let cache = ParsedPageCache::new(Arc::clone(&bpm), 64);
        let redo = RedoManager::open(dir.path(), 1 << 20).unwrap();
        let undo = UndoManager::new();
        let lock_manager = LockManager::new();
        let tree = BTree::create(
            allocator,
            cache,
            space,
            IndexId(1),
            true,
            redo,
            undo,
            lock_manager,
            Duration::from_millis(5_000),
        )
        .unwrap();
        (dir, tree)
    }

    #[test]
    fn insert_then_search_roundtrips() {
        let (_dir, tree) = fixture();
        tree.insert(TRX, b"a".to_vec(), b"1".to_vec()).unwrap();
        tree.insert(TRX, b"b".to_vec(), b"2".to_vec()).unwrap();
        let found = tree.search(b"a", None).unwrap();
        assert_eq!(found.value, b"1");
    }

    #[test]
    fn search_missing_key_errors() {
        let (_dir, tree) = fixture();
        let err = tree.search(b"missing", None).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound));
    }

    #[test]
    fn unique_index_rejects_duplicate() {
        let (_dir, tree) = fixture();
        tree.insert(TRX, b"a".to_vec(), b"1".to_vec()).unwrap();
        let err = tree.insert(TRX, b"a".to_vec(), b"2".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Duplicate));
    }

    #[test]
    fn many_inserts_force_a_split_and_stay_searchable() {
        let (_dir, tree) = fixture();
        for i in 0..2000u32 {
            let key = format!("key-{i:06}").into_bytes();
            tree.insert(TRX, key, i.to_le_bytes().to_vec()).unwrap();
        }
        assert!(tree.all_leaf_pages().unwrap().len() > 1);
        for i in 0..2000u32 {
            let key = format!("key-{i:06}").into_bytes();
            let found = tree.search(&key, None).unwrap();
            assert_eq!(u32::from_le_bytes(found.value.try_into().unwrap()), i);
        }
    }

    #[test]
    fn range_search_orders_across_leaf_boundaries() {
        let (_dir, tree) = fixture();
        for i in 0..500u32 {
            let key = format!("k{i:05}").into_bytes();
            tree.insert(TRX, key, i.to_le_bytes().to_vec()).unwrap();
        }
        let results = tree.range_search(b"k00100", b"k00199", None).unwrap();
        assert_eq!(results.len(), 100);
        let keys: Vec<_> = results.iter().map(|kv| kv.key.clone()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn delete_then_purge_removes_the_record() {
        let (_dir, tree) = fixture();
        tree.insert(TRX, b"a".to_vec(), b"1".to_vec()).unwrap();
        tree.delete(TRX, b"a").unwrap();
        assert!(matches!(tree.search(b"a", None).unwrap_err(), Error::KeyNotFound));
        tree.purge(TRX, b"a").unwrap();
        assert!(matches!(tree.purge(TRX, b"a").unwrap_err(), Error::KeyNotFound));
    }

    #[test]
    fn cursor_walks_forward_and_backward() {
        let (_dir, tree) = fixture();
        for k in [b"a", b"b", b"c"] {
            tree.insert(TRX, k.to_vec(), k.to_vec()).unwrap();
        }
        let mut cursor = tree.cursor();
        assert_eq!(cursor.seek_first().unwrap().unwrap().key, b"a");
        assert_eq!(cursor.next().unwrap().unwrap().key, b"b");
        assert_eq!(cursor.next().unwrap().unwrap().key, b"c");
        assert!(cursor.next().unwrap().is_none());
        assert_eq!(cursor.prev().unwrap().unwrap().key, b"c");
    }
}
