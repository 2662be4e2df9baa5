//! The data dictionary: persistent metadata for every table and index,
//! rooted at the fixed dictionary root page (space 0, page 5).
//!
//! `SYS_TABLES`/`SYS_COLUMNS`/`SYS_INDEXES`/`SYS_FIELDS` are themselves
//! B+trees, grounded the same way any other index is
//! ([`crate::index::btree::BTree`]); the root page itself is a raw,
//! uncodec'd page holding four counters and the four system trees' root
//! page numbers, read/written directly through the buffer pool.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::alloc::SpaceAllocator;
use crate::buffer::BufferPoolManager;
use crate::common::config::system_pages::DICTIONARY_ROOT;
use crate::common::ids::{IndexId, SpaceId, TableId, TrxId};
use crate::common::PageId;
use crate::error::{Error, Result};
use crate::index::btree::{BTree, ParsedPageCache};
use crate::lock::LockManager;
use crate::redo::RedoManager;
use crate::undo::UndoManager;

use super::catalog::{ColumnRow, FieldRow, IndexRow, TableRow};

const SYS_TABLES_INDEX: IndexId = IndexId(1);
const SYS_COLUMNS_INDEX: IndexId = IndexId(2);
const SYS_INDEXES_INDEX: IndexId = IndexId(3);
const SYS_FIELDS_INDEX: IndexId = IndexId(4);

/// Trx id stamped on every system-catalog write. Catalog mutations are
/// already serialized by `Dictionary::write_lock` and never MVCC-filtered
/// on read (every dictionary read passes `None` for its read view), so no
/// real transaction identity is needed here -- this just satisfies the
/// B+tree write path's redo/undo/lock plumbing, which every write goes
/// through regardless of caller.
const DICTIONARY_TRX_ID: TrxId = TrxId(0);

const ROOT_LAYOUT_LEN: usize = 44;

struct RootCounters {
    max_table_id: u64,
    max_index_id: u64,
    max_space_id: u32,
    max_row_id: u64,
}

impl RootCounters {
    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.max_table_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.max_index_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.max_space_id.to_le_bytes());
        buf[20..28].copy_from_slice(&self.max_row_id.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            max_table_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            max_index_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            max_space_id: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            max_row_id: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
        }
    }
}

/// Description of a table to create, passed to
/// [`Dictionary::create_table`]: `(name, column_name, type_code)` per
/// column, in ordinal order.
pub struct TableDef {
    pub name: String,
    pub columns: Vec<(String, u8)>,
}

/// Description of an index to add, passed to [`Dictionary::add_index`]:
/// the field list is the column ordinals (within the owning table) that
/// make up the index key, in key order.
pub struct IndexDef {
    pub name: String,
    pub unique: bool,
    pub field_column_ordinals: Vec<u32>,
}

pub struct TableInfo {
    pub table_id: TableId,
    pub name: String,
    pub space_id: SpaceId,
    pub columns: Vec<ColumnRow>,
    pub indexes: Vec<IndexRow>,
}

/// Persistent metadata store plus the four system B+trees backing it.
pub struct Dictionary {
    allocator: Arc<SpaceAllocator>,
    bpm: Arc<BufferPoolManager>,
    sys_tables: BTree,
    sys_columns: BTree,
    sys_indexes: BTree,
    sys_fields: BTree,
    next_table_id: AtomicU64,
    next_index_id: AtomicU64,
    next_space_id: AtomicU32,
    next_row_id: AtomicU64,
    write_lock: Mutex<()>,
}

impl Dictionary {
    /// Bootstrap a brand-new system tablespace: create the four system
    /// trees and persist their root pages plus fresh counters into the
    /// dictionary root page.
    pub fn bootstrap(
        allocator: Arc<SpaceAllocator>,
        bpm: Arc<BufferPoolManager>,
        redo: Arc<RedoManager>,
        undo: Arc<UndoManager>,
        lock_manager: Arc<LockManager>,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let space = SpaceId::SYSTEM;

        // Reserve the fixed low page numbers (FSP header through the
        // first rollback segment, spec §4.K's system-tablespace page
        // table) before any system tree claims pages of its own, so
        // `DICTIONARY_ROOT` lands at a known, stable page number.
        let reserved = allocator.create_segment(space, crate::alloc::SegmentKind::System);
        for _ in 0..=DICTIONARY_ROOT.max(crate::common::config::system_pages::FIRST_ROLLBACK_SEGMENT) {
            allocator.allocate_page(reserved)?;
        }

        let sys_tables = BTree::create(
            Arc::clone(&allocator),
            ParsedPageCache::new(Arc::clone(&bpm), 64),
            space,
            SYS_TABLES_INDEX,
            true,
            Arc::clone(&redo),
            Arc::clone(&undo),
            Arc::clone(&lock_manager),
            lock_timeout,
        )?;
        let sys_columns = BTree::create(
            Arc::clone(&allocator),
            ParsedPageCache::new(Arc::clone(&bpm), 64),
            space,
            SYS_COLUMNS_INDEX,
            true,
            Arc::clone(&redo),
            Arc::clone(&undo),
            Arc::clone(&lock_manager),
            lock_timeout,
        )?;
        let sys_indexes = BTree::create(
            Arc::clone(&allocator),
            ParsedPageCache::new(Arc::clone(&bpm), 64),
            space,
            SYS_INDEXES_INDEX,
            true,
            Arc::clone(&redo),
            Arc::clone(&undo),
            Arc::clone(&lock_manager),
            lock_timeout,
        )?;
        let sys_fields = BTree::create(
            Arc::clone(&allocator),
            ParsedPageCache::new(Arc::clone(&bpm), 64),
            space,
            SYS_FIELDS_INDEX,
            true,
            redo,
            undo,
            lock_manager,
            lock_timeout,
        )?;

        let dict = Self {
            allocator,
            bpm: Arc::clone(&bpm),
            sys_tables,
            sys_columns,
            sys_indexes,
            sys_fields,
            next_table_id: AtomicU64::new(1),
            next_index_id: AtomicU64::new(5), // 1..=4 reserved for the system indexes themselves
            next_space_id: AtomicU32::new(1), // 0 is the system space
            next_row_id: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        };
        dict.persist_root()?;
        Ok(dict)
    }

    /// Recover an existing system tablespace by reading the dictionary
    /// root page and reopening the four system trees at their recorded
    /// root page numbers.
    pub fn open(
        allocator: Arc<SpaceAllocator>,
        bpm: Arc<BufferPoolManager>,
        redo: Arc<RedoManager>,
        undo: Arc<UndoManager>,
        lock_manager: Arc<LockManager>,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let root_page_id = PageId::new(SpaceId::SYSTEM, DICTIONARY_ROOT);
        let guard = bpm.fetch_page_read(root_page_id)?;
        let body = guard.as_slice();
        if body.len() < ROOT_LAYOUT_LEN {
            return Err(Error::Corrupt("dictionary root page too small".to_string()));
        }
        let counters = RootCounters::decode(body);
        let sys_tables_root = u32::from_le_bytes(body[28..32].try_into().unwrap());
        let sys_columns_root = u32::from_le_bytes(body[32..36].try_into().unwrap());
        let sys_indexes_root = u32::from_le_bytes(body[36..40].try_into().unwrap());
        let sys_fields_root = u32::from_le_bytes(body[40..44].try_into().unwrap());
        drop(guard);

        let space = SpaceId::SYSTEM;
        let leaf = crate::alloc::SegmentKind::Leaf;
        let non_leaf = crate::alloc::SegmentKind::NonLeaf;
        // Segments for the system trees are recreated as fresh segment
        // handles pointing at their existing pages; the allocator treats
        // them as already-populated since their extents were never freed.
        let open_tree = |index_id: IndexId, root: u32| -> BTree {
            let leaf_segment = allocator.create_segment(space, leaf);
            let non_leaf_segment = allocator.create_segment(space, non_leaf);
            BTree::open(
                Arc::clone(&allocator),
                ParsedPageCache::new(Arc::clone(&bpm), 64),
                space,
                index_id,
                true,
                root,
                leaf_segment,
                non_leaf_segment,
                Arc::clone(&redo),
                Arc::clone(&undo),
                Arc::clone(&lock_manager),
                lock_timeout,
            )
        };

        Ok(Self {
            sys_tables: open_tree(SYS_TABLES_INDEX, sys_tables_root),
            sys_columns: open_tree(SYS_COLUMNS_INDEX, sys_columns_root),
            sys_indexes: open_tree(SYS_INDEXES_INDEX, sys_indexes_root),
            sys_fields: open_tree(SYS_FIELDS_INDEX, sys_fields_root),
            allocator,
            bpm,
            next_table_id: AtomicU64::new(counters.max_table_id + 1),
            next_index_id: AtomicU64::new(counters.max_index_id.max(4) + 1),
            next_space_id: AtomicU32::new(counters.max_space_id + 1),
            next_row_id: AtomicU64::new(counters.max_row_id + 1),
            write_lock: Mutex::new(()),
        })
    }

    fn persist_root(&self) -> Result<()> {
        let root_page_id = PageId::new(SpaceId::SYSTEM, DICTIONARY_ROOT);
        let mut guard = match self.bpm.fetch_page_write(root_page_id) {
            Ok(g) => g,
            Err(_) => self.bpm.new_page(root_page_id)?,
        };
        let body = guard.as_mut_slice();
        let counters = RootCounters {
            max_table_id: self.next_table_id.load(Ordering::SeqCst).saturating_sub(1),
            max_index_id: self.next_index_id.load(Ordering::SeqCst).saturating_sub(1),
            max_space_id: self.next_space_id.load(Ordering::SeqCst).saturating_sub(1),
            max_row_id: self.next_row_id.load(Ordering::SeqCst).saturating_sub(1),
        };
        counters.encode(body);
        body[28..32].copy_from_slice(&self.sys_tables.root_page_no().to_le_bytes());
        body[32..36].copy_from_slice(&self.sys_columns.root_page_no().to_le_bytes());
        body[36..40].copy_from_slice(&self.sys_indexes.root_page_no().to_le_bytes());
        body[40..44].copy_from_slice(&self.sys_fields.root_page_no().to_le_bytes());
        Ok(())
    }

    /// Allocate a fresh table id and persist its row and column rows
    /// under the given tablespace. `space` must already be open in the
    /// registry the caller's [`crate::engine::StorageManager`] holds --
    /// this just records it, it does not create the tablespace file.
    pub fn create_table(&self, def: TableDef, space: SpaceId) -> Result<TableId> {
        let _guard = self.write_lock.lock();
        if self.find_table_id_by_name(&def.name)?.is_some() {
            return Err(Error::NotFound(format!("table {:?} already exists", def.name)));
        }
        let table_id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
        let space_id = space.0;
        self.next_space_id.fetch_max(space_id + 1, Ordering::SeqCst);

        let row = TableRow { table_id, name: def.name, space_id };
        self.sys_tables
            .insert(DICTIONARY_TRX_ID, TableRow::key(table_id), row.encode())?;

        for (ordinal, (name, type_code)) in def.columns.into_iter().enumerate() {
            let ordinal = ordinal as u32;
            let col = ColumnRow { table_id, ordinal, name, type_code };
            self.sys_columns
                .insert(DICTIONARY_TRX_ID, ColumnRow::key(table_id, ordinal), col.encode())?;
        }

        self.persist_root()?;
        Ok(table_id)
    }

    /// Drop a table's row, its columns, and every index row/field row
    /// that references it.
    pub fn drop_table(&self, table_id: TableId) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.sys_tables.delete(DICTIONARY_TRX_ID, &TableRow::key(table_id))?;

        let columns = self.columns_of(table_id)?;
        for col in &columns {
            self.sys_columns.delete(DICTIONARY_TRX_ID, &ColumnRow::key(table_id, col.ordinal))?;
        }

        let indexes = self.indexes_of(table_id)?;
        for idx in &indexes {
            self.drop_index_rows(idx.index_id)?;
        }

        self.persist_root()?;
        Ok(())
    }

    /// Mint a fresh [`IndexId`] without registering anything. Lets a
    /// caller stamp the id into a tree's root page at creation time,
    /// before the row describing that tree exists in `SYS_INDEXES`.
    pub fn reserve_index_id(&self) -> IndexId {
        IndexId(self.next_index_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a new index on `table_id`: allocates an index id,
    /// persists the index row and its field rows. Does not create the
    /// index's own B+tree segments — the caller (the storage engine
    /// facade, which also owns the live `BTree` handles) does that and
    /// passes back the root page number to record.
    ///
    /// Callers that need the id before the tree exists (to stamp it into
    /// the tree's own root page at creation time) should call
    /// [`Self::reserve_index_id`] first and pass the result here instead
    /// of letting this method mint one.
    pub fn add_index(&self, table_id: TableId, index_id: IndexId, def: IndexDef, root_page_no: u32) -> Result<IndexId> {
        let _guard = self.write_lock.lock();
        if self.find_table(table_id)?.is_none() {
            return Err(Error::NotFound(format!("table {:?}", table_id)));
        }
        let row = IndexRow {
            index_id,
            table_id,
            name: def.name,
            root_page_no,
            unique: def.unique,
        };
        self.sys_indexes
            .insert(DICTIONARY_TRX_ID, IndexRow::key(index_id), row.encode())?;

        for (ordinal, column_ordinal) in def.field_column_ordinals.into_iter().enumerate() {
            let ordinal = ordinal as u32;
            let field = FieldRow { index_id, ordinal, column_ordinal };
            self.sys_fields
                .insert(DICTIONARY_TRX_ID, FieldRow::key(index_id, ordinal), field.encode())?;
        }

        self.persist_root()?;
        Ok(index_id)
    }

    fn drop_index_rows(&self, index_id: IndexId) -> Result<()> {
        let fields = self.fields_of(index_id)?;
        for field in &fields {
            self.sys_fields.delete(DICTIONARY_TRX_ID, &FieldRow::key(index_id, field.ordinal))?;
        }
        self.sys_indexes.delete(DICTIONARY_TRX_ID, &IndexRow::key(index_id))?;
        Ok(())
    }

    pub fn get_table(&self, table_id: TableId) -> Result<TableInfo> {
        self.find_table(table_id)?
            .ok_or_else(|| Error::NotFound(format!("table {:?}", table_id)))
    }

    pub fn get_table_by_name(&self, name: &str) -> Result<TableInfo> {
        let table_id = self
            .find_table_id_by_name(name)?
            .ok_or_else(|| Error::NotFound(format!("table {:?}", name)))?;
        self.get_table(table_id)
    }

    pub fn next_row_id(&self) -> u64 {
        self.next_row_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Remove an index's row and field rows without touching its owning
    /// table's row. The caller (the index manager) is responsible for
    /// having already unloaded/dropped the index's own B+tree segments.
    pub fn drop_index_by_id(&self, index_id: IndexId) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.drop_index_rows(index_id)?;
        self.persist_root()?;
        Ok(())
    }

    /// Look up the table that owns `index_id`, for callers that only
    /// have an index id in hand (e.g. unloading/reloading a tree).
    pub fn find_table_owning_index(&self, index_id: IndexId) -> Result<TableInfo> {
        let result = self
            .sys_indexes
            .search(&IndexRow::key(index_id), None)
            .map_err(|e| match e {
                Error::KeyNotFound => Error::NotFound(format!("index {:?}", index_id)),
                other => other,
            })?;
        let row = IndexRow::decode(index_id, &result.value)?;
        self.get_table(row.table_id)
    }

    fn find_table(&self, table_id: TableId) -> Result<Option<TableInfo>> {
        let row = match self.sys_tables.search(&TableRow::key(table_id), None) {
            Ok(result) => TableRow::decode(table_id, &result.value)?,
            Err(Error::KeyNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let columns = self.columns_of(table_id)?;
        let indexes = self.indexes_of(table_id)?;
        Ok(Some(TableInfo {
            table_id: row.table_id,
            name: row.name,
            space_id: SpaceId::new(row.space_id),
            columns,
            indexes,
        }))
    }

    fn find_table_id_by_name(&self, name: &str) -> Result<Option<TableId>> {
        let all = self.sys_tables.range_search(&[], &[0xFF; 8], None)?;
        for kv in all {
            let table_id = TableId(u64::from_be_bytes(kv.key[..8].try_into().unwrap()));
            let row = TableRow::decode(table_id, &kv.value)?;
            if row.name == name {
                return Ok(Some(table_id));
            }
        }
        Ok(None)
    }

    fn columns_of(&self, table_id: TableId) -> Result<Vec<ColumnRow>> {
        let start = ColumnRow::key(table_id, 0);
        let end = ColumnRow::key(table_id, u32::MAX);
        let rows = self.sys_columns.range_search(&start, &end, None)?;
        rows.into_iter()
            .map(|kv| {
                let ordinal = u32::from_be_bytes(kv.key[8..12].try_into().unwrap());
                ColumnRow::decode(table_id, ordinal, &kv.value)
            })
            .collect()
    }

    fn indexes_of(&self, table_id: TableId) -> Result<Vec<IndexRow>> {
        let all = self.sys_indexes.range_search(&[0u8; 8], &[0xFFu8; 8], None)?;
        all.into_iter()
            .filter_map(|kv| {
                let index_id = IndexId(u64::from_be_bytes(kv.key[..8].try_into().unwrap()));
                match IndexRow::decode(index_id, &kv.value) {
                    Ok(row) if row.table_id == table_id => Some(Ok(row)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .collect()
    }

    fn fields_of(&self, index_id: IndexId) -> Result<Vec<FieldRow>> {
        let start = FieldRow::key(index_id, 0);
        let end = FieldRow::key(index_id, u32::MAX);
        let rows = self.sys_fields.range_search(&start, &end, None)?;
        rows.into_iter()
            .map(|kv| {
                let ordinal = u32::from_be_bytes(kv.key[8..12].try_into().unwrap());
                FieldRow::decode(index_id, ordinal, &kv.value)
            })
            .collect()
    }
}
