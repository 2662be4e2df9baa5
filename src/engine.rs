//! Top-level facades: [`StorageManager`] owns every subsystem for one open
//! data directory; [`IndexManager`] is the per-index handle surface callers
//! actually drive (spec §6).

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::alloc::SpaceAllocator;
use crate::buffer::{BackgroundFlusher, BufferPoolManager};
use crate::common::config::{StorageEngineConfig, PAGE_SIZE};
use crate::common::ids::{IndexId, SpaceId, TableId, TrxId};
use crate::dict::{Dictionary, IndexDef, TableDef, TableInfo};
use crate::error::{Error, Result};
use crate::index::btree::{BTree, ParsedPageCache};
use crate::index::KeyValue;
use crate::lock::LockManager;
use crate::redo::RedoManager;
use crate::storage::tablespace::TablespaceRegistry;
use crate::sysvars::SystemVariablesStore;
use crate::txn::{IsolationLevel, ReadView, TransactionManager};
use crate::undo::UndoManager;

/// Per-index cache capacity for [`ParsedPageCache`]. Not currently
/// exposed through [`StorageEngineConfig`] — a fixed value matching the
/// teacher's fixed frame counts for similar internal caches.
const PARSED_PAGE_CACHE_CAPACITY: usize = 256;

const SYSTEM_TABLESPACE_FILE_NAME: &str = "ibdata1";

/// Owns every open subsystem for one data directory: tablespaces, buffer
/// pool, redo/undo logs, lock table, transaction manager, data
/// dictionary, and system variables. Background threads are started in
/// [`Self::open`] and stopped in [`Self::close`] (also on `Drop`, as a
/// backstop).
pub struct StorageManager {
    pub(crate) registry: Arc<TablespaceRegistry>,
    pub(crate) allocator: Arc<SpaceAllocator>,
    pub(crate) bpm: Arc<BufferPoolManager>,
    pub redo: Arc<RedoManager>,
    pub undo: Arc<UndoManager>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    pub dictionary: Arc<Dictionary>,
    pub sysvars: Arc<SystemVariablesStore>,
    lock_timeout: Duration,
    /// Every [`IndexManager`] handed out by [`Self::index_manager`], held
    /// weakly so `flush_all`/`close` can reach still-live ones without
    /// keeping them (or their cached trees) alive past their owner's use.
    index_managers: Mutex<Vec<Weak<IndexManager>>>,
    flusher: Mutex<BackgroundFlusher>,
}

impl StorageManager {
    pub fn open(config: StorageEngineConfig) -> Result<Arc<Self>> {
        let registry = Arc::new(TablespaceRegistry::open(&config.data_dir, SYSTEM_TABLESPACE_FILE_NAME)?);
        registry.discover()?;
        let needs_bootstrap = registry.with_space(SpaceId::SYSTEM, |ts| Ok(ts.page_count() == 0))?;

        let allocator = Arc::new(SpaceAllocator::new(Arc::clone(&registry)));
        let pool_size = (config.innodb_buffer_pool_size_bytes as usize / PAGE_SIZE).max(16);
        let bpm = Arc::new(BufferPoolManager::new(
            pool_size,
            Arc::clone(&registry),
            config.buffer_pool_young_ratio_percent as u32,
            Duration::from_millis(config.buffer_pool_old_block_time_ms),
        ));

        let redo = RedoManager::open(&config.innodb_redo_log_dir, 64 * 1024)?;
        // Replay the log before anything else touches a page: recovery
        // must run against a cold buffer pool, or a cache-resident page
        // could shadow an on-disk LSN the idempotency guard needs to see.
        if !needs_bootstrap {
            let applied = redo.recover_into(&bpm)?;
            if applied > 0 {
                log::info!("replayed {} redo record(s) during recovery", applied);
            }
        }
        redo.start(Duration::from_secs(1));
        bpm.attach_redo(Arc::clone(&redo));

        let undo = UndoManager::new();

        let lock_manager = LockManager::new();
        lock_manager.start(Duration::from_secs(1));

        let txn_manager = TransactionManager::new(
            Arc::clone(&lock_manager),
            Arc::clone(&undo),
            Duration::from_millis(config.trx_idle_timeout_ms),
        );
        txn_manager.start(Duration::from_millis(config.trx_idle_timeout_ms.min(60_000)));

        let lock_timeout = Duration::from_millis(config.lock_wait_timeout_ms);
        let dictionary = Arc::new(if needs_bootstrap {
            Dictionary::bootstrap(
                Arc::clone(&allocator),
                Arc::clone(&bpm),
                Arc::clone(&redo),
                Arc::clone(&undo),
                Arc::clone(&lock_manager),
                lock_timeout,
            )?
        } else {
            Dictionary::open(
                Arc::clone(&allocator),
                Arc::clone(&bpm),
                Arc::clone(&redo),
                Arc::clone(&undo),
                Arc::clone(&lock_manager),
                lock_timeout,
            )?
        });

        let sysvars = Arc::new(SystemVariablesStore::from_config(&config));

        let mut flusher = BackgroundFlusher::new(Arc::clone(&bpm), Duration::from_millis(config.buffer_pool_flush_interval_ms));
        flusher.start();

        Ok(Arc::new(Self {
            registry,
            allocator,
            bpm,
            redo,
            undo,
            lock_manager,
            txn_manager,
            dictionary,
            sysvars,
            lock_timeout,
            index_managers: Mutex::new(Vec::new()),
            flusher: Mutex::new(flusher),
        }))
    }

    pub fn data_dir(&self) -> &Path {
        self.registry.data_dir()
    }

    /// Begin a new transaction, returning its id. Pass it into every
    /// `IndexManager` call made on its behalf.
    pub fn begin_tx(&self, read_only: bool, isolation: IsolationLevel) -> TrxId {
        self.txn_manager.begin(read_only, isolation)
    }

    /// Commit `trx_id`: flush redo through the current LSN (so every
    /// write it made is durable before the commit is acknowledged), then
    /// release its locks and undo chain.
    pub fn commit(&self, trx_id: TrxId) -> Result<()> {
        self.redo.flush(self.redo.current_lsn())?;
        self.txn_manager.commit(trx_id)
    }

    /// Roll back `trx_id`: restore every page its undo chain covers to
    /// its pre-transaction image, then release its locks.
    pub fn rollback(&self, trx_id: TrxId) -> Result<()> {
        let bpm = Arc::clone(&self.bpm);
        self.txn_manager.rollback(trx_id, move |entry| {
            let mut guard = bpm.fetch_page_write(entry.page_id)?;
            guard.as_mut_slice().copy_from_slice(&entry.before);
            Ok(())
        })
    }

    /// Flush every index's in-memory page cache and every dirty buffer
    /// pool frame to disk. Called by [`Self::close`]; also callable
    /// directly by a caller that wants a durability checkpoint without
    /// shutting down.
    pub fn flush_all(&self) -> Result<()> {
        let managers: Vec<Arc<IndexManager>> =
            self.index_managers.lock().iter().filter_map(Weak::upgrade).collect();
        for manager in managers {
            manager.flush_all()?;
        }
        self.bpm.flush_all_pages()
    }

    /// Create a tablespace not tied to a dictionary table (e.g. a
    /// freestanding index space). Most callers want [`Self::create_table`]
    /// instead.
    pub fn create_tablespace(&self, name: &str) -> Result<SpaceId> {
        self.registry.create_tablespace(name)
    }

    pub fn get_tablespace(&self, space: SpaceId) -> Result<SpaceId> {
        self.registry.with_space(space, |ts| Ok(ts.id()))
    }

    /// Stop every background thread in an orderly fashion, flushing all
    /// pending writes first. Safe to call more than once; `Drop` calls
    /// this too as a backstop.
    pub fn close(&self) {
        if let Err(err) = self.flush_all() {
            log::warn!("flush during close failed: {}", err);
        }
        self.flusher.lock().stop();
        self.txn_manager.stop();
        self.lock_manager.stop();
        self.redo.stop();
    }

    /// Create a table's own `.ibd` tablespace, then register the table in
    /// the dictionary against it. Mirrors `innodb_file_per_table=ON`
    /// (this core's only supported layout -- see DESIGN.md). The first
    /// index created against the table triggers its first extent, same
    /// as any other segment (`alloc::SpaceAllocator::allocate_page`).
    pub fn create_table(&self, def: TableDef) -> Result<TableId> {
        let space = self.registry.create_tablespace(&def.name)?;
        self.dictionary.create_table(def, space)
    }

    /// Drop a table's dictionary rows and delete its tablespace file.
    pub fn drop_table(&self, table_id: TableId) -> Result<()> {
        let space = self.dictionary.get_table(table_id)?.space_id;
        self.dictionary.drop_table(table_id)?;
        self.registry.drop_tablespace(space)
    }

    pub fn get_table(&self, table_id: TableId) -> Result<TableInfo> {
        self.dictionary.get_table(table_id)
    }

    pub fn get_table_by_name(&self, name: &str) -> Result<TableInfo> {
        self.dictionary.get_table_by_name(name)
    }

    /// Open an [`IndexManager`] for `table_id`'s data space, backed by
    /// this manager's allocator, buffer pool, redo/undo logs, and lock
    /// table. A weak reference is kept so [`Self::flush_all`]/
    /// [`Self::close`] can still flush it later; it is never reused for
    /// lookup, so each call gets its own freshly loaded trees.
    pub fn index_manager(self: &Arc<Self>, space: SpaceId) -> Arc<IndexManager> {
        let manager = Arc::new(IndexManager::new(
            Arc::clone(&self.allocator),
            Arc::clone(&self.bpm),
            Arc::clone(&self.dictionary),
            space,
            Arc::clone(&self.redo),
            Arc::clone(&self.undo),
            Arc::clone(&self.lock_manager),
            self.lock_timeout,
        ));
        self.index_managers.lock().push(Arc::downgrade(&manager));
        manager
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Holds every currently-loaded [`BTree`] handle for one tablespace,
/// keyed by index id, and mediates create/load/unload/drop against the
/// data dictionary.
pub struct IndexManager {
    allocator: Arc<SpaceAllocator>,
    bpm: Arc<BufferPoolManager>,
    dictionary: Arc<Dictionary>,
    space: SpaceId,
    redo: Arc<RedoManager>,
    undo: Arc<UndoManager>,
    lock_manager: Arc<LockManager>,
    lock_timeout: Duration,
    trees: Mutex<HashMap<IndexId, Arc<BTree>>>,
}

impl IndexManager {
    #[allow(clippy::too_many_arguments)]
    fn new(
        allocator: Arc<SpaceAllocator>,
        bpm: Arc<BufferPoolManager>,
        dictionary: Arc<Dictionary>,
        space: SpaceId,
        redo: Arc<RedoManager>,
        undo: Arc<UndoManager>,
        lock_manager: Arc<LockManager>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            allocator,
            bpm,
            dictionary,
            space,
            redo,
            undo,
            lock_manager,
            lock_timeout,
            trees: Mutex::new(HashMap::new()),
        }
    }

    /// Create a brand-new index, register it in the dictionary, and load
    /// it.
    pub fn create_index(&self, table_id: TableId, def: IndexDef) -> Result<IndexId> {
        let unique = def.unique;
        let index_id = self.dictionary.reserve_index_id();
        let tree = BTree::create(
            Arc::clone(&self.allocator),
            ParsedPageCache::new(Arc::clone(&self.bpm), PARSED_PAGE_CACHE_CAPACITY),
            self.space,
            index_id,
            unique,
            Arc::clone(&self.redo),
            Arc::clone(&self.undo),
            Arc::clone(&self.lock_manager),
            self.lock_timeout,
        )?;
        let root_page_no = tree.root_page_no();
        let index_id = self.dictionary.add_index(table_id, index_id, def, root_page_no)?;
        self.trees.lock().insert(index_id, Arc::new(tree));
        Ok(index_id)
    }

    /// Load an already-registered index's tree into memory if it isn't
    /// resident already.
    pub fn load(&self, index_id: IndexId) -> Result<Arc<BTree>> {
        if let Some(tree) = self.trees.lock().get(&index_id) {
            return Ok(Arc::clone(tree));
        }
        let table = self.find_table_for_index(index_id)?;
        let row = table
            .indexes
            .into_iter()
            .find(|idx| idx.index_id == index_id)
            .ok_or_else(|| Error::NotFound(format!("index {:?}", index_id)))?;

        let leaf_segment = self.allocator.create_segment(self.space, crate::alloc::SegmentKind::Leaf);
        let non_leaf_segment = self.allocator.create_segment(self.space, crate::alloc::SegmentKind::NonLeaf);
        let tree = Arc::new(BTree::open(
            Arc::clone(&self.allocator),
            ParsedPageCache::new(Arc::clone(&self.bpm), PARSED_PAGE_CACHE_CAPACITY),
            self.space,
            index_id,
            row.unique,
            row.root_page_no,
            leaf_segment,
            non_leaf_segment,
            Arc::clone(&self.redo),
            Arc::clone(&self.undo),
            Arc::clone(&self.lock_manager),
            self.lock_timeout,
        ));
        self.trees.lock().insert(index_id, Arc::clone(&tree));
        Ok(tree)
    }

    /// Drop a loaded tree's in-memory handle without touching the
    /// dictionary or its pages. A later [`Self::load`] re-opens it.
    pub fn unload(&self, index_id: IndexId) {
        self.trees.lock().remove(&index_id);
    }

    pub fn drop_index(&self, table_id: TableId, index_id: IndexId) -> Result<()> {
        self.unload(index_id);
        let _ = table_id;
        self.dictionary.drop_index_by_id(index_id)
    }

    pub fn insert(&self, index_id: IndexId, trx_id: TrxId, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.load(index_id)?.insert(trx_id, key, value)
    }

    pub fn search(&self, index_id: IndexId, key: &[u8], view: Option<&ReadView>) -> Result<Vec<u8>> {
        Ok(self.load(index_id)?.search(key, view)?.value)
    }

    pub fn delete(&self, index_id: IndexId, trx_id: TrxId, key: &[u8]) -> Result<()> {
        self.load(index_id)?.delete(trx_id, key)
    }

    pub fn range_search(
        &self,
        index_id: IndexId,
        start: &[u8],
        end: &[u8],
        view: Option<&ReadView>,
    ) -> Result<Vec<KeyValue>> {
        self.load(index_id)?.range_search(start, end, view)
    }

    /// Flush every currently-loaded tree's page cache. Called by
    /// [`StorageManager::flush_all`]/[`StorageManager::close`].
    pub fn flush_all(&self) -> Result<()> {
        for tree in self.trees.lock().values() {
            tree.flush_cache()?;
        }
        Ok(())
    }

    /// Return the loaded tree handle so the caller can open a
    /// [`crate::index::btree::Cursor`] against it -- a cursor borrows its
    /// tree, so it can't outlive a reference this method hands back.
    pub fn tree(&self, index_id: IndexId) -> Result<Arc<BTree>> {
        self.load(index_id)
    }

    fn find_table_for_index(&self, index_id: IndexId) -> Result<TableInfo> {
        // The dictionary doesn't index SYS_INDEXES by table, so this
        // walks every table; fine for the system-catalog scale this
        // engine targets (no user-facing "list tables" hot path yet).
        self.dictionary.find_table_owning_index(index_id)
    }
}
