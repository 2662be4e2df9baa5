//! Tablespace / file layer — maps `(space_id, page_no)` to file offsets in
//! on-disk `.ibd`/`ibdata1` files.
//!
//! Grounded on the teacher's `DiskManager`: single-threaded file I/O behind
//! a mutex (owned by the caller — here, [`Tablespace`] is wrapped in a
//! `parking_lot::Mutex` by [`TablespaceRegistry`] and, one level up, by the
//! buffer pool), `fsync` after every write for durability, page count
//! tracked from file length on open.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::common::config::PAGE_SIZE;
use crate::common::ids::{ExtentId, PageId, SpaceId};
use crate::error::{Error, Result};
use crate::storage::page::header::{FileHeader, FILE_HEADER_OFFSET};
use crate::storage::page::Page;

/// Tag describing what an extent within a tablespace is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentPurpose {
    Data,
    Index,
    System,
    Rollback,
}

#[derive(Debug, Clone, Copy)]
struct ExtentEntry {
    purpose: ExtentPurpose,
    free: bool,
}

/// One open tablespace file.
pub struct Tablespace {
    id: SpaceId,
    name: String,
    file: File,
    page_count: u32,
    extents: Vec<ExtentEntry>,
}

impl Tablespace {
    /// Create a brand-new tablespace file. Fails if the file already
    /// exists.
    pub fn create<P: AsRef<Path>>(id: SpaceId, name: &str, path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self {
            id,
            name: name.to_string(),
            file,
            page_count: 0,
            extents: Vec::new(),
        })
    }

    /// Open an existing tablespace file, recomputing its page count (and
    /// extent bookkeeping) from the file's length.
    pub fn open<P: AsRef<Path>>(id: SpaceId, name: &str, path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let page_count = (len / PAGE_SIZE as u64) as u32;
        let extent_count = page_count.div_ceil(crate::common::config::PAGES_PER_EXTENT) as usize;
        let extents = vec![
            ExtentEntry {
                purpose: ExtentPurpose::Data,
                free: false,
            };
            extent_count
        ];
        Ok(Self {
            id,
            name: name.to_string(),
            file,
            page_count,
            extents,
        })
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Read one page from disk.
    pub fn read_page(&mut self, page_no: u32) -> Result<Page> {
        if page_no >= self.page_count {
            return Err(Error::PageNotFound(PageId::new(self.id, page_no)));
        }
        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;
        Ok(page)
    }

    /// Write one page to disk, fsyncing for durability. The page must
    /// already have been allocated (its page_no < page_count).
    pub fn write_page(&mut self, page_no: u32, page: &Page) -> Result<()> {
        if page_no >= self.page_count {
            return Err(Error::PageNotFound(PageId::new(self.id, page_no)));
        }
        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Extend the file by one zeroed page and return its page number.
    /// Used internally when growing into a freshly allocated extent.
    fn extend_one_page(&mut self) -> Result<u32> {
        let page_no = self.page_count;
        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.file.sync_all()?;
        self.page_count += 1;
        Ok(page_no)
    }

    /// Allocate a new 64-page extent for the given purpose, growing the
    /// file if necessary. Returns the new extent's id.
    pub fn allocate_extent(&mut self, purpose: ExtentPurpose) -> Result<ExtentId> {
        // Prefer reusing a freed extent slot of any purpose before
        // growing the file (extents are reassignable once emptied).
        if let Some(idx) = self.extents.iter().position(|e| e.free) {
            self.extents[idx] = ExtentEntry {
                purpose,
                free: false,
            };
            return Ok(ExtentId::new(idx as u32));
        }

        let extent_id = ExtentId::new(self.extents.len() as u32);
        for _ in 0..crate::common::config::PAGES_PER_EXTENT {
            self.extend_one_page()?;
        }
        self.extents.push(ExtentEntry {
            purpose,
            free: false,
        });
        Ok(extent_id)
    }

    /// Mark an extent as free, returning it to the space's free list for
    /// reuse by a future `allocate_extent`.
    pub fn free_extent(&mut self, extent_id: ExtentId) -> Result<()> {
        let idx = extent_id.0 as usize;
        let entry = self
            .extents
            .get_mut(idx)
            .ok_or_else(|| Error::NotFound(format!("extent {:?} in {}", extent_id, self.name)))?;
        entry.free = true;
        Ok(())
    }

    pub fn extent_purpose(&self, extent_id: ExtentId) -> Option<ExtentPurpose> {
        self.extents.get(extent_id.0 as usize).map(|e| e.purpose)
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }
}

/// Registry of open tablespaces, keyed by id and by name. Owns the data
/// directory layout described in the storage core spec's external
/// interfaces (`ibdata1`, `<schema>/<table>.ibd`).
pub struct TablespaceRegistry {
    data_dir: PathBuf,
    spaces: Mutex<HashMap<SpaceId, Tablespace>>,
    names: Mutex<HashMap<String, SpaceId>>,
    next_user_space_id: Mutex<u32>,
}

/// User tablespace ids start here; ids below are reserved for the system
/// tablespace and fixed system schemas.
const FIRST_USER_SPACE_ID: u32 = 1;

impl TablespaceRegistry {
    /// Open (creating if absent) the shared system tablespace and prepare
    /// an empty registry for user tablespaces. Does not scan the data
    /// directory for existing `.ibd` files — call [`Self::discover`] for
    /// that once the dictionary is ready to assign stable ids to what is
    /// found.
    pub fn open(data_dir: &Path, system_file_name: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let system_path = data_dir.join(system_file_name);
        let system = if system_path.exists() {
            Tablespace::open(SpaceId::SYSTEM, "ibdata1", &system_path)?
        } else {
            Tablespace::create(SpaceId::SYSTEM, "ibdata1", &system_path)?
        };

        let mut spaces = HashMap::new();
        let mut names = HashMap::new();
        names.insert("ibdata1".to_string(), SpaceId::SYSTEM);
        spaces.insert(SpaceId::SYSTEM, system);

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            spaces: Mutex::new(spaces),
            names: Mutex::new(names),
            next_user_space_id: Mutex::new(FIRST_USER_SPACE_ID),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create a new user tablespace with a stable, ascending id.
    pub fn create_tablespace(&self, name: &str) -> Result<SpaceId> {
        {
            let names = self.names.lock();
            if names.contains_key(name) {
                return Err(Error::TablespaceExists(name.to_string()));
            }
        }
        let id = {
            let mut next = self.next_user_space_id.lock();
            let id = SpaceId::new(*next);
            *next += 1;
            id
        };
        let path = self.data_dir.join(format!("{}.ibd", name));
        let space = Tablespace::create(id, name, &path)?;

        self.spaces.lock().insert(id, space);
        self.names.lock().insert(name.to_string(), id);
        Ok(id)
    }

    /// Scan the data directory for `<name>.ibd` files not already open in
    /// this registry, and attach each one using the space id recorded in
    /// its own File Header (not a freshly minted one — reattaching under
    /// the wrong id would orphan every page already written under the
    /// old one). Advances the user-space id counter past the highest id
    /// found, so a later [`Self::create_tablespace`] can't collide with
    /// one just discovered. Returns the ids of every tablespace attached.
    pub fn discover(&self) -> Result<Vec<SpaceId>> {
        let mut attached = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ibd") {
                continue;
            }
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if self.names.lock().contains_key(&name) {
                continue;
            }

            let mut file = File::open(&path)?;
            let mut first_page = vec![0u8; PAGE_SIZE];
            file.read_exact(&mut first_page)?;
            let header = FileHeader::read_from(&first_page[FILE_HEADER_OFFSET..]);
            let id = SpaceId::new(header.space_id);

            let space = Tablespace::open(id, &name, &path)?;
            self.spaces.lock().insert(id, space);
            self.names.lock().insert(name, id);
            let mut next = self.next_user_space_id.lock();
            *next = (*next).max(id.0 + 1);
            attached.push(id);
        }
        Ok(attached)
    }

    /// Look up a tablespace id by name.
    pub fn space_id_for_name(&self, name: &str) -> Result<SpaceId> {
        self.names
            .lock()
            .get(name)
            .copied()
            .ok_or_else(|| Error::TablespaceNotFound(name.to_string()))
    }

    /// Run `f` with exclusive access to the tablespace identified by
    /// `id`. Kept as a closure-scoped borrow (rather than returning a
    /// guard type) to keep the registry's internal locking invisible to
    /// callers, mirroring the teacher's single `disk_manager: Mutex<_>`
    /// field on the buffer pool.
    pub fn with_space<R>(&self, id: SpaceId, f: impl FnOnce(&mut Tablespace) -> Result<R>) -> Result<R> {
        let mut spaces = self.spaces.lock();
        let space = spaces
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("tablespace {}", id)))?;
        f(space)
    }

    /// Drop (remove and delete from disk) a user tablespace. The system
    /// tablespace cannot be dropped.
    pub fn drop_tablespace(&self, id: SpaceId) -> Result<()> {
        if id == SpaceId::SYSTEM {
            return Err(Error::Corrupt("cannot drop the system tablespace".into()));
        }
        let mut spaces = self.spaces.lock();
        let space = spaces
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("tablespace {}", id)))?;
        let mut names = self.names.lock();
        names.remove(space.name());
        let path = self.data_dir.join(format!("{}.ibd", space.name()));
        drop(space);
        let _ = std::fs::remove_file(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_and_reopen_system_space() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        assert_eq!(
            registry.space_id_for_name("ibdata1").unwrap(),
            SpaceId::SYSTEM
        );
    }

    #[test]
    fn create_tablespace_assigns_ascending_ids() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        let a = registry.create_tablespace("t1").unwrap();
        let b = registry.create_tablespace("t2").unwrap();
        assert!(b.0 > a.0);
        assert!(a.0 >= FIRST_USER_SPACE_ID);
    }

    #[test]
    fn duplicate_create_fails() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        registry.create_tablespace("t1").unwrap();
        assert!(matches!(
            registry.create_tablespace("t1"),
            Err(Error::TablespaceExists(_))
        ));
    }

    #[test]
    fn allocate_extent_grows_file() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        let id = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(id, |space| {
                let extent = space.allocate_extent(ExtentPurpose::Index)?;
                assert_eq!(extent.0, 0);
                assert_eq!(space.page_count(), crate::common::config::PAGES_PER_EXTENT);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn free_extent_is_reused() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        let id = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(id, |space| {
                let e1 = space.allocate_extent(ExtentPurpose::Data)?;
                space.free_extent(e1)?;
                let e2 = space.allocate_extent(ExtentPurpose::Index)?;
                assert_eq!(e1, e2);
                assert_eq!(space.page_count(), crate::common::config::PAGES_PER_EXTENT);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn write_and_read_page_roundtrip() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        let id = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(id, |space| {
                space.allocate_extent(ExtentPurpose::Data)?;
                let mut page = Page::new();
                page.as_mut_slice()[0] = 0xAB;
                space.write_page(0, &page)?;
                let read = space.read_page(0)?;
                assert_eq!(read.as_slice()[0], 0xAB);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn drop_tablespace_removes_file() {
        let dir = tempdir().unwrap();
        let registry = TablespaceRegistry::open(dir.path(), "ibdata1").unwrap();
        let id = registry.create_tablespace("t1").unwrap();
        let path = dir.path().join("t1.ibd");
        assert!(path.exists());
        registry.drop_tablespace(id).unwrap();
        assert!(!path.exists());
        assert!(registry.space_id_for_name("t1").is_err());
    }
}
