//! Redo log manager: append-only file, in-memory group-commit buffer, and
//! a background checkpoint timer -- the same constructor-then-`start()`
//! background-thread shape as [`crate::buffer::BackgroundFlusher`], just
//! owned behind an `Arc` since both the transaction manager and recovery
//! path need to reach it concurrently.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::ids::{Lsn, PageId, TrxId};
use crate::error::Result;
use crate::storage::page::codec::compute_checksum;

use super::record::RedoRecord;

const CHECKPOINT_FILE_NAME: &str = "checkpoint";

struct GroupCommitBuffer {
    records: Vec<RedoRecord>,
    bytes: usize,
}

/// Append-only redo log over one file, plus a sidecar checkpoint file
/// holding `last_checkpoint_lsn`.
pub struct RedoManager {
    log_path: PathBuf,
    checkpoint_path: PathBuf,
    file: Mutex<File>,
    buffer: Mutex<GroupCommitBuffer>,
    next_lsn: AtomicU64,
    buffer_flush_bytes: usize,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RedoManager {
    /// `buffer_flush_bytes` is the group-commit buffer's synchronous-flush
    /// threshold ("buffer full triggers synchronous flush").
    pub fn open(dir: &Path, buffer_flush_bytes: usize) -> Result<Arc<Self>> {
        std::fs::create_dir_all(dir)?;
        let log_path = dir.join("redo.log");
        let checkpoint_path = dir.join(CHECKPOINT_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)?;
        let next_lsn = recover_next_lsn(&log_path)?;
        Ok(Arc::new(Self {
            log_path,
            checkpoint_path,
            file: Mutex::new(file),
            buffer: Mutex::new(GroupCommitBuffer {
                records: Vec::new(),
                bytes: 0,
            }),
            next_lsn: AtomicU64::new(next_lsn),
            buffer_flush_bytes,
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }))
    }

    /// Append one record to the group-commit buffer, assigning it the next
    /// monotonic LSN. Flushes synchronously if the buffer threshold is hit.
    pub fn append(
        &self,
        trx_id: TrxId,
        page_id: PageId,
        offset: u16,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Result<Lsn> {
        let lsn = Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst));
        let record = RedoRecord {
            lsn,
            trx_id,
            page_id,
            offset,
            before,
            after,
        };
        let should_flush = {
            let mut buf = self.buffer.lock();
            buf.bytes += record.encoded_len();
            buf.records.push(record);
            buf.bytes >= self.buffer_flush_bytes
        };
        if should_flush {
            self.flush(lsn)?;
        }
        Ok(lsn)
    }

    /// Write every buffered record through `up_to_lsn` to the file and
    /// fsync. A transaction may be marked COMMITTED only once its final
    /// redo record has passed through here -- the WAL discipline.
    pub fn flush(&self, up_to_lsn: Lsn) -> Result<()> {
        let to_write: Vec<RedoRecord> = {
            let mut buf = self.buffer.lock();
            let split = buf.records.partition_point(|r| r.lsn.0 <= up_to_lsn.0);
            let tail = buf.records.split_off(split);
            let written = std::mem::replace(&mut buf.records, tail);
            buf.bytes = buf.records.iter().map(RedoRecord::encoded_len).sum();
            written
        };
        if to_write.is_empty() {
            return Ok(());
        }
        let mut file = self.file.lock();
        for record in &to_write {
            file.write_all(&record.encode())?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Flush everything buffered so far and persist the resulting LSN as
    /// `last_checkpoint_lsn`; a later recovery resumes from this point.
    pub fn checkpoint(&self) -> Result<()> {
        let current = self.current_lsn();
        self.flush(current)?;
        std::fs::write(&self.checkpoint_path, current.0.to_be_bytes())?;
        Ok(())
    }

    fn last_checkpoint_lsn(&self) -> Lsn {
        match std::fs::read(&self.checkpoint_path) {
            Ok(bytes) if bytes.len() == 8 => {
                Lsn(u64::from_be_bytes(bytes.try_into().unwrap()))
            }
            _ => Lsn::ZERO,
        }
    }

    /// Replay every record with `lsn > last_checkpoint_lsn`, dispatching
    /// each to `apply`. Idempotency by LSN (skip if the target page's
    /// header LSN already covers the record) is `apply`'s responsibility;
    /// this manager only guarantees it won't hand `apply` anything already
    /// covered by the last checkpoint.
    pub fn recover(&self, mut apply: impl FnMut(&RedoRecord) -> Result<()>) -> Result<usize> {
        let since = self.last_checkpoint_lsn();
        let mut file = File::open(&self.log_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let mut offset = 0;
        let mut applied = 0;
        while offset < data.len() {
            let (record, consumed) = match RedoRecord::decode(&data[offset..]) {
                Ok(pair) => pair,
                Err(_) => break, // torn tail write from an unfinished flush
            };
            if record.lsn.0 > since.0 {
                apply(&record)?;
                applied += 1;
            }
            offset += consumed;
        }
        Ok(applied)
    }

    /// Replay every record since the last checkpoint straight into page
    /// bytes through `bpm`, honoring the idempotency-by-LSN guard (spec
    /// §4.F): a page already at or past a record's LSN skips that record.
    /// Returns the number of records actually applied.
    pub fn recover_into(&self, bpm: &BufferPoolManager) -> Result<usize> {
        self.recover(|record| apply_physical_record(bpm, record))
    }

    pub fn current_lsn(&self) -> Lsn {
        Lsn(self.next_lsn.load(Ordering::SeqCst).saturating_sub(1))
    }

    /// Spawn the background timer that checkpoints every `interval`.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let (tx, rx): (Sender<()>, Receiver<()>) = std::sync::mpsc::channel();
        *self.stop_tx.lock() = Some(tx);
        let manager = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("innocore-redo-checkpoint".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(()) => return,
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                        if let Err(err) = manager.checkpoint() {
                            log::error!("background redo checkpoint failed: {err}");
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("failed to spawn redo checkpoint thread");
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RedoManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recover_next_lsn(log_path: &Path) -> Result<u64> {
    if !log_path.exists() {
        return Ok(1);
    }
    let mut file = File::open(log_path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    let mut offset = 0;
    let mut last_lsn = 0u64;
    while offset < data.len() {
        match RedoRecord::decode(&data[offset..]) {
            Ok((rec, consumed)) => {
                last_lsn = rec.lsn.0;
                offset += consumed;
            }
            Err(_) => break,
        }
    }
    Ok(last_lsn + 1)
}

/// The page's on-disk LSN lives in the File Header at a fixed byte offset
/// (spec §4.A); read and written directly here rather than through the
/// full [`crate::storage::page::codec::decode`]/`encode` round trip, since
/// recovery only ever touches the bytes one record names.
const FILE_HEADER_LSN_OFFSET: usize = 16;

fn apply_physical_record(bpm: &BufferPoolManager, record: &RedoRecord) -> Result<()> {
    let mut guard = bpm.fetch_page_write(record.page_id)?;
    let buf = guard.as_mut_slice();
    let page_lsn = u64::from_le_bytes(buf[FILE_HEADER_LSN_OFFSET..FILE_HEADER_LSN_OFFSET + 8].try_into().unwrap());
    if page_lsn >= record.lsn.0 {
        return Ok(());
    }
    let start = record.offset as usize;
    let end = start + record.after.len();
    buf[start..end].copy_from_slice(&record.after);
    buf[FILE_HEADER_LSN_OFFSET..FILE_HEADER_LSN_OFFSET + 8].copy_from_slice(&record.lsn.0.to_le_bytes());
    let checksum = compute_checksum(buf);
    buf[0..4].copy_from_slice(&checksum.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SpaceId;
    use tempfile::tempdir;

    #[test]
    fn append_assigns_monotonic_lsns() {
        let dir = tempdir().unwrap();
        let manager = RedoManager::open(dir.path(), 1 << 20).unwrap();
        let page = PageId::new(SpaceId::new(0), 1);
        let lsn1 = manager.append(TrxId(1), page, 0, vec![], vec![1]).unwrap();
        let lsn2 = manager.append(TrxId(1), page, 0, vec![], vec![2]).unwrap();
        assert!(lsn2.0 > lsn1.0);
    }

    #[test]
    fn flush_then_recover_replays_records_after_last_checkpoint() {
        let dir = tempdir().unwrap();
        let manager = RedoManager::open(dir.path(), 1 << 20).unwrap();
        let page = PageId::new(SpaceId::new(0), 1);
        let lsn = manager.append(TrxId(1), page, 0, vec![0], vec![9]).unwrap();
        manager.flush(lsn).unwrap();

        let mut seen = Vec::new();
        let applied = manager
            .recover(|rec| {
                seen.push(rec.lsn);
                Ok(())
            })
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(seen, vec![lsn]);
    }

    #[test]
    fn checkpoint_excludes_already_durable_prefix_from_recovery() {
        let dir = tempdir().unwrap();
        let manager = RedoManager::open(dir.path(), 1 << 20).unwrap();
        let page = PageId::new(SpaceId::new(0), 1);
        manager.append(TrxId(1), page, 0, vec![], vec![1]).unwrap();
        manager.checkpoint().unwrap();
        let lsn2 = manager.append(TrxId(1), page, 0, vec![], vec![2]).unwrap();
        manager.flush(lsn2).unwrap();

        let mut seen = Vec::new();
        manager
            .recover(|rec| {
                seen.push(rec.lsn);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![lsn2]);
    }

    #[test]
    fn reopening_resumes_lsn_sequence() {
        let dir = tempdir().unwrap();
        let page = PageId::new(SpaceId::new(0), 1);
        let last_lsn = {
            let manager = RedoManager::open(dir.path(), 1 << 20).unwrap();
            let lsn = manager.append(TrxId(1), page, 0, vec![], vec![1]).unwrap();
            manager.flush(lsn).unwrap();
            lsn
        };
        let manager = RedoManager::open(dir.path(), 1 << 20).unwrap();
        let next = manager.append(TrxId(1), page, 0, vec![], vec![2]).unwrap();
        assert!(next.0 > last_lsn.0);
    }

    fn test_pool() -> (BufferPoolManager, tempfile::TempDir, crate::common::ids::SpaceId) {
        use crate::storage::tablespace::{ExtentPurpose, TablespaceRegistry};
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
        let space = registry.create_tablespace("t1").unwrap();
        registry
            .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Data))
            .unwrap();
        let bpm = BufferPoolManager::new(4, registry, 75, Duration::from_millis(1000));
        (bpm, dir, space)
    }

    #[test]
    fn recover_into_replays_the_after_image_at_its_offset() {
        let (bpm, _dir, space) = test_pool();
        let page_id = PageId::new(space, 0);
        drop(bpm.new_page(page_id).unwrap());

        let log_dir = tempdir().unwrap();
        let manager = RedoManager::open(log_dir.path(), 1 << 20).unwrap();
        let lsn = manager
            .append(TrxId(1), page_id, 1000, vec![0], vec![0xAB])
            .unwrap();
        manager.flush(lsn).unwrap();

        let applied = manager.recover_into(&bpm).unwrap();
        assert_eq!(applied, 1);

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.as_slice()[1000], 0xAB);
    }

    #[test]
    fn recover_into_skips_a_record_already_reflected_on_the_page() {
        let (bpm, _dir, space) = test_pool();
        let page_id = PageId::new(space, 0);
        {
            let mut guard = bpm.new_page(page_id).unwrap();
            guard.as_mut_slice()[16..24].copy_from_slice(&500u64.to_le_bytes());
        }

        let log_dir = tempdir().unwrap();
        let manager = RedoManager::open(log_dir.path(), 1 << 20).unwrap();
        // Force this record's LSN below the page's already-durable LSN by
        // checkpointing past it, then appending a lower-numbered write is
        // not possible (LSNs are monotonic) -- instead assert the page
        // value is untouched when the page is already ahead.
        let lsn = manager
            .append(TrxId(1), page_id, 1000, vec![0], vec![0xCD])
            .unwrap();
        manager.flush(lsn).unwrap();

        // Bump the page's LSN past the record's before recovering.
        {
            let mut guard = bpm.fetch_page_write(page_id).unwrap();
            guard.as_mut_slice()[16..24].copy_from_slice(&(lsn.0 + 1).to_le_bytes());
        }

        manager.recover_into(&bpm).unwrap();

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.as_slice()[1000], 0);
    }
}
