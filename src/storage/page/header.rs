//! File header, page header, and file trailer field definitions.
//!
//! Byte layout follows the storage core specification's page-format table:
//! File Header (38 B) + Page Header (56 B) + infimum/supremum (26 B) +
//! user records + free space + page directory + File Trailer (8 B), all
//! within one fixed-size 16 KiB page. Offsets below are absolute within the
//! page buffer.

use crate::common::config::PAGE_SIZE;
use crate::common::ids::{PageId, SpaceId};

/// Discriminates the kind of content a page holds. `repr(u16)` to keep the
/// on-disk field a fixed two bytes.
#[repr(u16)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Unrecognized or corrupted page type value.
    #[default]
    Invalid = 0,
    /// Space 0, page 0: the FSP header.
    FspHdr = 1,
    /// Insert-buffer bitmap page.
    IbufBitmap = 2,
    /// INODE page (segment inode array).
    Inode = 3,
    /// Miscellaneous system page.
    Sys = 4,
    /// B+tree interior or leaf page (distinguished by page level == 0).
    Index = 5,
    /// Undo log page.
    UndoLog = 6,
    /// Transaction system page.
    TrxSys = 7,
    /// Allocated but not yet assigned to any purpose.
    Allocated = 8,
}

impl PageType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => PageType::FspHdr,
            2 => PageType::IbufBitmap,
            3 => PageType::Inode,
            4 => PageType::Sys,
            5 => PageType::Index,
            6 => PageType::UndoLog,
            7 => PageType::TrxSys,
            8 => PageType::Allocated,
            _ => PageType::Invalid,
        }
    }
}

/// Sentinel page number meaning "no such page" in prev/next links.
pub const NO_PAGE: u32 = u32::MAX;

/// The 38-byte File Header.
///
/// `checksum` is intentionally excluded from [`PartialEq`]: it is an
/// encode-time-derived value (see [`super::codec::compute_checksum`]), not
/// part of the logical page state a caller constructs.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub checksum: u32,
    pub page_no: u32,
    pub prev_page: u32,
    pub next_page: u32,
    pub lsn: u64,
    pub page_type: PageType,
    pub flush_lsn: u64,
    pub space_id: u32,
}

impl FileHeader {
    pub const SIZE: usize = 38;

    const OFF_CHECKSUM: usize = 0;
    const OFF_PAGE_NO: usize = 4;
    const OFF_PREV_PAGE: usize = 8;
    const OFF_NEXT_PAGE: usize = 12;
    const OFF_LSN: usize = 16;
    const OFF_PAGE_TYPE: usize = 24;
    const OFF_FLUSH_LSN: usize = 26;
    const OFF_SPACE_ID: usize = 34;

    pub fn zeroed() -> Self {
        Self {
            checksum: 0,
            page_no: 0,
            prev_page: NO_PAGE,
            next_page: NO_PAGE,
            lsn: 0,
            page_type: PageType::Invalid,
            flush_lsn: 0,
            space_id: 0,
        }
    }

    /// True if every field still holds its zero/sentinel-free value,
    /// indicating a freshly allocated page whose header has never been
    /// written.
    pub fn is_unset(&self) -> bool {
        self.checksum == 0
            && self.page_no == 0
            && self.lsn == 0
            && self.page_type == PageType::Invalid
            && self.space_id == 0
    }

    pub fn read_from(data: &[u8]) -> Self {
        Self {
            checksum: u32::from_le_bytes(data[Self::OFF_CHECKSUM..][..4].try_into().unwrap()),
            page_no: u32::from_le_bytes(data[Self::OFF_PAGE_NO..][..4].try_into().unwrap()),
            prev_page: u32::from_le_bytes(data[Self::OFF_PREV_PAGE..][..4].try_into().unwrap()),
            next_page: u32::from_le_bytes(data[Self::OFF_NEXT_PAGE..][..4].try_into().unwrap()),
            lsn: u64::from_le_bytes(data[Self::OFF_LSN..][..8].try_into().unwrap()),
            page_type: PageType::from_u16(u16::from_le_bytes(
                data[Self::OFF_PAGE_TYPE..][..2].try_into().unwrap(),
            )),
            flush_lsn: u64::from_le_bytes(data[Self::OFF_FLUSH_LSN..][..8].try_into().unwrap()),
            space_id: u32::from_le_bytes(data[Self::OFF_SPACE_ID..][..4].try_into().unwrap()),
        }
    }

    pub fn write_to(&self, data: &mut [u8]) {
        data[Self::OFF_CHECKSUM..][..4].copy_from_slice(&self.checksum.to_le_bytes());
        data[Self::OFF_PAGE_NO..][..4].copy_from_slice(&self.page_no.to_le_bytes());
        data[Self::OFF_PREV_PAGE..][..4].copy_from_slice(&self.prev_page.to_le_bytes());
        data[Self::OFF_NEXT_PAGE..][..4].copy_from_slice(&self.next_page.to_le_bytes());
        data[Self::OFF_LSN..][..8].copy_from_slice(&self.lsn.to_le_bytes());
        data[Self::OFF_PAGE_TYPE..][..2].copy_from_slice(&(self.page_type as u16).to_le_bytes());
        data[Self::OFF_FLUSH_LSN..][..8].copy_from_slice(&self.flush_lsn.to_le_bytes());
        data[Self::OFF_SPACE_ID..][..4].copy_from_slice(&self.space_id.to_le_bytes());
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(SpaceId::new(self.space_id), self.page_no)
    }

    /// Read the LSN field directly out of raw page bytes, without paying
    /// for a full header decode. Used by the buffer pool to watermark a
    /// frame's last write against the redo log.
    pub fn peek_lsn(data: &[u8]) -> u64 {
        u64::from_le_bytes(data[Self::OFF_LSN..][..8].try_into().unwrap())
    }
}

impl PartialEq for FileHeader {
    fn eq(&self, other: &Self) -> bool {
        self.page_no == other.page_no
            && self.prev_page == other.prev_page
            && self.next_page == other.next_page
            && self.lsn == other.lsn
            && self.page_type == other.page_type
            && self.flush_lsn == other.flush_lsn
            && self.space_id == other.space_id
    }
}

impl Eq for FileHeader {}

/// The 56-byte Page Header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeaderFields {
    /// Number of page-directory slots in use.
    pub slot_count: u16,
    /// Number of user records on this page.
    pub record_count: u16,
    /// Byte offset of the heap top (first free byte after records).
    pub heap_top: u16,
    /// Bytes of reclaimable free space (from deleted records).
    pub free_space_bytes: u16,
    /// Offset of the head of the deleted-records (garbage) list, or 0.
    pub deleted_records_ptr: u16,
    /// Highest transaction id that has modified this page.
    pub max_trx_id: u64,
    /// 0 for leaf pages, > 0 for interior pages (tree height above leaf).
    pub page_level: u16,
    /// Owning index id.
    pub index_id: u64,
    /// Reserved for the leaf/non-leaf segment header fields; opaque to the
    /// codec (owned by the allocator for root pages).
    pub segment_headers: [u8; 8],
}

impl PageHeaderFields {
    pub const SIZE: usize = 56;

    const OFF_SLOT_COUNT: usize = 0;
    const OFF_RECORD_COUNT: usize = 2;
    const OFF_HEAP_TOP: usize = 4;
    const OFF_FREE_SPACE: usize = 6;
    const OFF_DELETED_PTR: usize = 8;
    const OFF_MAX_TRX_ID: usize = 10;
    const OFF_PAGE_LEVEL: usize = 18;
    const OFF_INDEX_ID: usize = 20;
    const OFF_SEGMENT_HEADERS: usize = 28;
    // 28 + 8 = 36; remaining 20 bytes reserved/padding to reach 56 bytes.

    pub fn zeroed() -> Self {
        Self {
            slot_count: 0,
            record_count: 0,
            heap_top: 0,
            free_space_bytes: 0,
            deleted_records_ptr: 0,
            max_trx_id: 0,
            page_level: 0,
            index_id: 0,
            segment_headers: [0u8; 8],
        }
    }

    pub fn read_from(data: &[u8]) -> Self {
        Self {
            slot_count: u16::from_le_bytes(data[Self::OFF_SLOT_COUNT..][..2].try_into().unwrap()),
            record_count: u16::from_le_bytes(
                data[Self::OFF_RECORD_COUNT..][..2].try_into().unwrap(),
            ),
            heap_top: u16::from_le_bytes(data[Self::OFF_HEAP_TOP..][..2].try_into().unwrap()),
            free_space_bytes: u16::from_le_bytes(
                data[Self::OFF_FREE_SPACE..][..2].try_into().unwrap(),
            ),
            deleted_records_ptr: u16::from_le_bytes(
                data[Self::OFF_DELETED_PTR..][..2].try_into().unwrap(),
            ),
            max_trx_id: u64::from_le_bytes(data[Self::OFF_MAX_TRX_ID..][..8].try_into().unwrap()),
            page_level: u16::from_le_bytes(data[Self::OFF_PAGE_LEVEL..][..2].try_into().unwrap()),
            index_id: u64::from_le_bytes(data[Self::OFF_INDEX_ID..][..8].try_into().unwrap()),
            segment_headers: data[Self::OFF_SEGMENT_HEADERS..][..8].try_into().unwrap(),
        }
    }

    pub fn write_to(&self, data: &mut [u8]) {
        data[Self::OFF_SLOT_COUNT..][..2].copy_from_slice(&self.slot_count.to_le_bytes());
        data[Self::OFF_RECORD_COUNT..][..2].copy_from_slice(&self.record_count.to_le_bytes());
        data[Self::OFF_HEAP_TOP..][..2].copy_from_slice(&self.heap_top.to_le_bytes());
        data[Self::OFF_FREE_SPACE..][..2].copy_from_slice(&self.free_space_bytes.to_le_bytes());
        data[Self::OFF_DELETED_PTR..][..2]
            .copy_from_slice(&self.deleted_records_ptr.to_le_bytes());
        data[Self::OFF_MAX_TRX_ID..][..8].copy_from_slice(&self.max_trx_id.to_le_bytes());
        data[Self::OFF_PAGE_LEVEL..][..2].copy_from_slice(&self.page_level.to_le_bytes());
        data[Self::OFF_INDEX_ID..][..8].copy_from_slice(&self.index_id.to_le_bytes());
        data[Self::OFF_SEGMENT_HEADERS..][..8].copy_from_slice(&self.segment_headers);
    }

    pub fn is_leaf(&self) -> bool {
        self.page_level == 0
    }
}

/// Absolute offset at which the File Header begins.
pub const FILE_HEADER_OFFSET: usize = 0;
/// Absolute offset at which the Page Header begins.
pub const PAGE_HEADER_OFFSET: usize = FileHeader::SIZE;
/// Absolute offset at which the infimum sentinel record begins.
///
/// The storage core specification's data model places this at byte 99 —
/// five bytes past the end of File Header + Page Header (94). Those five
/// bytes are reserved padding, mirroring the small header slack real InnoDB
/// pages carry for segment-header alignment.
pub const INFIMUM_OFFSET: usize = 99;
/// Size in bytes of each system sentinel record (infimum or supremum).
pub const SYSTEM_RECORD_SIZE: usize = 13;
/// Absolute offset at which the supremum sentinel record begins.
pub const SUPREMUM_OFFSET: usize = INFIMUM_OFFSET + SYSTEM_RECORD_SIZE;
/// Absolute offset at which user records begin.
pub const USER_RECORDS_OFFSET: usize = SUPREMUM_OFFSET + SYSTEM_RECORD_SIZE;

/// The 8-byte File Trailer, at the very end of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTrailer {
    pub checksum: u32,
    pub lsn_low: u32,
}

impl FileTrailer {
    pub const SIZE: usize = 8;

    pub fn offset() -> usize {
        PAGE_SIZE - Self::SIZE
    }

    pub fn read_from(data: &[u8]) -> Self {
        let off = Self::offset();
        Self {
            checksum: u32::from_le_bytes(data[off..][..4].try_into().unwrap()),
            lsn_low: u32::from_le_bytes(data[off + 4..][..4].try_into().unwrap()),
        }
    }

    pub fn write_to(&self, data: &mut [u8]) {
        let off = Self::offset();
        data[off..][..4].copy_from_slice(&self.checksum.to_le_bytes());
        data[off + 4..][..4].copy_from_slice(&self.lsn_low.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_roundtrip() {
        let header = FileHeader {
            checksum: 0xDEADBEEF,
            page_no: 7,
            prev_page: NO_PAGE,
            next_page: 9,
            lsn: 0x1122334455667788,
            page_type: PageType::Index,
            flush_lsn: 42,
            space_id: 3,
        };
        let mut buf = [0u8; FileHeader::SIZE];
        header.write_to(&mut buf);
        assert_eq!(FileHeader::read_from(&buf), header);
    }

    #[test]
    fn page_header_roundtrip() {
        let header = PageHeaderFields {
            slot_count: 4,
            record_count: 2,
            heap_top: 200,
            free_space_bytes: 50,
            deleted_records_ptr: 0,
            max_trx_id: 99,
            page_level: 0,
            index_id: 55,
            segment_headers: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        let mut buf = [0u8; PageHeaderFields::SIZE];
        header.write_to(&mut buf);
        assert_eq!(PageHeaderFields::read_from(&buf), header);
    }

    #[test]
    fn fresh_header_is_unset() {
        assert!(FileHeader::zeroed().is_unset());
    }

    #[test]
    fn offsets_line_up() {
        assert_eq!(PAGE_HEADER_OFFSET, 38);
        assert_eq!(INFIMUM_OFFSET, 99);
        assert_eq!(SUPREMUM_OFFSET, 112);
        assert_eq!(USER_RECORDS_OFFSET, 125);
    }
}
