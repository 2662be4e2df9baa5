//! Wire format for one redo log record.
//!
//! Serialization is big-endian, per the storage core spec's note that
//! redo records are "big-endian for portability" -- unlike the page
//! codec's little-endian layout, since the two never share a buffer.

use crate::common::ids::{Lsn, PageId, SpaceId, TrxId};
use crate::error::{Error, Result};

/// One physical redo record: "write `after` at `offset` within `page_id`".
/// Generic over the kind of in-page mutation, so the manager needs no
/// per-operation case -- every B+tree/allocator mutation that wants
/// durability produces one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedoRecord {
    pub lsn: Lsn,
    pub trx_id: TrxId,
    pub page_id: PageId,
    pub offset: u16,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl RedoRecord {
    /// lsn(8) + trx_id(8) + space(4) + page_no(4) + offset(2) + before_len(4) + after_len(4)
    const HEADER_LEN: usize = 34;

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.before.len() + self.after.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.lsn.0.to_be_bytes());
        buf.extend_from_slice(&self.trx_id.0.to_be_bytes());
        buf.extend_from_slice(&self.page_id.space.0.to_be_bytes());
        buf.extend_from_slice(&self.page_id.page_no.to_be_bytes());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&(self.before.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(self.after.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.before);
        buf.extend_from_slice(&self.after);
        buf
    }

    /// Decode one record starting at `data[0]`, returning it plus the
    /// number of bytes it consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < Self::HEADER_LEN {
            return Err(Error::Corrupt("redo record header truncated".to_string()));
        }
        let lsn = Lsn(u64::from_be_bytes(data[0..8].try_into().unwrap()));
        let trx_id = TrxId(u64::from_be_bytes(data[8..16].try_into().unwrap()));
        let space = SpaceId::new(u32::from_be_bytes(data[16..20].try_into().unwrap()));
        let page_no = u32::from_be_bytes(data[20..24].try_into().unwrap());
        let offset = u16::from_be_bytes(data[24..26].try_into().unwrap());
        let before_len = u32::from_be_bytes(data[26..30].try_into().unwrap()) as usize;
        let after_len = u32::from_be_bytes(data[30..34].try_into().unwrap()) as usize;
        let total = Self::HEADER_LEN + before_len + after_len;
        if data.len() < total {
            return Err(Error::Corrupt("redo record payload truncated".to_string()));
        }
        let before = data[Self::HEADER_LEN..Self::HEADER_LEN + before_len].to_vec();
        let after = data[Self::HEADER_LEN + before_len..total].to_vec();
        Ok((
            Self {
                lsn,
                trx_id,
                page_id: PageId::new(space, page_no),
                offset,
                before,
                after,
            },
            total,
        ))
    }
}
