//! External-facing record types for the B+tree engine, distinct from the
//! page codec's [`crate::storage::page::UserRecord`] — these carry the
//! *location* a caller would need (page/slot), not just bytes.

use crate::common::PageId;

/// Result of a successful [`super::btree::tree::BTree::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub page: PageId,
    pub slot: usize,
    pub value: Vec<u8>,
}

/// One key/value pair yielded by a range scan or cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}
