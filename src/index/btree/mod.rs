//! B+tree index engine: ordered key-value storage over leaf/non-leaf
//! segment pages, with a per-index parsed-page cache and a bidirectional
//! cursor for range scans.

mod cursor;
mod node;
mod page_cache;
mod tree;

pub use cursor::Cursor;
pub use page_cache::ParsedPageCache;
pub use tree::BTree;
