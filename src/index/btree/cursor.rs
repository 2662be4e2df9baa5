//! Bidirectional cursor over one index's leaf-page chain.

use crate::error::Result;
use crate::storage::page::header::NO_PAGE;
use crate::storage::page::PageFields;

use super::record::KeyValue;
use super::tree::BTree;

/// A stateful walk over an index's records. Holds the currently loaded
/// leaf page and a slot into it; stepping past a leaf's edge loads the
/// neighbor via its `NextPage`/`PrevPage` pointer.
pub struct Cursor<'a> {
    tree: &'a BTree,
    page: Option<PageFields>,
    slot: usize,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(tree: &'a BTree) -> Self {
        Self {
            tree,
            page: None,
            slot: 0,
        }
    }

    pub fn seek_first(&mut self) -> Result<Option<KeyValue>> {
        self.page = Some(self.tree.first_leaf_fields()?);
        self.slot = 0;
        Ok(self.current())
    }

    pub fn seek_last(&mut self) -> Result<Option<KeyValue>> {
        let page = self.tree.last_leaf_fields()?;
        self.slot = page.records.len().saturating_sub(1);
        self.page = Some(page);
        Ok(self.current())
    }

    pub fn seek_to(&mut self, key: &[u8]) -> Result<Option<KeyValue>> {
        let page = self.tree.leaf_for_key(key)?;
        self.slot = page.records.partition_point(|r| r.key.as_slice() < key);
        self.page = Some(page);
        Ok(self.current())
    }

    pub fn next(&mut self) -> Result<Option<KeyValue>> {
        loop {
            let page = match &self.page {
                Some(p) => p,
                None => return Ok(None),
            };
            if self.slot + 1 < page.records.len() {
                self.slot += 1;
            } else {
                let next_page_no = page.header.next_page;
                if next_page_no == NO_PAGE {
                    self.page = None;
                    return Ok(None);
                }
                let next_page = self.tree.read_page(next_page_no)?;
                self.page = Some(next_page);
                self.slot = 0;
            }
            if let Some(kv) = self.current() {
                return Ok(Some(kv));
            }
        }
    }

    pub fn prev(&mut self) -> Result<Option<KeyValue>> {
        loop {
            let page = match &self.page {
                Some(p) => p,
                None => return Ok(None),
            };
            if self.slot > 0 {
                self.slot -= 1;
            } else {
                let prev_page_no = page.header.prev_page;
                if prev_page_no == NO_PAGE {
                    self.page = None;
                    return Ok(None);
                }
                let prev_page = self.tree.read_page(prev_page_no)?;
                self.slot = prev_page.records.len().saturating_sub(1);
                self.page = Some(prev_page);
            }
            if let Some(kv) = self.current() {
                return Ok(Some(kv));
            }
        }
    }

    /// `None` for an empty page, an out-of-range slot, or a live-but-
    /// delete-marked record -- matching `BTree::search`/`range_search`,
    /// which both skip tombstones the same way.
    fn current(&self) -> Option<KeyValue> {
        let page = self.page.as_ref()?;
        let rec = page.records.get(self.slot)?;
        if rec.delete_mark {
            return None;
        }
        Some(KeyValue {
            key: rec.key.clone(),
            value: rec.value.clone(),
        })
    }
}
