//! [`Page`] — the fixed 16 KiB unit of I/O and cache residency.

use crate::common::config::PAGE_SIZE;

/// A raw page buffer, 16 KiB and 16 KiB-aligned.
///
/// `Page` is the unit the buffer pool, tablespace layer, and page codec all
/// agree on. It carries no structure of its own — [`super::codec`] imposes
/// the file header / page header / records / trailer layout on top of it.
///
/// `Page` does not implement `Clone` outside tests: copying 16 KiB should
/// always be an explicit, visible decision in production code paths.
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    pub fn from_bytes(bytes: [u8; PAGE_SIZE]) -> Self {
        Self { data: bytes }
    }

    pub fn into_bytes(self) -> [u8; PAGE_SIZE] {
        self.data
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}
