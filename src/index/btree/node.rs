//! Interior-node encoding and the shared split/promote mechanics used by
//! both leaf and interior levels of the tree.
//!
//! Interior nodes are stored using the same generic key/value record list
//! the leaf level uses (via [`crate::storage::page::PageFields`]): each
//! record's key is a separator and its value is the 4-byte little-endian
//! child page number. Convention (spec §4.E): separator `k` routes keys
//! `≤ k` to its child; the node's last record additionally acts as the
//! catch-all child for any key greater than every stored separator.

use crate::storage::page::UserRecord;

pub fn encode_child_pointer(page_no: u32) -> Vec<u8> {
    page_no.to_le_bytes().to_vec()
}

pub fn decode_child_pointer(value: &[u8]) -> u32 {
    u32::from_le_bytes(value.try_into().expect("child pointer value must be 4 bytes"))
}

/// Choose which child to descend into for `key`, given an interior node's
/// sorted separator records.
pub fn find_child(records: &[UserRecord], key: &[u8]) -> u32 {
    debug_assert!(!records.is_empty(), "interior node with no children");
    let idx = records.partition_point(|r| r.key.as_slice() < key);
    let chosen = if idx < records.len() {
        &records[idx]
    } else {
        records.last().unwrap()
    };
    decode_child_pointer(&chosen.value)
}

/// Build a new separator record.
pub fn separator(key: Vec<u8>, child_page_no: u32) -> UserRecord {
    UserRecord {
        key,
        value: encode_child_pointer(child_page_no),
        trx_id: 0,
        delete_mark: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sep(key: &[u8], child: u32) -> UserRecord {
        separator(key.to_vec(), child)
    }

    #[test]
    fn routes_to_first_separator_ge_key() {
        let records = vec![sep(b"m", 1), sep(b"z", 2)];
        assert_eq!(find_child(&records, b"a"), 1);
        assert_eq!(find_child(&records, b"m"), 1);
    }

    #[test]
    fn routes_past_last_separator_to_last_child() {
        let records = vec![sep(b"m", 1), sep(b"z", 2)];
        assert_eq!(find_child(&records, b"zzz"), 2);
    }
}
