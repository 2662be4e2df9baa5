//! Row types for the four system tables and their key/value wire
//! encodings. Keys are big-endian so the tree's bytewise comparator
//! orders them numerically; values use a flat length-prefixed layout in
//! the same spirit as [`crate::redo::RedoRecord`].

use crate::common::ids::{IndexId, TableId};
use crate::error::{Error, Result};

fn encode_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn decode_string(data: &[u8], pos: &mut usize) -> Result<String> {
    if data.len() < *pos + 4 {
        return Err(Error::Corrupt("catalog row: truncated string length".to_string()));
    }
    let len = u32::from_be_bytes(data[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    if data.len() < *pos + len {
        return Err(Error::Corrupt("catalog row: truncated string body".to_string()));
    }
    let s = String::from_utf8(data[*pos..*pos + len].to_vec())
        .map_err(|e| Error::Corrupt(format!("catalog row: {e}")))?;
    *pos += len;
    Ok(s)
}

/// One row of `SYS_TABLES`: keyed by `table_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub table_id: TableId,
    pub name: String,
    pub space_id: u32,
}

impl TableRow {
    pub fn key(table_id: TableId) -> Vec<u8> {
        table_id.0.to_be_bytes().to_vec()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.space_id.to_be_bytes());
        encode_string(&mut buf, &self.name);
        buf
    }

    pub fn decode(table_id: TableId, data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corrupt("SYS_TABLES row truncated".to_string()));
        }
        let space_id = u32::from_be_bytes(data[0..4].try_into().unwrap());
        let mut pos = 4;
        let name = decode_string(data, &mut pos)?;
        Ok(Self { table_id, name, space_id })
    }
}

/// One row of `SYS_COLUMNS`: keyed by `(table_id, ordinal)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub table_id: TableId,
    pub ordinal: u32,
    pub name: String,
    pub type_code: u8,
}

impl ColumnRow {
    pub fn key(table_id: TableId, ordinal: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&table_id.0.to_be_bytes());
        buf.extend_from_slice(&ordinal.to_be_bytes());
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.type_code];
        encode_string(&mut buf, &self.name);
        buf
    }

    pub fn decode(table_id: TableId, ordinal: u32, data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Corrupt("SYS_COLUMNS row truncated".to_string()));
        }
        let type_code = data[0];
        let mut pos = 1;
        let name = decode_string(data, &mut pos)?;
        Ok(Self { table_id, ordinal, name, type_code })
    }
}

/// One row of `SYS_INDEXES`: keyed by `index_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub index_id: IndexId,
    pub table_id: TableId,
    pub name: String,
    pub root_page_no: u32,
    pub unique: bool,
}

impl IndexRow {
    pub fn key(index_id: IndexId) -> Vec<u8> {
        index_id.0.to_be_bytes().to_vec()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.table_id.0.to_be_bytes());
        buf.extend_from_slice(&self.root_page_no.to_be_bytes());
        buf.push(self.unique as u8);
        encode_string(&mut buf, &self.name);
        buf
    }

    pub fn decode(index_id: IndexId, data: &[u8]) -> Result<Self> {
        if data.len() < 13 {
            return Err(Error::Corrupt("SYS_INDEXES row truncated".to_string()));
        }
        let table_id = TableId(u64::from_be_bytes(data[0..8].try_into().unwrap()));
        let root_page_no = u32::from_be_bytes(data[8..12].try_into().unwrap());
        let unique = data[12] != 0;
        let mut pos = 13;
        let name = decode_string(data, &mut pos)?;
        Ok(Self { index_id, table_id, name, root_page_no, unique })
    }
}

/// One row of `SYS_FIELDS`: keyed by `(index_id, ordinal)`, naming which
/// column ordinal within the owning table occupies that field position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub index_id: IndexId,
    pub ordinal: u32,
    pub column_ordinal: u32,
}

impl FieldRow {
    pub fn key(index_id: IndexId, ordinal: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&index_id.0.to_be_bytes());
        buf.extend_from_slice(&ordinal.to_be_bytes());
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        self.column_ordinal.to_be_bytes().to_vec()
    }

    pub fn decode(index_id: IndexId, ordinal: u32, data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corrupt("SYS_FIELDS row truncated".to_string()));
        }
        let column_ordinal = u32::from_be_bytes(data[0..4].try_into().unwrap());
        Ok(Self { index_id, ordinal, column_ordinal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_row_roundtrips() {
        let row = TableRow { table_id: TableId(9), name: "orders".to_string(), space_id: 3 };
        let decoded = TableRow::decode(TableId(9), &row.encode()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn index_row_roundtrips() {
        let row = IndexRow {
            index_id: IndexId(4),
            table_id: TableId(9),
            name: "PRIMARY".to_string(),
            root_page_no: 42,
            unique: true,
        };
        let decoded = IndexRow::decode(IndexId(4), &row.encode()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn table_key_orders_numerically() {
        assert!(TableRow::key(TableId(2)) < TableRow::key(TableId(300)));
    }
}
