//! The data dictionary: persistent table/column/index metadata backed by
//! system B+trees rooted at the system tablespace (spec §4.K).

mod catalog;
mod dictionary;

pub use catalog::{ColumnRow, FieldRow, IndexRow, TableRow};
pub use dictionary::{Dictionary, IndexDef, TableDef, TableInfo};
