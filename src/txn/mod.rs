//! Transaction lifecycle and MVCC visibility (spec §4.I, §4.J).

mod manager;
mod read_view;
mod transaction;

pub use manager::TransactionManager;
pub use read_view::ReadView;
pub use transaction::{IsolationLevel, Transaction, TrxState};
