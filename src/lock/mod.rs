//! Lock table: S/X locking over caller-defined resources, with FIFO-fair
//! granting and background deadlock detection (spec §4.H).

mod manager;
mod types;

pub use manager::LockManager;
pub use types::{LockMode, ResourceId};
