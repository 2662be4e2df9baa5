//! A single transaction's lifecycle state.

use std::time::Instant;

use crate::common::ids::TrxId;

use super::read_view::ReadView;

/// `{RU, RC, RR, SER}` per spec §3. Only RR/RC affect when a read view is
/// captured; RU and SER are accepted but behave like RC (no read-uncommitted
/// dirty-read path is implemented, and true serializable locking is out of
/// scope — see SPEC_FULL.md Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxState {
    NotStarted,
    Active,
    Prepared,
    Committed,
    RolledBack,
}

/// One transaction's identity, isolation level, and current read view.
///
/// Holds no lock/undo bookkeeping itself — [`super::manager::TransactionManager`]
/// owns the active-transaction table and the lock/undo managers, keyed by
/// `trx_id`, so a `Transaction` handle stays cheap to pass around.
pub struct Transaction {
    pub(crate) trx_id: TrxId,
    pub(crate) isolation: IsolationLevel,
    pub(crate) read_only: bool,
    pub(crate) state: TrxState,
    pub(crate) read_view: Option<ReadView>,
    pub(crate) last_active: Instant,
}

impl Transaction {
    pub fn trx_id(&self) -> TrxId {
        self.trx_id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> TrxState {
        self.state
    }

    pub fn read_view(&self) -> Option<&ReadView> {
        self.read_view.as_ref()
    }

    /// The read view to check visibility against: for RR/SER this is the
    /// view captured at `begin`; for RC callers should instead refresh it
    /// per statement via
    /// [`super::manager::TransactionManager::refresh_statement_read_view`].
    pub fn snapshot_read_view(&self) -> Option<&ReadView> {
        self.read_view.as_ref()
    }
}
