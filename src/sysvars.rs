//! System variables: a flat in-memory key/value store for the
//! `innodb_*` knobs a running engine exposes for inspection and tuning
//! (spec §6). Persistence across restarts is explicitly out of scope —
//! callers seed this from [`crate::common::config::StorageEngineConfig`]
//! at startup.

use std::collections::HashMap;

use parking_lot::RwLock;

/// A system variable's value. Kept as a small closed enum rather than a
/// bare string so callers get typed reads without parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum SysVarValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl SysVarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SysVarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SysVarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SysVarValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Flat map of variable name to value, guarded by one `RwLock` since
/// reads (status queries) vastly outnumber writes (tuning changes).
pub struct SystemVariablesStore {
    vars: RwLock<HashMap<String, SysVarValue>>,
}

impl SystemVariablesStore {
    pub fn new() -> Self {
        Self { vars: RwLock::new(HashMap::new()) }
    }

    /// Seed the store from a loaded engine configuration. Called once at
    /// startup; later changes go through [`Self::set`].
    pub fn from_config(config: &crate::common::config::StorageEngineConfig) -> Self {
        let store = Self::new();
        {
            let mut vars = store.vars.write();
            vars.insert(
                "innodb_buffer_pool_size".to_string(),
                SysVarValue::Int(config.innodb_buffer_pool_size_bytes as i64),
            );
            vars.insert(
                "innodb_log_file_size".to_string(),
                SysVarValue::Int(config.innodb_log_file_size as i64),
            );
            vars.insert(
                "innodb_file_per_table".to_string(),
                SysVarValue::Bool(config.innodb_file_per_table),
            );
            vars.insert(
                "innodb_flush_log_at_trx_commit".to_string(),
                SysVarValue::Int(config.innodb_flush_log_at_trx_commit as i64),
            );
            vars.insert(
                "lock_wait_timeout".to_string(),
                SysVarValue::Int(config.lock_wait_timeout_ms as i64),
            );
        }
        store
    }

    pub fn get(&self, name: &str) -> Option<SysVarValue> {
        self.vars.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: SysVarValue) {
        self.vars.write().insert(name.into(), value);
    }

    pub fn snapshot(&self) -> HashMap<String, SysVarValue> {
        self.vars.read().clone()
    }
}

impl Default for SystemVariablesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_seeds_known_variables() {
        let config = crate::common::config::StorageEngineConfig::default();
        let store = SystemVariablesStore::from_config(&config);
        assert_eq!(
            store.get("innodb_file_per_table").unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn set_overrides_and_get_reflects_it() {
        let store = SystemVariablesStore::new();
        store.set("lock_wait_timeout", SysVarValue::Int(5000));
        assert_eq!(store.get("lock_wait_timeout").unwrap().as_int(), Some(5000));
        store.set("lock_wait_timeout", SysVarValue::Int(9000));
        assert_eq!(store.get("lock_wait_timeout").unwrap().as_int(), Some(9000));
    }

    #[test]
    fn unknown_variable_reads_as_none() {
        let store = SystemVariablesStore::new();
        assert!(store.get("does_not_exist").is_none());
    }

    #[test]
    fn snapshot_returns_a_consistent_copy() {
        let store = SystemVariablesStore::new();
        store.set("a", SysVarValue::Str("x".to_string()));
        let snap = store.snapshot();
        store.set("a", SysVarValue::Str("y".to_string()));
        assert_eq!(snap.get("a").unwrap().as_str(), Some("x"));
    }
}
