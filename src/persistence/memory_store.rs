//! In-memory implementation of the HistoryStore trait

use super::{HistoryStore, PersistenceError};
use crate::models::LoginRecord;
use std::collections::HashMap;
use std::sync::RwLock;

/// Keeps the latest record per user in memory.
///
/// Suitable for tests, development and single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<String, LoginRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a stored record. Still counts after a writer
    /// panicked; the scoring path reports that case as `LockPoisoned`.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget a single user
    pub fn clear_user(&self, user_id: &str) -> Result<(), PersistenceError> {
        let mut records = self.records.write().map_err(|_| PersistenceError::LockPoisoned)?;
        records.remove(user_id);
        Ok(())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn fetch_last(&self, user_id: &str) -> Result<Option<LoginRecord>, PersistenceError> {
        let records = self.records.read().map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(records.get(user_id).cloned())
    }

    fn store(&self, record: &LoginRecord) -> Result<(), PersistenceError> {
        let mut records = self.records.write().map_err(|_| PersistenceError::LockPoisoned)?;
        records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}
