//! Login history storage
//!
//! The engine reads the previous record through a [`HistoryStore`]; writing
//! the new record is left to the caller. Everything passing through this
//! port is already privacy-safe, so backends can store it as-is.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryHistoryStore;
pub use sqlite_store::SqliteHistoryStore;

use crate::models::LoginRecord;
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Trait for login history backends
///
/// Implementations must keep concurrent access for different users
/// independent. For the same user, a read followed by a write must at least
/// be last-write-wins.
pub trait HistoryStore: Send + Sync {
    /// Most recent record for a user, or `None` on a first login
    fn fetch_last(&self, user_id: &str) -> Result<Option<LoginRecord>, PersistenceError>;

    /// Persist a new record
    fn store(&self, record: &LoginRecord) -> Result<(), PersistenceError>;
}
