//! SQLite implementation of the HistoryStore trait

use super::{HistoryStore, PersistenceError};
use crate::models::LoginRecord;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const RECORD_COLUMNS: &str = "user_id, timestamp_ms, masked_ip_prefix, country_code, city_id, asn, \
                              org_name, fingerprint_hash, ip_timezone, client_timezone";

/// SQLite-based login history
///
/// Records are appended, so the store keeps the full history per user; the
/// engine only ever asks for the latest one.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Create a new SQLite history store at the specified path
    ///
    /// Creates the database file and initializes the schema if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteHistoryStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteHistoryStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    /// Most recent records for a user, newest first
    pub fn history_for(&self, user_id: &str, limit: usize) -> Result<Vec<LoginRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM login_history
             WHERE user_id = ?
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?",
            RECORD_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_record).collect()
    }

    /// Remove records older than the cutoff, returning how many were deleted
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM login_history WHERE timestamp_ms < ?",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    /// Clear all data (useful for testing)
    pub fn clear_all(&self) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM login_history", [])?;
        Ok(())
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn fetch_last(&self, user_id: &str) -> Result<Option<LoginRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM login_history
             WHERE user_id = ?
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT 1",
            RECORD_COLUMNS
        ))?;

        match stmt.query_row(params![user_id], read_row) {
            Ok(row) => into_record(row).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, record: &LoginRecord) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO login_history ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                RECORD_COLUMNS
            ),
            params![
                record.user_id,
                record.timestamp.timestamp_millis(),
                record.masked_ip_prefix,
                record.country_code,
                record.city_id,
                record.asn,
                record.org_name,
                record.fingerprint_hash,
                record.ip_timezone,
                record.client_timezone
            ],
        )?;
        Ok(())
    }
}

/// Row with the timestamp still in raw milliseconds
struct StoredRow {
    timestamp_ms: i64,
    record: LoginRecord,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        timestamp_ms: row.get(1)?,
        record: LoginRecord {
            user_id: row.get(0)?,
            timestamp: DateTime::<Utc>::default(),
            masked_ip_prefix: row.get(2)?,
            country_code: row.get(3)?,
            city_id: row.get(4)?,
            asn: row.get(5)?,
            org_name: row.get(6)?,
            fingerprint_hash: row.get(7)?,
            ip_timezone: row.get(8)?,
            client_timezone: row.get(9)?,
        },
    })
}

fn into_record(row: StoredRow) -> Result<LoginRecord, PersistenceError> {
    let timestamp = Utc
        .timestamp_millis_opt(row.timestamp_ms)
        .single()
        .ok_or_else(|| PersistenceError::InvalidData(format!("Invalid timestamp: {}", row.timestamp_ms)))?;
    Ok(LoginRecord {
        timestamp,
        ..row.record
    })
}
