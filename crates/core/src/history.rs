//! Durable history of generated reports.
//!
//! One SQLite table, one row per successful generation. Each row freezes the report as its JSON
//! payload alongside denormalised name and diagnosis columns for list display. The store is an
//! explicitly constructed handle; callers share it through an `Arc`.

use crate::error::{ScribeError, ScribeResult};
use crate::report::MedicalReport;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    patient_name TEXT NOT NULL,
    diagnosis TEXT NOT NULL,
    full_report_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history (timestamp DESC);";

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, patient_name, diagnosis, full_report_json FROM history";

/// A stored report snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub patient_name: String,
    pub diagnosis: String,
    pub full_report_json: String,
}

impl HistoryItem {
    /// Decodes the frozen report snapshot.
    pub fn report(&self) -> ScribeResult<MedicalReport> {
        MedicalReport::from_json(&self.full_report_json)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            patient_name: row.get(2)?,
            diagnosis: row.get(3)?,
            full_report_json: row.get(4)?,
        })
    }
}

/// SQLite-backed history store.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Opens (creating if needed) the history database at `path`.
    pub fn open(path: impl AsRef<Path>) -> ScribeResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> ScribeResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ScribeResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> ScribeResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ScribeError::StoreLockPoisoned)
    }

    /// Appends a snapshot of `report` taken at `timestamp` (ms since epoch).
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::InvalidReport` for a report that would not decode again.
    pub fn insert(&self, report: &MedicalReport, timestamp: i64) -> ScribeResult<HistoryItem> {
        report.validate()?;
        let full_report_json = report.to_json()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO history (timestamp, patient_name, diagnosis, full_report_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                timestamp,
                report.patient_name,
                report.diagnosis,
                full_report_json
            ],
        )?;

        Ok(HistoryItem {
            id: conn.last_insert_rowid(),
            timestamp,
            patient_name: report.patient_name.clone(),
            diagnosis: report.diagnosis.clone(),
            full_report_json,
        })
    }

    /// Appends a snapshot stamped with the current time.
    pub fn record(&self, report: &MedicalReport) -> ScribeResult<HistoryItem> {
        self.insert(report, Utc::now().timestamp_millis())
    }

    /// Replaces the snapshot stored in row `id` with `report`. The timestamp is left unchanged.
    ///
    /// Returns `false` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::InvalidReport` for a report that would not decode again.
    pub fn update_report(&self, id: i64, report: &MedicalReport) -> ScribeResult<bool> {
        report.validate()?;
        let full_report_json = report.to_json()?;
        let changed = self.conn()?.execute(
            "UPDATE history SET patient_name = ?1, diagnosis = ?2, full_report_json = ?3
             WHERE id = ?4",
            params![report.patient_name, report.diagnosis, full_report_json, id],
        )?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: i64) -> ScribeResult<Option<HistoryItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                HistoryItem::from_row,
            )
            .optional()?;
        Ok(item)
    }

    /// All rows, newest first. Rows sharing a timestamp are ordered by id, newest first.
    pub fn list_all(&self) -> ScribeResult<Vec<HistoryItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY timestamp DESC, id DESC",
            SELECT_COLUMNS
        ))?;
        let items = stmt
            .query_map([], HistoryItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Deletes every row and returns how many were removed.
    pub fn clear_all(&self) -> ScribeResult<usize> {
        let removed = self.conn()?.execute("DELETE FROM history", [])?;
        Ok(removed)
    }
}
