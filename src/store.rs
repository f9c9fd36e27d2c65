#![allow(dead_code)]
//! SQLite-backed log of completed OCR extractions.
//!
//! One row per successful image-to-formula extraction. Rows are append-only:
//! nothing in the service updates or deletes them.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

/// A persisted image-to-formula extraction event.
#[derive(Debug, Clone, Serialize)]
pub struct OcrRecord {
    pub id: i64,
    /// Original base64 payload, stored verbatim.
    pub image: String,
    /// Model output, stored as returned (no LaTeX validation).
    pub latex: String,
    /// ISO-8601 UTC insertion timestamp.
    pub created_at: String,
}

/// Handle to the `ocr_results` table, shared across request handlers.
///
/// Opened once at startup; writes serialize on the inner mutex.
#[derive(Clone)]
pub struct OcrStore {
    conn: Arc<Mutex<Connection>>,
}

impl OcrStore {
    /// Create or open the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open OCR database at {:?}", path.as_ref()))?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ocr_results (
                 id         INTEGER PRIMARY KEY AUTOINCREMENT,
                 image      TEXT NOT NULL,
                 latex      TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );",
        )
        .context("Failed to initialize ocr_results schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append one completed extraction. Returns the assigned record id.
    ///
    /// `created_at` is taken at insertion time, in ISO-8601 UTC.
    pub fn insert(&self, image: &str, latex: &str) -> Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ocr_results (image, latex, created_at) VALUES (?1, ?2, ?3)",
            params![image, latex, created_at],
        )
        .context("Failed to insert OCR record")?;
        Ok(conn.last_insert_rowid())
    }

    /// Trivial read used by the health check. Does not validate the schema
    /// beyond the table being queryable.
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .query_row("SELECT COUNT(*) FROM ocr_results", [], |row| row.get(0))
            .context("Failed to count OCR records")?;
        Ok(n)
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<OcrRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, image, latex, created_at FROM ocr_results
             ORDER BY id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(OcrRecord {
                    id: row.get(0)?,
                    image: row.get(1)?,
                    latex: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    /// Make subsequent reads fail, to exercise the unhealthy path in tests.
    #[cfg(test)]
    pub fn drop_table_for_tests(&self) {
        self.conn
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE ocr_results")
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store = OcrStore::open_in_memory().unwrap();

        let first = store.insert("aW1hZ2Ux", "y = mx + b").unwrap();
        let second = store.insert("aW1hZ2Ux", "y = mx + b").unwrap();

        // Resubmitting the same image is a brand-new record.
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_insert_stores_fields_verbatim() {
        let store = OcrStore::open_in_memory().unwrap();
        store.insert("dmFsaWRwbmc=", "x^2+y^2=r^2").unwrap();

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image, "dmFsaWRwbmc=");
        assert_eq!(records[0].latex, "x^2+y^2=r^2");
    }

    #[test]
    fn test_created_at_is_iso8601_within_call_bounds() {
        let store = OcrStore::open_in_memory().unwrap();

        let before = Utc::now();
        store.insert("aW1n", "\\int_{0}^{1} x^2 dx").unwrap();
        let after = Utc::now();

        let records = store.recent(1).unwrap();
        let ts = DateTime::parse_from_rfc3339(&records[0].created_at)
            .expect("created_at must parse as ISO-8601")
            .with_timezone(&Utc);
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let store = OcrStore::open_in_memory().unwrap();
        store.insert("YQ==", "a").unwrap();
        store.insert("Yg==", "b").unwrap();
        store.insert("Yw==", "c").unwrap();

        let records = store.recent(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].latex, "c");
        assert_eq!(records[1].latex, "b");
    }

    #[test]
    fn test_open_fails_on_unreachable_path() {
        let err = OcrStore::open("/nonexistent-dir/math_ocr.db");
        assert!(err.is_err());
    }
}
