//! Correction store for CSR overrides of AI classifications.
//!
//! Corrections build the dataset used to measure real-world accuracy and to
//! spot recurring confusion pairs. The database is the primary sink; when a
//! write fails the record is appended to `corrections.jsonl` instead so no
//! correction is dropped. Reads come from the database, falling back to the
//! JSONL when the query fails.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::round_to;
use crate::error::StoreError;
use crate::store::migrations;

/// Sentinel value a CSR enters when the AI classification was right.
const CONFIRMED_CORRECT: &str = "correct";

/// A single CSR correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub timestamp: String,
    pub ticket_id: String,
    pub department_id: Option<String>,
    pub original_intent: String,
    pub corrected_intent: String,
    /// AI confidence at classification time, as an integer percent.
    pub confidence: Option<i64>,
    pub is_misclassification: bool,
}

impl CorrectionRecord {
    /// Build a record from the fields a ticket-update webhook carries.
    ///
    /// CSR-entered intents are stored verbatim. They may legitimately fall
    /// outside the classifier's own taxonomy and are never validated
    /// against it.
    pub fn new(
        ticket_id: impl Into<String>,
        original_intent: impl Into<String>,
        corrected_intent: impl Into<String>,
        confidence: Option<i64>,
        department_id: Option<String>,
    ) -> Self {
        let original_intent = original_intent.into();
        let corrected_intent = corrected_intent.into();
        let is_misclassification =
            corrected_intent != CONFIRMED_CORRECT && corrected_intent != original_intent;
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ticket_id: ticket_id.into(),
            department_id,
            original_intent,
            corrected_intent,
            confidence,
            is_misclassification,
        }
    }
}

/// libSQL-backed correction store with a JSONL fallback sink.
pub struct CorrectionStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
    fallback_path: PathBuf,
}

impl CorrectionStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(
        path: &Path,
        fallback_path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(|e| {
            StoreError::Connection(format!("Failed to open corrections database: {e}"))
        })?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Corrections database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
            fallback_path: fallback_path.into(),
        })
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory(fallback_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            fallback_path: fallback_path.into(),
        })
    }

    /// Persist a correction, database first.
    pub async fn record(&self, record: &CorrectionRecord) -> Result<(), StoreError> {
        match self.insert_db(record).await {
            Ok(()) => {
                info!(
                    ticket_id = %record.ticket_id,
                    original = %record.original_intent,
                    corrected = %record.corrected_intent,
                    misclassification = record.is_misclassification,
                    "Correction recorded"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    ticket_id = %record.ticket_id,
                    "Database write failed ({e}), falling back to JSONL"
                );
                self.append_jsonl(record)
            }
        }
    }

    /// All recorded corrections, oldest first.
    pub async fn list(&self) -> Vec<CorrectionRecord> {
        match self.list_db().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Database read failed ({e}), falling back to JSONL");
                self.list_jsonl()
            }
        }
    }

    /// Confusion-pair summary over every recorded correction.
    ///
    /// With no corrections yet there is no accuracy to report, so the
    /// `accuracy_rate` key is absent rather than null.
    pub async fn summary(&self) -> Value {
        let entries = self.list().await;
        if entries.is_empty() {
            return json!({"total": 0, "misclassifications": 0, "confusion_pairs": []});
        }

        let misclassified = entries.iter().filter(|e| e.is_misclassification).count();

        let mut confusion_counts: BTreeMap<String, usize> = BTreeMap::new();
        for e in entries.iter().filter(|e| e.is_misclassification) {
            let pair = format!("{} → {}", e.original_intent, e.corrected_intent);
            *confusion_counts.entry(pair).or_default() += 1;
        }
        let mut confusion_pairs: Vec<Value> = confusion_counts
            .iter()
            .map(|(pair, count)| json!({"pair": pair, "count": count}))
            .collect();
        confusion_pairs.sort_by_key(|v| std::cmp::Reverse(v["count"].as_u64()));

        json!({
            "total": entries.len(),
            "misclassifications": misclassified,
            "accuracy_rate": round_to(
                (entries.len() - misclassified) as f64 / entries.len() as f64 * 100.0,
                1,
            ),
            "confusion_pairs": confusion_pairs,
        })
    }

    async fn insert_db(&self, record: &CorrectionRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO corrections (id, timestamp, ticket_id, department_id, original_intent, corrected_intent, confidence, is_misclassification) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    record.timestamp.clone(),
                    record.ticket_id.clone(),
                    opt_text(record.department_id.as_deref()),
                    record.original_intent.clone(),
                    record.corrected_intent.clone(),
                    opt_int(record.confidence),
                    record.is_misclassification as i64,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to insert correction: {e}")))?;
        Ok(())
    }

    async fn list_db(&self) -> Result<Vec<CorrectionRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT timestamp, ticket_id, department_id, original_intent, corrected_intent, confidence, is_misclassification FROM corrections ORDER BY timestamp",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query corrections: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read correction row: {e}")))?
        {
            records.push(
                row_to_record(&row)
                    .map_err(|e| StoreError::Query(format!("Failed to parse correction: {e}")))?,
            );
        }
        Ok(records)
    }

    fn append_jsonl(&self, record: &CorrectionRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)
            .map_err(|e| StoreError::Query(format!("Failed to serialize correction: {e}")))?;

        if let Some(parent) = self.fallback_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create log directory: {e}"))
            })?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.fallback_path)
            .map_err(|e| {
                StoreError::Connection(format!(
                    "Failed to open {}: {e}",
                    self.fallback_path.display()
                ))
            })?;
        writeln!(file, "{line}")
            .map_err(|e| StoreError::Connection(format!("Failed to append correction: {e}")))?;

        info!(ticket_id = %record.ticket_id, "Correction logged to JSONL fallback");
        Ok(())
    }

    fn list_jsonl(&self) -> Vec<CorrectionRecord> {
        let Ok(content) = std::fs::read_to_string(&self.fallback_path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                serde_json::from_str(line).ok()
            })
            .collect()
    }
}

/// Map a libsql Row to a CorrectionRecord.
fn row_to_record(row: &libsql::Row) -> Result<CorrectionRecord, libsql::Error> {
    let misclass: i64 = row.get(6)?;
    Ok(CorrectionRecord {
        timestamp: row.get(0)?,
        ticket_id: row.get(1)?,
        department_id: row.get(2).ok(),
        original_intent: row.get(3)?,
        corrected_intent: row.get(4)?,
        confidence: row.get(5).ok(),
        is_misclassification: misclass != 0,
    })
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<i64>` to a libsql Value.
fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(dir: &tempfile::TempDir) -> CorrectionStore {
        CorrectionStore::new_memory(dir.path().join("corrections.jsonl"))
            .await
            .unwrap()
    }

    #[test]
    fn misclassification_flag_logic() {
        let confirmed = CorrectionRecord::new("1", "refund_request", "correct", Some(90), None);
        assert!(!confirmed.is_misclassification);

        let same = CorrectionRecord::new("2", "move_out", "move_out", Some(80), None);
        assert!(!same.is_misclassification);

        let changed = CorrectionRecord::new("3", "move_out", "refund_request", Some(70), None);
        assert!(changed.is_misclassification);
    }

    #[tokio::test]
    async fn record_and_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let record = CorrectionRecord::new(
            "1001",
            "permit_inquiry",
            "account_update",
            Some(85),
            Some("dept-7".into()),
        );
        store.record(&record).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], record);

        // Healthy database writes never touch the fallback file.
        assert!(!dir.path().join("corrections.jsonl").exists());
    }

    #[tokio::test]
    async fn csr_intents_outside_the_taxonomy_are_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let record = CorrectionRecord::new("1002", "unclear", "tow_issue", None, None);
        store.record(&record).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed[0].corrected_intent, "tow_issue");
        assert!(listed[0].is_misclassification);
        assert_eq!(listed[0].confidence, None);
        assert_eq!(listed[0].department_id, None);
    }

    #[tokio::test]
    async fn summary_ranks_confusion_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        for _ in 0..2 {
            store
                .record(&CorrectionRecord::new(
                    "1", "move_out", "refund_request", Some(60), None,
                ))
                .await
                .unwrap();
        }
        store
            .record(&CorrectionRecord::new(
                "2", "permit_inquiry", "payment_issue", Some(55), None,
            ))
            .await
            .unwrap();
        store
            .record(&CorrectionRecord::new(
                "3", "refund_request", "correct", Some(95), None,
            ))
            .await
            .unwrap();

        let summary = store.summary().await;
        assert_eq!(summary["total"], 4);
        assert_eq!(summary["misclassifications"], 3);
        assert_eq!(summary["accuracy_rate"], 25.0);

        let pairs = summary["confusion_pairs"].as_array().unwrap();
        assert_eq!(pairs[0]["pair"], "move_out → refund_request");
        assert_eq!(pairs[0]["count"], 2);
        assert_eq!(pairs[1]["count"], 1);
    }

    #[tokio::test]
    async fn empty_summary_has_no_accuracy_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let summary = store.summary().await;
        assert_eq!(summary["total"], 0);
        assert_eq!(summary["misclassifications"], 0);
        assert_eq!(summary["confusion_pairs"].as_array().unwrap().len(), 0);
        assert!(summary.get("accuracy_rate").is_none());
    }

    #[tokio::test]
    async fn jsonl_fallback_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let record =
            CorrectionRecord::new("1003", "move_out", "permit_cancellation", Some(72), None);
        store.append_jsonl(&record).unwrap();
        store.append_jsonl(&record).unwrap();

        let listed = store.list_jsonl();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], record);
    }
}
