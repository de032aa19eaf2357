//! Run audit trail
//!
//! Every orchestration run leaves a record that can be checked against the
//! persisted result later.

use crate::models::{AggregateResult, Category, ValidationStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub subject_id: String,
    pub analysis_version: u32,
    pub overall_score: u8,
    pub engine_statuses: BTreeMap<Category, ValidationStatus>,
    /// Roster entries that received the neutral fallback.
    pub substituted_engines: Vec<Category>,
    pub persisted: bool,
    pub result_hash: String,
    pub reasoning_trace: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a run record
    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let run_id = record.run_id;
        let mut records = self.records.write().await;
        records.insert(run_id, record);
        Ok(run_id)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&run_id).cloned())
    }

    /// Runs for a subject, oldest first
    pub async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<RunRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<RunRecord> = records
            .values()
            .filter(|record| record.subject_id == subject_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| (record.created_at, record.analysis_version));

        Ok(items)
    }

    /// Check a result against the hash captured when its run completed
    pub async fn verify_integrity(&self, run_id: Uuid, result: &AggregateResult) -> Result<bool> {
        Ok(self
            .get(run_id)
            .await?
            .map(|record| compute_content_hash(result) == record.result_hash)
            .unwrap_or(false))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA256 over the JSON form of any serializable value, hex-encoded.
/// Streams serialization straight into the hasher.
pub fn compute_content_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), value).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
