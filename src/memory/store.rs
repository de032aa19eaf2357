//! In-memory cross-fund store

use crate::memory::{MemoryStore, SanitizedRecord};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every record in insertion order, plus a count per insight pattern.
pub struct InMemoryMemoryStore {
    records: Arc<RwLock<Vec<SanitizedRecord>>>,
    pattern_counts: Arc<RwLock<HashMap<String, usize>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            pattern_counts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn records(&self) -> Vec<SanitizedRecord> {
        self.records.read().await.clone()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// How many stored insights share this pattern hash.
    pub async fn pattern_frequency(&self, pattern_hash: &str) -> usize {
        self.pattern_counts
            .read()
            .await
            .get(pattern_hash)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn store_sanitized_insight(&self, record: SanitizedRecord) -> Result<()> {
        if let SanitizedRecord::DealInsight(insight) = &record {
            let mut counts = self.pattern_counts.write().await;
            *counts.entry(insight.pattern_hash.clone()).or_insert(0) += 1;
        }

        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }
}
