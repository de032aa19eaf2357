//! Result publishing
//!
//! Writes the fund's own result, then pushes the sanitized projection to the
//! cross-fund memory store as a detached best-effort task. Only the
//! [`SanitizedRecord`] is moved into that task.

use crate::memory::{sanitize_analysis, MemoryStore, SanitizedRecord};
use crate::models::{AggregateResult, SubjectRecord};
use crate::state::ResultStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct PublishOutcome {
    /// Whether the primary result write succeeded.
    pub persisted: bool,
    /// Completes with `true` once the memory store accepted the record.
    pub insight_push: JoinHandle<bool>,
}

#[derive(Clone)]
pub struct ResultPublisher {
    results: Arc<dyn ResultStore>,
    memory: Arc<dyn MemoryStore>,
}

impl ResultPublisher {
    pub fn new(results: Arc<dyn ResultStore>, memory: Arc<dyn MemoryStore>) -> Self {
        Self { results, memory }
    }

    /// Version for the next run on this subject.
    ///
    /// Concurrent runs may compute the same number; the store keeps both and
    /// the later write wins.
    pub async fn next_version(&self, subject: &SubjectRecord) -> u32 {
        let stored = match self.results.latest_version(&subject.subject_id).await {
            Ok(version) => version.unwrap_or(0),
            Err(e) => {
                warn!(
                    subject_id = %subject.subject_id,
                    error = %e,
                    "Could not read latest analysis version, using subject record"
                );
                0
            }
        };

        stored.max(subject.analysis_version).saturating_add(1)
    }

    pub async fn publish(&self, subject: &SubjectRecord, result: &AggregateResult) -> PublishOutcome {
        let persisted = match self.results.save_result(&subject.subject_id, result).await {
            Ok(()) => {
                info!(
                    subject_id = %subject.subject_id,
                    version = result.analysis_version,
                    score = result.overall_score,
                    band = result.rag_band.as_str(),
                    "Analysis result persisted"
                );
                true
            }
            Err(e) => {
                warn!(
                    subject_id = %subject.subject_id,
                    version = result.analysis_version,
                    error = %e,
                    "Failed to persist analysis result"
                );
                false
            }
        };

        let insight = sanitize_analysis(subject, result);
        let insight_push = self.push(SanitizedRecord::DealInsight(insight));

        PublishOutcome {
            persisted,
            insight_push,
        }
    }

    /// Fire-and-forget write to the memory store. Errors are logged only.
    pub fn push(&self, record: SanitizedRecord) -> JoinHandle<bool> {
        let memory = Arc::clone(&self.memory);

        tokio::spawn(async move {
            let kind = record.kind();
            match memory.store_sanitized_insight(record).await {
                Ok(()) => {
                    debug!(record_type = kind, "Sanitized record stored");
                    true
                }
                Err(e) => {
                    warn!(record_type = kind, error = %e, "Memory store write failed");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::memory::InMemoryMemoryStore;
    use crate::models::{ConfidenceLevel, RagBand};
    use crate::state::InMemoryStore;
    use crate::Result;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct BrokenMemory;

    #[async_trait::async_trait]
    impl MemoryStore for BrokenMemory {
        async fn store_sanitized_insight(&self, _record: SanitizedRecord) -> Result<()> {
            Err(OrchestrationError::MemoryStoreError("connection refused".into()))
        }
    }

    struct BrokenResults;

    #[async_trait::async_trait]
    impl ResultStore for BrokenResults {
        async fn latest_version(&self, _subject_id: &str) -> Result<Option<u32>> {
            Err(OrchestrationError::StateError("down".into()))
        }

        async fn save_result(&self, _subject_id: &str, _result: &AggregateResult) -> Result<()> {
            Err(OrchestrationError::StateError("down".into()))
        }

        async fn load_latest(&self, _subject_id: &str) -> Result<Option<AggregateResult>> {
            Ok(None)
        }
    }

    fn subject() -> SubjectRecord {
        SubjectRecord {
            subject_id: "deal-42".into(),
            fund_id: "fund-7".into(),
            name: "Acme".into(),
            category: Some("Fintech".into()),
            size: None,
            stage: None,
            description: None,
            last_overall_score: None,
            last_rag_band: None,
            analysis_version: 0,
        }
    }

    fn result(version: u32) -> AggregateResult {
        AggregateResult {
            subject_id: "deal-42".into(),
            overall_score: 77,
            rag_band: RagBand::Promising,
            recommendation: "RECOMMEND — continue diligence".into(),
            confidence_level: ConfidenceLevel::Medium,
            category_results: BTreeMap::new(),
            risk_factors: vec![],
            next_steps: vec![],
            executive_summary: String::new(),
            research_available: false,
            analysis_version: version,
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_persists_and_pushes_insight() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_subject(subject()).await;
        let memory = Arc::new(InMemoryMemoryStore::new());
        let publisher = ResultPublisher::new(store.clone(), memory.clone());

        assert_eq!(publisher.next_version(&subject()).await, 1);

        let outcome = publisher.publish(&subject(), &result(1)).await;
        assert!(outcome.persisted);
        assert!(outcome.insight_push.await.unwrap());

        assert_eq!(publisher.next_version(&subject()).await, 2);
        assert_eq!(memory.record_count().await, 1);

        let stored = serde_json::to_string(&memory.records().await).unwrap();
        assert!(!stored.contains("deal-42"));
        assert!(!stored.contains("fund-7"));
    }

    #[tokio::test]
    async fn test_memory_failure_is_absorbed() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = ResultPublisher::new(store.clone(), Arc::new(BrokenMemory));

        let outcome = publisher.publish(&subject(), &result(1)).await;
        assert!(outcome.persisted);
        assert!(!outcome.insight_push.await.unwrap());
        assert!(store.load_latest("deal-42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_result_store_failure_is_absorbed() {
        let memory = Arc::new(InMemoryMemoryStore::new());
        let publisher = ResultPublisher::new(Arc::new(BrokenResults), memory.clone());

        let mut record = subject();
        record.analysis_version = 4;
        assert_eq!(publisher.next_version(&record).await, 5);

        let outcome = publisher.publish(&record, &result(5)).await;
        assert!(!outcome.persisted);
        assert!(outcome.insight_push.await.unwrap());
    }
}
