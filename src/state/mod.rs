//! State persistence layer
//!
//! Subject records, their auxiliary context, and versioned analysis results.
//! In-memory for development and tests; Postgres in deployment.

pub mod postgres;

pub use postgres::PgStore;

use crate::models::{AgentInteraction, AggregateResult, DocumentRef, NoteSignal, SubjectRecord};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read access to subject records and their auxiliary context
#[async_trait::async_trait]
pub trait SubjectStore: Send + Sync {
    async fn load_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>>;
    async fn load_documents(&self, subject_id: &str) -> Result<Vec<DocumentRef>>;
    async fn load_notes(&self, subject_id: &str) -> Result<Vec<NoteSignal>>;
    async fn load_interactions(&self, subject_id: &str) -> Result<Vec<AgentInteraction>>;
}

/// Versioned result persistence for the fund's own use
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Highest stored `analysis_version` for the subject, if any.
    async fn latest_version(&self, subject_id: &str) -> Result<Option<u32>>;

    /// Store a result. Earlier versions are kept as history; the current
    /// slot holds the highest version seen.
    async fn save_result(&self, subject_id: &str, result: &AggregateResult) -> Result<()>;

    async fn load_latest(&self, subject_id: &str) -> Result<Option<AggregateResult>>;
}

/// In-memory store for development
pub struct InMemoryStore {
    subjects: Arc<RwLock<HashMap<String, SubjectRecord>>>,
    documents: Arc<RwLock<HashMap<String, Vec<DocumentRef>>>>,
    notes: Arc<RwLock<HashMap<String, Vec<NoteSignal>>>>,
    interactions: Arc<RwLock<HashMap<String, Vec<AgentInteraction>>>>,
    results_by_subject: Arc<RwLock<HashMap<String, Vec<AggregateResult>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            subjects: Arc::new(RwLock::new(HashMap::new())),
            documents: Arc::new(RwLock::new(HashMap::new())),
            notes: Arc::new(RwLock::new(HashMap::new())),
            interactions: Arc::new(RwLock::new(HashMap::new())),
            results_by_subject: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert_subject(&self, subject: SubjectRecord) {
        let mut subjects = self.subjects.write().await;
        subjects.insert(subject.subject_id.clone(), subject);
    }

    pub async fn add_document(&self, subject_id: &str, document: DocumentRef) {
        let mut documents = self.documents.write().await;
        documents
            .entry(subject_id.to_string())
            .or_insert_with(Vec::new)
            .push(document);
    }

    pub async fn add_note(&self, subject_id: &str, note: NoteSignal) {
        let mut notes = self.notes.write().await;
        notes
            .entry(subject_id.to_string())
            .or_insert_with(Vec::new)
            .push(note);
    }

    pub async fn add_interaction(&self, subject_id: &str, interaction: AgentInteraction) {
        let mut interactions = self.interactions.write().await;
        interactions
            .entry(subject_id.to_string())
            .or_insert_with(Vec::new)
            .push(interaction);
    }

    /// All stored versions, oldest first.
    pub async fn history(&self, subject_id: &str) -> Vec<AggregateResult> {
        let results = self.results_by_subject.read().await;
        let mut history = results.get(subject_id).cloned().unwrap_or_default();
        history.sort_by_key(|r| r.analysis_version);
        history
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SubjectStore for InMemoryStore {
    async fn load_subject(&self, subject_id: &str) -> Result<Option<SubjectRecord>> {
        let subjects = self.subjects.read().await;
        Ok(subjects.get(subject_id).cloned())
    }

    async fn load_documents(&self, subject_id: &str) -> Result<Vec<DocumentRef>> {
        let documents = self.documents.read().await;
        Ok(documents.get(subject_id).cloned().unwrap_or_default())
    }

    async fn load_notes(&self, subject_id: &str) -> Result<Vec<NoteSignal>> {
        let notes = self.notes.read().await;
        Ok(notes.get(subject_id).cloned().unwrap_or_default())
    }

    async fn load_interactions(&self, subject_id: &str) -> Result<Vec<AgentInteraction>> {
        let interactions = self.interactions.read().await;
        Ok(interactions.get(subject_id).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl ResultStore for InMemoryStore {
    async fn latest_version(&self, subject_id: &str) -> Result<Option<u32>> {
        let results = self.results_by_subject.read().await;
        Ok(results
            .get(subject_id)
            .and_then(|history| history.iter().map(|r| r.analysis_version).max()))
    }

    async fn save_result(&self, subject_id: &str, result: &AggregateResult) -> Result<()> {
        {
            let mut results = self.results_by_subject.write().await;
            results
                .entry(subject_id.to_string())
                .or_insert_with(Vec::new)
                .push(result.clone());
        }

        // Last write wins on analysis_version
        let mut subjects = self.subjects.write().await;
        if let Some(subject) = subjects.get_mut(subject_id) {
            if subject.analysis_version <= result.analysis_version {
                subject.last_overall_score = Some(result.overall_score);
                subject.last_rag_band = Some(result.rag_band);
                subject.analysis_version = result.analysis_version;
            }
        }

        Ok(())
    }

    async fn load_latest(&self, subject_id: &str) -> Result<Option<AggregateResult>> {
        let results = self.results_by_subject.read().await;
        Ok(results.get(subject_id).and_then(|history| {
            history
                .iter()
                .max_by_key(|r| r.analysis_version)
                .cloned()
        }))
    }
}
