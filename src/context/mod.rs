//! Context assembly
//!
//! Builds the one immutable [`EngineContext`] every engine sees. The subject
//! record is the only hard requirement; auxiliary fetches fail independently.

use crate::config::ConfigLoader;
use crate::error::OrchestrationError;
use crate::models::{EngineContext, SubjectRecord};
use crate::state::SubjectStore;
use crate::Result;
use chrono::Utc;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ContextAssembler {
    subjects: Arc<dyn SubjectStore>,
    config_loader: ConfigLoader,
}

impl ContextAssembler {
    pub fn new(subjects: Arc<dyn SubjectStore>, config_loader: ConfigLoader) -> Self {
        Self {
            subjects,
            config_loader,
        }
    }

    /// The one fatal lookup. A backend failure is reported as such, not as
    /// a missing subject.
    pub async fn load_subject(&self, subject_id: &str) -> Result<SubjectRecord> {
        match self.subjects.load_subject(subject_id).await {
            Ok(Some(subject)) => Ok(subject),
            Ok(None) => Err(OrchestrationError::SubjectNotFound(subject_id.to_string())),
            Err(e) => {
                warn!(subject_id, error = %e, "Subject lookup failed");
                Err(OrchestrationError::StateError(format!(
                    "subject lookup failed for {}: {}",
                    subject_id, e
                )))
            }
        }
    }

    pub async fn assemble(&self, subject_id: &str) -> Result<Arc<EngineContext>> {
        let subject = self.load_subject(subject_id).await?;

        let (documents, notes, interactions, strategy) = tokio::join!(
            self.subjects.load_documents(subject_id),
            self.subjects.load_notes(subject_id),
            self.subjects.load_interactions(subject_id),
            self.config_loader.resolve(&subject.fund_id),
        );

        let context = EngineContext {
            documents: best_effort(subject_id, "documents", documents),
            notes: best_effort(subject_id, "notes", notes),
            interactions: best_effort(subject_id, "agent_interactions", interactions),
            subject,
            strategy,
            assembled_at: Utc::now(),
        };

        debug!(
            subject_id,
            documents = ?context.documents.as_ref().map(Vec::len),
            notes = ?context.notes.as_ref().map(Vec::len),
            interactions = ?context.interactions.as_ref().map(Vec::len),
            "Engine context assembled"
        );

        Ok(Arc::new(context))
    }

    pub fn config_loader(&self) -> &ConfigLoader {
        &self.config_loader
    }
}

fn best_effort<T, E: Display>(
    subject_id: &str,
    source: &'static str,
    fetched: std::result::Result<Vec<T>, E>,
) -> Option<Vec<T>> {
    match fetched {
        Ok(items) => Some(items),
        Err(e) => {
            warn!(subject_id, source, error = %e, "Auxiliary context unavailable");
            None
        }
    }
}
