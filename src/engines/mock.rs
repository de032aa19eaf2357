//! Mock engines for development & testing
//! Keeps the pipeline runnable without deployed scoring services

use crate::engines::{Engine, EngineRegistry, ResearchEngine};
use crate::error::OrchestrationError;
use crate::models::{Category, EngineContext, EngineOutput, ResearchEnrichment, ValidationStatus};
use crate::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockBehavior {
    Score { score: f64, confidence: f64 },
    Fail(String),
    Hang,
}

pub struct MockEngine {
    name: String,
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockEngine {
    pub fn scoring(name: impl Into<String>, score: f64, confidence: f64) -> Self {
        Self::with_behavior(name, MockBehavior::Score { score, confidence })
    }

    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_behavior(name, MockBehavior::Fail(reason.into()))
    }

    /// Never completes.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::with_behavior(name, MockBehavior::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn with_behavior(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, context: &EngineContext) -> Result<EngineOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Score { score, confidence } => Ok(EngineOutput {
                score: *score,
                analysis: format!(
                    "{} assessment for {}: scored {:.0}/100",
                    self.name, context.subject.name, score
                ),
                confidence: *confidence,
                sources: vec![format!("mock://{}", self.name)],
                validation_status: if *confidence >= 70.0 {
                    ValidationStatus::Validated
                } else {
                    ValidationStatus::Partial
                },
            }),
            MockBehavior::Fail(reason) => Err(OrchestrationError::EngineError(reason.clone())),
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(OrchestrationError::EngineError("unreachable".into()))
            }
        }
    }
}

pub struct MockResearchEngine {
    enrichment: Option<ResearchEnrichment>,
    calls: AtomicUsize,
}

impl MockResearchEngine {
    pub fn returning(enrichment: ResearchEnrichment) -> Self {
        Self {
            enrichment: Some(enrichment),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            enrichment: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResearchEngine for MockResearchEngine {
    fn name(&self) -> &str {
        "research"
    }

    async fn research(&self, _context: &EngineContext) -> Result<ResearchEnrichment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.enrichment
            .clone()
            .ok_or_else(|| OrchestrationError::EngineError("research backend unavailable".into()))
    }
}

/// Registry of mock engines with fixed, plausible scores
pub fn create_mock_registry() -> EngineRegistry {
    let fixtures = [
        (Category::StrategicFit, 82.0, 85.0),
        (Category::Market, 74.0, 78.0),
        (Category::Product, 69.0, 72.0),
        (Category::Financial, 58.0, 64.0),
        (Category::Team, 88.0, 90.0),
    ];

    let mut registry = EngineRegistry::new();
    for (category, score, confidence) in fixtures {
        registry.register(
            category,
            Arc::new(MockEngine::scoring(category.as_str(), score, confidence)),
        );
    }

    registry.register_research(Arc::new(MockResearchEngine::returning(ResearchEnrichment {
        summary: "Category leader in a consolidating market".to_string(),
        opportunities: vec![
            "Expansion into adjacent mid-market segment".to_string(),
            "Channel partnership pipeline".to_string(),
        ],
        risks: vec!["Customer concentration in top three accounts".to_string()],
        sources: vec!["mock://research".to_string()],
    })));

    registry
}
