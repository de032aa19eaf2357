//! Engine gateway
//!
//! Fans the roster out concurrently against one context and waits for every
//! call to settle. Whatever happens to an individual engine, the outcome holds
//! exactly one result per roster category.

use crate::engines::EngineRegistry;
use crate::error::OrchestrationError;
use crate::models::{
    Category, EngineContext, EngineOutput, EngineResult, ResearchEnrichment, ValidationStatus,
};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Neutral score given to an engine that could not answer.
pub const FALLBACK_SCORE: f64 = 50.0;
pub const FALLBACK_CONFIDENCE: f64 = 30.0;

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Deadline for each individual engine call.
    pub engine_timeout: Duration,
    /// Deadline for the whole fan-out.
    pub run_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            engine_timeout: Duration::from_secs(20),
            run_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    /// One entry per roster category, in roster order.
    pub results: BTreeMap<Category, EngineResult>,
    pub enrichment: Option<ResearchEnrichment>,
    /// Categories that received the neutral fallback.
    pub substituted: Vec<Category>,
}

impl GatewayOutcome {
    pub fn validated_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.validation_status == ValidationStatus::Validated)
            .count()
    }
}

enum Settled {
    Category {
        category: Category,
        result: EngineResult,
        substituted: bool,
    },
    Research(Option<ResearchEnrichment>),
}

pub struct EngineGateway {
    registry: EngineRegistry,
    config: GatewayConfig,
}

impl EngineGateway {
    pub fn new(registry: EngineRegistry, config: GatewayConfig) -> Self {
        Self { registry, config }
    }

    /// Invoke every roster engine plus research, all concurrently.
    pub async fn invoke_all(&self, context: &EngineContext) -> GatewayOutcome {
        let subject_id = context.subject.subject_id.as_str();
        let deadline = Instant::now() + self.config.run_timeout;

        let mut pending: FuturesUnordered<BoxFuture<'_, Settled>> = FuturesUnordered::new();

        for category in Category::ALL {
            pending.push(
                async move {
                    let (result, substituted) = self.invoke_one(category, context).await;
                    Settled::Category {
                        category,
                        result,
                        substituted,
                    }
                }
                .boxed(),
            );
        }

        if self.registry.research().is_some() {
            pending.push(async move { Settled::Research(self.research(context).await) }.boxed());
        }

        let mut results = BTreeMap::new();
        let mut substituted = Vec::new();
        let mut enrichment = None;

        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some(Settled::Category {
                    category,
                    result,
                    substituted: was_substituted,
                })) => {
                    if was_substituted {
                        substituted.push(category);
                    }
                    results.insert(category, result);
                }
                Ok(Some(Settled::Research(found))) => enrichment = found,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        subject_id,
                        unsettled = pending.len(),
                        run_timeout_ms = self.config.run_timeout.as_millis() as u64,
                        "Run deadline exceeded, substituting unsettled engines"
                    );
                    break;
                }
            }
        }

        // Unsettled calls are dropped here
        drop(pending);

        for category in Category::ALL {
            if !results.contains_key(&category) {
                substituted.push(category);
                results.insert(category, fallback_result(category, "run deadline exceeded"));
            }
        }
        substituted.sort();

        info!(
            subject_id,
            engines = results.len(),
            substituted = substituted.len(),
            research = enrichment.is_some(),
            "Engine fan-out settled"
        );

        GatewayOutcome {
            results,
            enrichment,
            substituted,
        }
    }

    /// Run only the research engine. Absence or failure yields `None`.
    pub async fn research(&self, context: &EngineContext) -> Option<ResearchEnrichment> {
        let engine = self.registry.research()?;
        let subject_id = context.subject.subject_id.as_str();

        match timeout(self.config.engine_timeout, engine.research(context)).await {
            Ok(Ok(enrichment)) => {
                debug!(subject_id, engine = engine.name(), "Research enrichment received");
                Some(enrichment)
            }
            Ok(Err(e)) => {
                warn!(subject_id, engine = engine.name(), error = %e, "Research unavailable");
                None
            }
            Err(_) => {
                warn!(subject_id, engine = engine.name(), "Research timed out");
                None
            }
        }
    }

    async fn invoke_one(&self, category: Category, context: &EngineContext) -> (EngineResult, bool) {
        let subject_id = context.subject.subject_id.as_str();

        let Some(engine) = self.registry.get(category) else {
            warn!(subject_id, engine = %category, "No engine registered for roster entry");
            return (fallback_result(category, "no engine registered"), true);
        };

        let started = Instant::now();
        let outcome = timeout(self.config.engine_timeout, engine.invoke(context)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => match accept_output(category, output) {
                Some(result) => {
                    debug!(
                        subject_id,
                        engine = %category,
                        score = result.score,
                        elapsed_ms,
                        "Engine succeeded"
                    );
                    (result, false)
                }
                None => {
                    warn!(subject_id, engine = %category, "Engine returned a non-numeric score");
                    (fallback_result(category, "invalid score returned"), true)
                }
            },
            Ok(Err(e)) => {
                warn!(subject_id, engine = %category, error = %e, elapsed_ms, "Engine failed");
                (fallback_result(category, &e.to_string()), true)
            }
            Err(_) => {
                let timeout_ms = self.config.engine_timeout.as_millis() as u64;
                warn!(subject_id, engine = %category, timeout_ms, "Engine timed out");
                let reason = OrchestrationError::EngineTimeout(timeout_ms).to_string();
                (fallback_result(category, &reason), true)
            }
        }
    }
}

/// Clamp an engine's output into range. `None` if the score is unusable.
fn accept_output(category: Category, output: EngineOutput) -> Option<EngineResult> {
    if !output.score.is_finite() {
        return None;
    }

    let confidence = if output.confidence.is_finite() {
        output.confidence.clamp(0.0, 100.0)
    } else {
        0.0
    };

    Some(EngineResult {
        engine: category.as_str().to_string(),
        score: output.score.clamp(0.0, 100.0),
        analysis: output.analysis,
        confidence,
        sources: output.sources,
        validation_status: output.validation_status,
    })
}

/// The neutral stand-in for an engine that could not answer.
pub fn fallback_result(category: Category, reason: &str) -> EngineResult {
    EngineResult {
        engine: category.as_str().to_string(),
        score: FALLBACK_SCORE,
        analysis: format!("{}, engine unavailable", reason),
        confidence: FALLBACK_CONFIDENCE,
        sources: vec![],
        validation_status: ValidationStatus::Unvalidated,
    }
}
