//! Main orchestrator - one analysis run per call
//!
//! CONTEXT → FAN-OUT → AGGREGATE → CLASSIFY → NARRATE → PUBLISH → AUDIT
//!
//! Runs share no mutable state; every collaborator is injected.

use crate::audit::{compute_content_hash, AuditLog, RunRecord};
use crate::classifier::RagClassifier;
use crate::context::ContextAssembler;
use crate::engines::{EngineGateway, GatewayOutcome};
use crate::models::{
    AggregateResult, Category, EngineContext, FundStrategy, ResearchEnrichment, SubjectRecord,
};
use crate::narrative::{NarrativeComposer, NarrativeInput};
use crate::publish::ResultPublisher;
use crate::scoring::ScoreAggregator;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a run produced, for callers that need more than the result.
pub struct RunReport {
    pub run_id: Uuid,
    pub result: AggregateResult,
    pub subject: SubjectRecord,
    pub substituted: Vec<Category>,
    pub persisted: bool,
    pub reasoning_trace: Vec<String>,
    /// The detached memory-store write. Dropping it does not cancel it.
    pub insight_push: JoinHandle<bool>,
}

/// Coordinates one analysis run end to end
pub struct Orchestrator {
    assembler: ContextAssembler,
    gateway: EngineGateway,
    aggregator: ScoreAggregator,
    narrative: NarrativeComposer,
    publisher: ResultPublisher,
    audit_log: AuditLog,
}

impl Orchestrator {
    pub fn new(
        assembler: ContextAssembler,
        gateway: EngineGateway,
        narrative: NarrativeComposer,
        publisher: ResultPublisher,
        audit_log: AuditLog,
    ) -> Self {
        Self {
            assembler,
            gateway,
            aggregator: ScoreAggregator::new(),
            narrative,
            publisher,
            audit_log,
        }
    }

    /// Run the full pipeline and return the aggregate result.
    pub async fn run(&self, subject_id: &str) -> Result<AggregateResult> {
        self.run_detailed(subject_id).await.map(|report| report.result)
    }

    pub async fn run_detailed(&self, subject_id: &str) -> Result<RunReport> {
        let start_time = Instant::now();
        let run_id = Uuid::new_v4();
        let mut reasoning_trace = Vec::new();

        info!(%run_id, subject_id, "Orchestrator: starting analysis");
        reasoning_trace.push("INPUT: Analysis requested".to_string());

        // === CONTEXT ===
        let context = self.assembler.assemble(subject_id).await?;
        reasoning_trace.push(format!(
            "CONTEXT: documents={} notes={} interactions={} fund_weights={}",
            describe_count(context.documents.as_deref()),
            describe_count(context.notes.as_deref()),
            describe_count(context.interactions.as_deref()),
            context.strategy.weights.len()
        ));

        // === FAN-OUT ===
        let outcome = self.gateway.invoke_all(&context).await;
        for (category, result) in &outcome.results {
            reasoning_trace.push(format!(
                "ENGINE: {} scored {:.0} (confidence {:.0}, {:?})",
                category, result.score, result.confidence, result.validation_status
            ));
        }
        if !outcome.substituted.is_empty() {
            reasoning_trace.push(format!(
                "ENGINE: {} of {} substituted with neutral fallback",
                outcome.substituted.len(),
                Category::ALL.len()
            ));
        }

        // === AGGREGATE / CLASSIFY ===
        let overall_score = self
            .aggregator
            .aggregate(&outcome.results, &context.strategy.weights);
        let rag_band = RagClassifier::classify(overall_score as f64, &context.strategy.thresholds);
        let confidence_level = RagClassifier::confidence_level(&outcome.results);

        reasoning_trace.push(format!(
            "AGGREGATE: overall {} → {} ({:?} confidence)",
            overall_score, rag_band, confidence_level
        ));
        debug!(subject_id, overall_score, band = rag_band.as_str(), "Classified");

        // === NARRATE ===
        let narrative = self
            .narrative
            .compose(&NarrativeInput {
                subject_name: &context.subject.name,
                overall_score,
                rag_band,
                results: &outcome.results,
                enrichment: outcome.enrichment.as_ref(),
            })
            .await;
        reasoning_trace.push(format!(
            "NARRATE: {} summary, {} risk factor(s)",
            if narrative.generated { "generated" } else { "templated" },
            narrative.risk_factors.len()
        ));

        // === PUBLISH ===
        let analysis_version = self.publisher.next_version(&context.subject).await;

        let GatewayOutcome {
            results,
            enrichment,
            substituted,
        } = outcome;

        let result = AggregateResult {
            subject_id: context.subject.subject_id.clone(),
            overall_score,
            rag_band,
            recommendation: RagClassifier::recommendation(rag_band).to_string(),
            confidence_level,
            category_results: results,
            risk_factors: narrative.risk_factors,
            next_steps: narrative.next_steps,
            executive_summary: narrative.executive_summary,
            research_available: enrichment.is_some(),
            analysis_version,
            analyzed_at: Utc::now(),
        };

        let published = self.publisher.publish(&context.subject, &result).await;
        reasoning_trace.push(format!(
            "PUBLISH: version {} {}",
            analysis_version,
            if published.persisted { "persisted" } else { "NOT persisted" }
        ));

        // === AUDIT ===
        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        reasoning_trace.push("COMPLETE".to_string());

        let record = RunRecord {
            run_id,
            subject_id: result.subject_id.clone(),
            analysis_version,
            overall_score,
            engine_statuses: result
                .category_results
                .iter()
                .map(|(category, r)| (*category, r.validation_status))
                .collect(),
            substituted_engines: substituted.clone(),
            persisted: published.persisted,
            result_hash: compute_content_hash(&result),
            reasoning_trace: reasoning_trace.clone(),
            created_at: Utc::now(),
            execution_time_ms,
        };

        if let Err(e) = self.audit_log.record(record).await {
            warn!(%run_id, error = %e, "Failed to record audit trail");
        }

        info!(
            %run_id,
            subject_id,
            overall_score,
            band = rag_band.as_str(),
            version = analysis_version,
            substituted = substituted.len(),
            elapsed_ms = execution_time_ms,
            "Analysis complete"
        );

        Ok(RunReport {
            run_id,
            subject: context.subject.clone(),
            result,
            substituted,
            persisted: published.persisted,
            reasoning_trace,
            insight_push: published.insight_push,
        })
    }

    /// Context plus research enrichment only; no scoring engines are called.
    pub async fn enrich(
        &self,
        subject_id: &str,
    ) -> Result<(Arc<EngineContext>, Option<ResearchEnrichment>)> {
        let context = self.assembler.assemble(subject_id).await?;
        let enrichment = self.gateway.research(&context).await;
        Ok((context, enrichment))
    }

    /// Look up a subject without running anything.
    pub async fn subject(&self, subject_id: &str) -> Result<SubjectRecord> {
        self.assembler.load_subject(subject_id).await
    }

    pub async fn resolve_strategy(&self, fund_id: &str) -> FundStrategy {
        self.assembler.config_loader().resolve(fund_id).await
    }

    pub fn publisher(&self) -> &ResultPublisher {
        &self.publisher
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }
}

fn describe_count<T>(items: Option<&[T]>) -> String {
    match items {
        Some(items) => items.len().to_string(),
        None => "unavailable".to_string(),
    }
}
