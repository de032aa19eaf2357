//! Legacy action protocol
//!
//! Older clients send `{ action, data, subjectId?, fundId? }`. Each request is
//! resolved once into a [`LegacyAction`], checked against the data-flow policy
//! for the fund that owns the subject, then translated into the current pipeline.

use crate::agent::Orchestrator;
use crate::classifier::RagClassifier;
use crate::error::OrchestrationError;
use crate::memory::{sanitize_migration, MigratedAction, SanitizedRecord};
use crate::models::{AggregateResult, Category, SubjectRecord};
use crate::narrative::render_ic_memo;
use crate::policy::{DataFlowPolicy, FlowRequest};
use crate::scoring::{match_category, ScoreAggregator};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const POLICY_SOURCE: &str = "legacy_api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyRequest {
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, rename = "subjectId", alias = "subject_id")]
    pub subject_id: Option<String>,
    #[serde(default, rename = "fundId", alias = "fund_id")]
    pub fund_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyAction {
    ComprehensiveAnalysis,
    EnrichDeal,
    AnalyzeCriteria,
    GenerateIcMemo,
    CalculateOverallScore,
    Unsupported(String),
}

impl LegacyAction {
    pub fn parse(action: &str) -> Self {
        match action.trim() {
            "comprehensive_analysis" => LegacyAction::ComprehensiveAnalysis,
            "enrich_deal" => LegacyAction::EnrichDeal,
            "analyze_criteria" => LegacyAction::AnalyzeCriteria,
            "generate_ic_memo" => LegacyAction::GenerateIcMemo,
            "calculate_overall_score" => LegacyAction::CalculateOverallScore,
            other => LegacyAction::Unsupported(other.to_string()),
        }
    }

    pub fn migrated(&self) -> Option<MigratedAction> {
        match self {
            LegacyAction::ComprehensiveAnalysis => Some(MigratedAction::ComprehensiveAnalysis),
            LegacyAction::EnrichDeal => Some(MigratedAction::EnrichDeal),
            LegacyAction::AnalyzeCriteria => Some(MigratedAction::AnalyzeCriteria),
            LegacyAction::GenerateIcMemo => Some(MigratedAction::GenerateIcMemo),
            LegacyAction::CalculateOverallScore => Some(MigratedAction::CalculateOverallScore),
            LegacyAction::Unsupported(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LegacyAction::ComprehensiveAnalysis => "comprehensive_analysis",
            LegacyAction::EnrichDeal => "enrich_deal",
            LegacyAction::AnalyzeCriteria => "analyze_criteria",
            LegacyAction::GenerateIcMemo => "generate_ic_memo",
            LegacyAction::CalculateOverallScore => "calculate_overall_score",
            LegacyAction::Unsupported(name) => name,
        }
    }

    fn migration_note(&self) -> String {
        match self {
            LegacyAction::ComprehensiveAnalysis => {
                "Deprecated: send {\"subjectId\"} to /api/analyze; the response is identical".to_string()
            }
            LegacyAction::CalculateOverallScore => {
                "Deprecated: overall scores are computed by /api/analyze from engine results".to_string()
            }
            other => format!(
                "Deprecated: '{}' is served from /api/analyze results; migrate to {{\"subjectId\"}} requests",
                other.as_str()
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacyResponse {
    pub success: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AggregateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub migration_note: String,
    pub timestamp: DateTime<Utc>,
}

pub struct LegacyAdapter {
    orchestrator: Arc<Orchestrator>,
    policy: Option<Arc<dyn DataFlowPolicy>>,
}

impl LegacyAdapter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DataFlowPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub async fn handle(&self, request: LegacyRequest) -> Result<LegacyResponse> {
        let action = LegacyAction::parse(&request.action);
        let Some(migrated) = action.migrated() else {
            warn!(action = %request.action, "Unsupported legacy action");
            return Err(OrchestrationError::UnsupportedAction(request.action));
        };

        info!(action = action.as_str(), "Translating legacy request");

        // Subject identity is fixed before the policy sees the payload
        let subject_id = request
            .subject_id
            .clone()
            .or_else(|| subject_id_from(&request.data));

        let owning_fund = match migrated {
            MigratedAction::CalculateOverallScore => request.fund_id.clone(),
            _ => {
                let owner = self
                    .orchestrator
                    .subject(require_subject(&subject_id)?)
                    .await?
                    .fund_id;
                if let Some(claimed) = request.fund_id.as_deref() {
                    if claimed != owner {
                        warn!(
                            action = action.as_str(),
                            claimed_fund = claimed,
                            "Legacy request names a fund that does not own the subject"
                        );
                        return Err(OrchestrationError::DataFlowBlocked(
                            "fundId does not own the requested subject".to_string(),
                        ));
                    }
                }
                Some(owner)
            }
        };

        let data = self
            .check_policy(&action, owning_fund.as_deref(), &request.data)
            .await?;

        let (analysis, payload, subject) = match migrated {
            MigratedAction::ComprehensiveAnalysis => {
                let report = self
                    .orchestrator
                    .run_detailed(require_subject(&subject_id)?)
                    .await?;
                (Some(report.result), None, Some(report.subject))
            }
            MigratedAction::EnrichDeal => {
                let (context, enrichment) =
                    self.orchestrator.enrich(require_subject(&subject_id)?).await?;
                let payload = json!({
                    "subjectId": context.subject.subject_id,
                    "enrichment": enrichment,
                    "research_available": enrichment.is_some(),
                });
                (None, Some(payload), Some(context.subject.clone()))
            }
            MigratedAction::AnalyzeCriteria => {
                let report = self
                    .orchestrator
                    .run_detailed(require_subject(&subject_id)?)
                    .await?;
                let payload = criteria_payload(&report.result);
                (Some(report.result), Some(payload), Some(report.subject))
            }
            MigratedAction::GenerateIcMemo => {
                let report = self
                    .orchestrator
                    .run_detailed(require_subject(&subject_id)?)
                    .await?;
                let memo = render_ic_memo(&report.subject.name, &report.result);
                (Some(report.result), Some(json!({ "memo": memo })), Some(report.subject))
            }
            MigratedAction::CalculateOverallScore => {
                let payload = self
                    .calculate_overall_score(&data, request.fund_id.as_deref())
                    .await?;
                (None, Some(payload), None)
            }
        };

        self.log_migration(migrated, subject.as_ref());

        Ok(LegacyResponse {
            success: true,
            action: action.as_str().to_string(),
            analysis,
            data: payload,
            migration_note: action.migration_note(),
            timestamp: Utc::now(),
        })
    }

    /// Returns the payload to use: the policy's rewrite, or the original.
    async fn check_policy(
        &self,
        action: &LegacyAction,
        fund_id: Option<&str>,
        data: &Value,
    ) -> Result<Value> {
        let (Some(policy), Some(fund_id)) = (&self.policy, fund_id) else {
            return Ok(data.clone());
        };

        let flow = FlowRequest {
            source: POLICY_SOURCE.to_string(),
            target: action.as_str().to_string(),
            fund_id: fund_id.to_string(),
            data: data.clone(),
        };

        let decision = match policy.validate_flow(&flow).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(action = action.as_str(), error = %e, "Policy check failed, blocking");
                return Err(OrchestrationError::DataFlowBlocked(format!(
                    "policy check unavailable: {}",
                    e
                )));
            }
        };

        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "rejected by data-flow policy".to_string());
            info!(action = action.as_str(), reason = %reason, "Legacy call blocked by policy");
            return Err(OrchestrationError::DataFlowBlocked(reason));
        }

        Ok(decision.sanitized_data.unwrap_or(flow.data))
    }

    /// Score a caller-supplied `{category: score}` map; no engines involved.
    async fn calculate_overall_score(&self, data: &Value, fund_id: Option<&str>) -> Result<Value> {
        let raw = data
            .get("scores")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                OrchestrationError::InvalidRequest("data.scores must be an object".to_string())
            })?;

        let mut scores: BTreeMap<Category, f64> = BTreeMap::new();
        let mut ignored = Vec::new();
        for (name, value) in raw {
            match (match_category(name), value.as_f64()) {
                (Some(category), Some(score)) => {
                    scores.insert(category, score);
                }
                _ => ignored.push(name.clone()),
            }
        }

        let strategy = match fund_id {
            Some(fund_id) => self.orchestrator.resolve_strategy(fund_id).await,
            None => Default::default(),
        };

        let overall = ScoreAggregator::new().aggregate_scores(&scores, &strategy.weights);
        let band = RagClassifier::classify(overall as f64, &strategy.thresholds);

        Ok(json!({
            "overall_score": overall,
            "rag_band": band,
            "recommendation": RagClassifier::recommendation(band),
            "scored_categories": scores.keys().collect::<Vec<_>>(),
            "ignored": ignored,
        }))
    }

    fn log_migration(&self, action: MigratedAction, subject: Option<&SubjectRecord>) {
        let record = sanitize_migration(action, subject);
        // Detached; failures are logged by the publisher
        drop(
            self.orchestrator
                .publisher()
                .push(SanitizedRecord::LegacyMigration(record)),
        );
    }
}

fn subject_id_from(data: &Value) -> Option<String> {
    ["subjectId", "subject_id", "dealId", "deal_id"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn require_subject(subject_id: &Option<String>) -> Result<&str> {
    subject_id.as_deref().ok_or_else(|| {
        OrchestrationError::InvalidRequest("subjectId is required for this action".to_string())
    })
}

fn criteria_payload(result: &AggregateResult) -> Value {
    let criteria: Vec<Value> = result
        .category_results
        .iter()
        .map(|(category, r)| {
            json!({
                "category": category,
                "label": category.label(),
                "score": r.score,
                "confidence": r.confidence,
                "validation_status": r.validation_status,
            })
        })
        .collect();

    json!({
        "overall_score": result.overall_score,
        "rag_band": result.rag_band,
        "criteria": criteria,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::ConfigLoader;
    use crate::context::ContextAssembler;
    use crate::engines::mock::{MockEngine, MockResearchEngine};
    use crate::engines::{EngineGateway, EngineRegistry, GatewayConfig};
    use crate::memory::InMemoryMemoryStore;
    use crate::models::{RagBand, ResearchEnrichment};
    use crate::narrative::NarrativeComposer;
    use crate::policy::{create_default_policy, FlowDecision};
    use crate::publish::ResultPublisher;
    use crate::state::InMemoryStore;

    struct Harness {
        adapter: LegacyAdapter,
        engines: Vec<Arc<MockEngine>>,
        research: Arc<MockResearchEngine>,
        memory: Arc<InMemoryMemoryStore>,
    }

    struct FailingPolicy;

    #[async_trait::async_trait]
    impl DataFlowPolicy for FailingPolicy {
        async fn validate_flow(&self, _request: &FlowRequest) -> Result<FlowDecision> {
            Err(OrchestrationError::PolicyError("policy service timeout".into()))
        }
    }

    /// Swaps the caller's scores for its own.
    struct RewritingPolicy;

    #[async_trait::async_trait]
    impl DataFlowPolicy for RewritingPolicy {
        async fn validate_flow(&self, request: &FlowRequest) -> Result<FlowDecision> {
            let mut data = request.data.clone();
            data["scores"] = json!({"Team": 40});
            Ok(FlowDecision {
                allowed: true,
                reason: None,
                sanitized_data: Some(data),
            })
        }
    }

    fn subject(id: &str, fund_id: &str, name: &str) -> SubjectRecord {
        SubjectRecord {
            subject_id: id.into(),
            fund_id: fund_id.into(),
            name: name.into(),
            category: Some("Healthtech".into()),
            size: None,
            stage: Some("Seed".into()),
            description: None,
            last_overall_score: None,
            last_rag_band: None,
            analysis_version: 0,
        }
    }

    async fn harness(policy: Option<Arc<dyn DataFlowPolicy>>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        store.insert_subject(subject("deal-9", "fund-ok", "Northwind")).await;
        store.insert_subject(subject("deal-7", "fund-blocked", "Southwind")).await;

        let mut registry = EngineRegistry::new();
        let mut engines = Vec::new();
        for category in Category::ALL {
            let engine = Arc::new(MockEngine::scoring(category.as_str(), 72.0, 80.0));
            engines.push(engine.clone());
            registry.register(category, engine);
        }
        let research = Arc::new(MockResearchEngine::returning(ResearchEnrichment {
            summary: "Growing".into(),
            opportunities: vec!["Hospitals".into()],
            risks: vec![],
            sources: vec![],
        }));
        registry.register_research(research.clone());

        let memory = Arc::new(InMemoryMemoryStore::new());
        let orchestrator = Orchestrator::new(
            ContextAssembler::new(store.clone(), ConfigLoader::defaults_only()),
            EngineGateway::new(registry, GatewayConfig::default()),
            NarrativeComposer::new(),
            ResultPublisher::new(store, memory.clone()),
            AuditLog::new(),
        );

        let mut adapter = LegacyAdapter::new(Arc::new(orchestrator));
        if let Some(policy) = policy {
            adapter = adapter.with_policy(policy);
        }

        Harness {
            adapter,
            engines,
            research,
            memory,
        }
    }

    fn request(action: &str, data: Value, fund_id: Option<&str>) -> LegacyRequest {
        LegacyRequest {
            action: action.into(),
            data,
            subject_id: None,
            fund_id: fund_id.map(str::to_string),
        }
    }

    fn engine_calls(h: &Harness) -> usize {
        h.engines.iter().map(|e| e.call_count()).sum::<usize>() + h.research.call_count()
    }

    #[test]
    fn test_request_aliases() {
        let parsed: LegacyRequest = serde_json::from_str(
            r#"{"action": "enrich_deal", "data": {"dealId": "d"}, "fundId": "f"}"#,
        )
        .unwrap();
        assert_eq!(parsed.fund_id.as_deref(), Some("f"));
        assert_eq!(subject_id_from(&parsed.data).as_deref(), Some("d"));
        assert_eq!(LegacyAction::parse("enrich_deal"), LegacyAction::EnrichDeal);
        assert_eq!(
            LegacyAction::parse("delete_everything"),
            LegacyAction::Unsupported("delete_everything".into())
        );
    }

    #[tokio::test]
    async fn test_blocked_fund_invokes_no_engine() {
        let h = harness(Some(Arc::new(create_default_policy(["fund-blocked"])))).await;

        for fund_id in [Some("fund-blocked"), None] {
            let err = h
                .adapter
                .handle(request("enrich_deal", json!({"dealId": "deal-7"}), fund_id))
                .await
                .unwrap_err();

            assert!(matches!(err, OrchestrationError::DataFlowBlocked(ref r) if r.contains("fund policy forbids")));
            assert!(err.to_string().starts_with("Data flow blocked: "));
        }
        assert_eq!(engine_calls(&h), 0);
        assert_eq!(h.memory.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_claimed_fund_must_own_subject() {
        let h = harness(Some(Arc::new(create_default_policy(["fund-blocked"])))).await;

        let err = h
            .adapter
            .handle(request(
                "comprehensive_analysis",
                json!({"subjectId": "deal-7"}),
                Some("fund-ok"),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::DataFlowBlocked(ref r) if r.contains("does not own")));
        assert_eq!(engine_calls(&h), 0);
        assert_eq!(h.memory.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_policy_rewrite_is_what_gets_dispatched() {
        let h = harness(Some(Arc::new(RewritingPolicy))).await;

        let response = h
            .adapter
            .handle(request(
                "calculate_overall_score",
                json!({"scores": {"Team": 95, "Market": 95}}),
                Some("fund-ok"),
            ))
            .await
            .unwrap();

        let data = response.data.unwrap();
        assert_eq!(data["overall_score"], json!(40));
        assert_eq!(data["scored_categories"], json!(["team"]));
        assert_eq!(data["rag_band"], json!("not_aligned"));
        assert_eq!(engine_calls(&h), 0);
    }

    #[tokio::test]
    async fn test_policy_error_fails_closed() {
        let h = harness(Some(Arc::new(FailingPolicy))).await;

        let err = h
            .adapter
            .handle(request("comprehensive_analysis", json!({"subjectId": "deal-9"}), Some("fund-ok")))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::DataFlowBlocked(_)));
        assert_eq!(engine_calls(&h), 0);
    }

    #[tokio::test]
    async fn test_enrich_deal_runs_research_only() {
        let h = harness(Some(Arc::new(create_default_policy(["fund-blocked"])))).await;

        let response = h
            .adapter
            .handle(request("enrich_deal", json!({"dealId": "deal-9"}), Some("fund-ok")))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.data.unwrap()["research_available"], json!(true));
        assert_eq!(h.research.call_count(), 1);
        assert!(h.engines.iter().all(|e| e.call_count() == 0));
    }

    #[tokio::test]
    async fn test_comprehensive_analysis_logs_migration() {
        let h = harness(None).await;

        let response = h
            .adapter
            .handle(request("comprehensive_analysis", json!({"subjectId": "deal-9"}), None))
            .await
            .unwrap();

        let analysis = response.analysis.unwrap();
        assert_eq!(analysis.overall_score, 72);
        assert_eq!(analysis.rag_band, RagBand::Promising);
        assert!(response.migration_note.starts_with("Deprecated"));

        // Detached writes: wait for both the insight and the migration record
        for _ in 0..50 {
            if h.memory.record_count().await >= 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let kinds: Vec<&str> = h.memory.records().await.iter().map(|r| r.kind()).collect();
        assert!(kinds.contains(&"legacy_migration"));
        assert!(kinds.contains(&"deal_insight"));
    }

    #[tokio::test]
    async fn test_generate_ic_memo() {
        let h = harness(None).await;

        let response = h
            .adapter
            .handle(request("generate_ic_memo", json!({"dealId": "deal-9"}), None))
            .await
            .unwrap();
        let memo = response.data.unwrap()["memo"].as_str().unwrap().to_string();
        assert!(memo.contains("Investment Committee Memo: Northwind"));
    }

    #[tokio::test]
    async fn test_calculate_overall_score_needs_no_engines() {
        let h = harness(None).await;

        let response = h
            .adapter
            .handle(request(
                "calculate_overall_score",
                json!({"scores": {"Market Opportunity": 90, "Team": 90, "ESG": 10}}),
                None,
            ))
            .await
            .unwrap();

        let data = response.data.unwrap();
        assert_eq!(data["overall_score"], json!(90));
        assert_eq!(data["rag_band"], json!("exciting"));
        assert_eq!(data["ignored"], json!(["ESG"]));
        assert_eq!(engine_calls(&h), 0);
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_subject() {
        let h = harness(None).await;

        let err = h
            .adapter
            .handle(request("export_pdf", Value::Null, None))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::UnsupportedAction(a) if a == "export_pdf"));

        let err = h
            .adapter
            .handle(request("analyze_criteria", json!({}), None))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidRequest(_)));
    }
}
