//! REST API server for the deal analysis orchestrator
//!
//! One analysis endpoint serves both request shapes:
//! - `{ "subjectId": ... }` runs the pipeline
//! - `{ "action": ..., "data": ..., "fundId"?: ... }` goes through the legacy adapter

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::legacy::{LegacyAdapter, LegacyRequest};
use crate::policy::DataFlowPolicy;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeSubjectRequest {
    #[serde(rename = "subjectId", alias = "subject_id")]
    pub subject_id: String,
}

/// Legacy is tried first: only it has a required `action`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeRequest {
    Legacy(LegacyRequest),
    Current(AnalyzeSubjectRequest),
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn analysis<T: Serialize>(analysis: T) -> Self {
        Self {
            success: true,
            analysis: serde_json::to_value(analysis).ok(),
            data: None,
            migration_note: None,
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            analysis: None,
            data: None,
            migration_note: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub legacy: Arc<LegacyAdapter>,
}

/// =============================
/// Error Mapping
/// =============================

pub fn status_for(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::SubjectNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::DataFlowBlocked(_) => StatusCode::FORBIDDEN,
        OrchestrationError::InvalidRequest(_) | OrchestrationError::UnsupportedAction(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(error = %error, "Analysis request failed");
    } else {
        info!(status = status.as_u16(), error = %error, "Analysis request rejected");
    }
    (status, Json(ApiResponse::error(error.to_string())))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<ApiResponse>) {
    let request: AnalyzeRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(_) => {
            return error_response(OrchestrationError::InvalidRequest(
                "expected {\"subjectId\"} or {\"action\", \"data\"}".to_string(),
            ))
        }
    };

    match request {
        AnalyzeRequest::Current(req) => {
            info!(subject_id = %req.subject_id, "Received analysis request");

            match state.orchestrator.run(&req.subject_id).await {
                Ok(result) => (StatusCode::OK, Json(ApiResponse::analysis(result))),
                Err(e) => error_response(e),
            }
        }

        AnalyzeRequest::Legacy(req) => {
            info!(action = %req.action, "Received legacy request");

            match state.legacy.handle(req).await {
                Ok(response) => {
                    let body = ApiResponse {
                        success: response.success,
                        analysis: response
                            .analysis
                            .and_then(|analysis| serde_json::to_value(analysis).ok()),
                        data: response.data,
                        migration_note: Some(response.migration_note),
                        error: None,
                        timestamp: response.timestamp.to_rfc3339(),
                    };
                    (StatusCode::OK, Json(body))
                }
                Err(e) => error_response(e),
            }
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(
    orchestrator: Arc<Orchestrator>,
    policy: Option<Arc<dyn DataFlowPolicy>>,
) -> Router {
    let mut legacy = LegacyAdapter::new(Arc::clone(&orchestrator));
    if let Some(policy) = policy {
        legacy = legacy.with_policy(policy);
    }

    let state = ApiState {
        orchestrator,
        legacy: Arc::new(legacy),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    router: Router,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::ConfigLoader;
    use crate::context::ContextAssembler;
    use crate::engines::mock::{create_mock_registry, MockEngine};
    use crate::engines::{EngineGateway, EngineRegistry, GatewayConfig};
    use crate::memory::InMemoryMemoryStore;
    use crate::models::{Category, SubjectRecord};
    use crate::narrative::NarrativeComposer;
    use crate::policy::create_default_policy;
    use crate::publish::ResultPublisher;
    use crate::state::InMemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn router_with(registry: EngineRegistry) -> Router {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_subject(SubjectRecord {
                subject_id: "deal-1".into(),
                fund_id: "fund-1".into(),
                name: "Acme".into(),
                category: None,
                size: None,
                stage: None,
                description: None,
                last_overall_score: None,
                last_rag_band: None,
                analysis_version: 0,
            })
            .await;

        let orchestrator = Orchestrator::new(
            ContextAssembler::new(store.clone(), ConfigLoader::defaults_only()),
            EngineGateway::new(registry, GatewayConfig::default()),
            NarrativeComposer::new(),
            ResultPublisher::new(store, Arc::new(InMemoryMemoryStore::new())),
            AuditLog::new(),
        );

        create_router(
            Arc::new(orchestrator),
            Some(Arc::new(create_default_policy(["fund-blocked"]))),
        )
    }

    async fn post_json(router: Router, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/analyze")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_request_shapes() {
        let current: AnalyzeRequest =
            serde_json::from_value(serde_json::json!({"subjectId": "d"})).unwrap();
        assert!(matches!(current, AnalyzeRequest::Current(r) if r.subject_id == "d"));

        let legacy: AnalyzeRequest = serde_json::from_value(
            serde_json::json!({"action": "enrich_deal", "data": {}, "subjectId": "d"}),
        )
        .unwrap();
        assert!(matches!(legacy, AnalyzeRequest::Legacy(_)));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&OrchestrationError::SubjectNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&OrchestrationError::DataFlowBlocked("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&OrchestrationError::UnsupportedAction("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&OrchestrationError::StateError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_health() {
        let router = router_with(EngineRegistry::new()).await;
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_subject() {
        let router = router_with(create_mock_registry()).await;
        let (status, body) = post_json(router, serde_json::json!({"subjectId": "deal-1"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], Value::Bool(true));
        assert_eq!(body["analysis"]["analysis_version"], 1);
        assert!(body["analysis"]["category_results"]["strategic-fit"].is_object());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_unknown_subject_is_404() {
        let router = router_with(create_mock_registry()).await;
        let (status, body) = post_json(router, serde_json::json!({"subjectId": "nope"})).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], Value::Bool(false));
    }

    #[tokio::test]
    async fn test_blocked_legacy_call_is_403() {
        let engine = Arc::new(MockEngine::scoring("market", 80.0, 80.0));
        let mut registry = EngineRegistry::new();
        registry.register(Category::Market, engine.clone());

        let router = router_with(registry).await;
        let (status, body) = post_json(
            router,
            serde_json::json!({
                "action": "enrich_deal",
                "data": {"dealId": "deal-1"},
                "fundId": "fund-blocked"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Data flow blocked: "));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn test_legacy_call_carries_migration_note() {
        let router = router_with(create_mock_registry()).await;
        let (status, body) = post_json(
            router,
            serde_json::json!({"action": "comprehensive_analysis", "data": {"subjectId": "deal-1"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["migration_note"].as_str().unwrap().starts_with("Deprecated"));
        assert!(body["analysis"]["overall_score"].is_u64());
    }

    #[tokio::test]
    async fn test_unsupported_action_and_bad_shape_are_400() {
        let router = router_with(create_mock_registry()).await;
        let (status, body) =
            post_json(router.clone(), serde_json::json!({"action": "export_pdf"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("migration guide"));

        let (status, _) = post_json(router, serde_json::json!({"foo": 1})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
