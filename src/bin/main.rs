use deal_analysis_orchestrator::{
    agent::Orchestrator,
    audit::AuditLog,
    config::ConfigLoader,
    context::ContextAssembler,
    engines::{mock::create_mock_registry, EngineGateway, GatewayConfig},
    memory::InMemoryMemoryStore,
    models::{AgentInteraction, DocumentRef, NoteSignal, SubjectRecord},
    narrative::{render_ic_memo, NarrativeComposer},
    publish::ResultPublisher,
    state::InMemoryStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    info!("Deal Analysis Orchestrator starting");

    // Seed a subject
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_subject(SubjectRecord {
            subject_id: "deal-demo".to_string(),
            fund_id: "fund-demo".to_string(),
            name: "Northwind Logistics".to_string(),
            category: Some("Supply Chain Software".to_string()),
            size: Some(12_000_000.0),
            stage: Some("Series B".to_string()),
            description: Some("Routing and freight visibility for mid-market shippers".to_string()),
            last_overall_score: None,
            last_rag_band: None,
            analysis_version: 0,
        })
        .await;
    store
        .add_document(
            "deal-demo",
            DocumentRef {
                document_id: "doc-1".to_string(),
                title: "Management presentation".to_string(),
                kind: Some("deck".to_string()),
                excerpt: Some("Net revenue retention of 118% across the top cohort".to_string()),
            },
        )
        .await;
    store
        .add_note(
            "deal-demo",
            NoteSignal {
                text: "Strong founder references, churn worth a second look".to_string(),
                tags: vec!["team".to_string(), "retention".to_string()],
                created_at: chrono::Utc::now(),
            },
        )
        .await;

    store
        .add_interaction(
            "deal-demo",
            AgentInteraction {
                agent: "sourcing".to_string(),
                summary: "Warm intro via portfolio CEO, first call held".to_string(),
                occurred_at: chrono::Utc::now(),
            },
        )
        .await;

    // Create components
    let memory = Arc::new(InMemoryMemoryStore::new());
    let assembler = ContextAssembler::new(store.clone(), ConfigLoader::defaults_only());
    let gateway = EngineGateway::new(create_mock_registry(), GatewayConfig::default());
    let publisher = ResultPublisher::new(store.clone(), memory.clone());

    // Create orchestrator
    let orchestrator = Orchestrator::new(
        assembler,
        gateway,
        NarrativeComposer::new(),
        publisher,
        AuditLog::new(),
    );

    info!("Running comprehensive analysis for deal-demo");
    let report = orchestrator.run_detailed("deal-demo").await?;
    let pushed = report.insight_push.await.unwrap_or(false);

    println!("\n=== Analysis Result ===");
    println!("Run ID: {}", report.run_id);
    println!("Overall Score: {}", report.result.overall_score);
    println!("RAG Band: {}", report.result.rag_band);
    println!("Recommendation: {}", report.result.recommendation);
    println!("Confidence: {:?}", report.result.confidence_level);
    println!("Version: {}", report.result.analysis_version);
    println!("Persisted: {}", report.persisted);
    println!("Insight pushed: {}", pushed);

    println!("\n=== Reasoning Trace ===");
    for step in &report.reasoning_trace {
        println!("  {}", step);
    }

    println!("\n{}", render_ic_memo(&report.subject.name, &report.result));

    Ok(())
}
