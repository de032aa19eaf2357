use deal_analysis_orchestrator::{
    agent::Orchestrator,
    api::{create_router, start_server},
    audit::AuditLog,
    config::{settings::Settings, ConfigLoader, TomlStrategySource},
    context::ContextAssembler,
    engines::{http::create_http_registry, mock::create_mock_registry, EngineGateway, GatewayConfig},
    memory::{InMemoryMemoryStore, MemoryStore},
    narrative::{GeminiNarrativeBackend, NarrativeComposer},
    policy::{create_default_policy, DataFlowPolicy},
    publish::ResultPublisher,
    state::{InMemoryStore, PgStore, ResultStore, SubjectStore},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    info!("🚀 Deal Analysis Orchestrator - API Server");
    info!("📍 Port: {}", settings.port);

    // Engines
    let registry = match &settings.engine_base_url {
        Some(base_url) => {
            info!("Scoring engines: {}", base_url);
            create_http_registry(base_url, settings.engine_timeout)?
        }
        None => {
            warn!("ENGINE_BASE_URL not set, using mock engines");
            create_mock_registry()
        }
    };
    let gateway = EngineGateway::new(
        registry,
        GatewayConfig {
            engine_timeout: settings.engine_timeout,
            run_timeout: settings.run_timeout,
        },
    );

    // Persistence
    let pg = match &settings.database_url {
        Some(url) => Some(PgStore::connect_lazy(url)?),
        None => None,
    };
    let subjects: Arc<dyn SubjectStore>;
    let results: Arc<dyn ResultStore>;
    let memory: Arc<dyn MemoryStore>;
    match &pg {
        Some(pg) => {
            let pg = Arc::new(pg.clone());
            subjects = pg.clone();
            results = pg.clone();
            memory = pg;
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory stores");
            let store = Arc::new(InMemoryStore::new());
            subjects = store.clone();
            results = store;
            memory = Arc::new(InMemoryMemoryStore::new());
        }
    }

    // Fund strategies
    let config_loader = match (&settings.strategy_file, &pg) {
        (Some(path), _) => {
            let source = TomlStrategySource::from_file(path)?;
            info!("Loaded {} fund strategies from {}", source.fund_count(), path.display());
            ConfigLoader::new(Arc::new(source))
        }
        (None, Some(pg)) => ConfigLoader::new(Arc::new(pg.clone())),
        (None, None) => ConfigLoader::defaults_only(),
    };

    // Narrative
    let narrative = match &settings.gemini_api_key {
        Some(key) => {
            let backend = GeminiNarrativeBackend::new(key.clone())?;
            NarrativeComposer::with_backend(Arc::new(backend), settings.narrative_timeout)
        }
        None => {
            warn!("GEMINI_API_KEY not set, executive summaries will be templated");
            NarrativeComposer::new()
        }
    };

    // Create orchestrator
    let orchestrator = Arc::new(Orchestrator::new(
        ContextAssembler::new(subjects, config_loader),
        gateway,
        narrative,
        ResultPublisher::new(results, memory),
        AuditLog::new(),
    ));

    let policy: Arc<dyn DataFlowPolicy> =
        Arc::new(create_default_policy(settings.blocked_funds.clone()));

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    start_server(create_router(orchestrator, Some(policy)), settings.port).await?;

    Ok(())
}
