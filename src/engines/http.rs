//! HTTP-backed engines
//!
//! Each deployed engine answers `POST {base}/engines/{name}` with an
//! [`EngineOutput`]; the research engine answers `POST {base}/engines/research`
//! with a [`ResearchEnrichment`].

use crate::engines::{Engine, EngineRegistry, ResearchEngine};
use crate::error::OrchestrationError;
use crate::models::{Category, EngineContext, EngineOutput, ResearchEnrichment};
use crate::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const RESEARCH_ENGINE_NAME: &str = "research";

/// Connection-pooled client shared by every HTTP engine
#[derive(Clone)]
pub struct EngineApiClient {
    client: Client,
    base_url: String,
}

impl EngineApiClient {
    /// `request_timeout` is a transport guard; the gateway applies the
    /// per-engine deadline on top.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_engine<T: DeserializeOwned>(
        &self,
        engine: &str,
        context: &EngineContext,
    ) -> Result<T> {
        let url = format!("{}/engines/{}", self.base_url, engine);
        debug!(engine, url = %url, "Invoking remote engine");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "engine": engine,
                "context": context,
            }))
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::EngineError(format!("{} request failed: {}", engine, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::EngineError(format!(
                "{} returned {}: {}",
                engine, status, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            OrchestrationError::EngineError(format!("{} returned invalid JSON: {}", engine, e))
        })
    }
}

pub struct HttpEngine {
    name: String,
    api: EngineApiClient,
}

impl HttpEngine {
    pub fn new(name: impl Into<String>, api: EngineApiClient) -> Self {
        Self {
            name: name.into(),
            api,
        }
    }
}

#[async_trait::async_trait]
impl Engine for HttpEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, context: &EngineContext) -> Result<EngineOutput> {
        self.api.post_engine(&self.name, context).await
    }
}

pub struct HttpResearchEngine {
    api: EngineApiClient,
}

impl HttpResearchEngine {
    pub fn new(api: EngineApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ResearchEngine for HttpResearchEngine {
    fn name(&self) -> &str {
        RESEARCH_ENGINE_NAME
    }

    async fn research(&self, context: &EngineContext) -> Result<ResearchEnrichment> {
        self.api.post_engine(RESEARCH_ENGINE_NAME, context).await
    }
}

/// Registry with one HTTP engine per roster category plus research.
pub fn create_http_registry(base_url: &str, request_timeout: Duration) -> Result<EngineRegistry> {
    let api = EngineApiClient::new(base_url, request_timeout)?;
    let mut registry = EngineRegistry::new();

    for category in Category::ALL {
        registry.register(
            category,
            Arc::new(HttpEngine::new(category.as_str(), api.clone())),
        );
    }
    registry.register_research(Arc::new(HttpResearchEngine::new(api)));

    Ok(registry)
}
