//! Scoring engines and their registry
//!
//! Engines are opaque, independently deployed collaborators. Each one scores
//! a single category against the shared [`EngineContext`].

pub mod gateway;
pub mod http;
pub mod mock;

pub use gateway::{EngineGateway, GatewayConfig, GatewayOutcome};

use crate::models::{Category, EngineContext, EngineOutput, ResearchEnrichment};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// A category scoring engine
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, context: &EngineContext) -> Result<EngineOutput>;
}

/// The best-effort research engine. Feeds narrative only, never the score.
#[async_trait::async_trait]
pub trait ResearchEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn research(&self, context: &EngineContext) -> Result<ResearchEnrichment>;
}

/// Engine registry keyed by roster category
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<Category, Arc<dyn Engine>>,
    research: Option<Arc<dyn ResearchEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: Category, engine: Arc<dyn Engine>) {
        self.engines.insert(category, engine);
    }

    pub fn register_research(&mut self, engine: Arc<dyn ResearchEngine>) {
        self.research = Some(engine);
    }

    pub fn get(&self, category: Category) -> Option<Arc<dyn Engine>> {
        self.engines.get(&category).cloned()
    }

    pub fn research(&self) -> Option<Arc<dyn ResearchEngine>> {
        self.research.clone()
    }

    /// Registered roster categories, in roster order
    pub fn registered(&self) -> Vec<Category> {
        Category::ALL
            .iter()
            .copied()
            .filter(|c| self.engines.contains_key(c))
            .collect()
    }
}
