//! Fund strategy resolution
//!
//! Resolves a fund's weighting hints and band thresholds. Absence or
//! breakage of configuration degrades to defaults; it never fails a run.

pub mod settings;

pub use settings::Settings;

use crate::models::{FundStrategy, Thresholds};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Source of per-fund strategies (fund administration owns the data)
#[async_trait]
pub trait StrategySource: Send + Sync {
    async fn load_strategy(&self, fund_id: &str) -> Result<Option<FundStrategy>>;
}

/// Resolves strategies with default fallback
#[derive(Clone)]
pub struct ConfigLoader {
    source: Option<Arc<dyn StrategySource>>,
}

impl ConfigLoader {
    pub fn new(source: Arc<dyn StrategySource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Loader that always yields the default strategy.
    pub fn defaults_only() -> Self {
        Self { source: None }
    }

    /// Resolve the strategy for a fund. Never fails.
    pub async fn resolve(&self, fund_id: &str) -> FundStrategy {
        let Some(source) = &self.source else {
            return FundStrategy::default();
        };

        let loaded = match source.load_strategy(fund_id).await {
            Ok(Some(strategy)) => strategy,
            Ok(None) => {
                debug!(fund_id, "No strategy configured, using defaults");
                return FundStrategy::default();
            }
            Err(e) => {
                warn!(fund_id, error = %e, "Strategy lookup failed, using defaults");
                return FundStrategy::default();
            }
        };

        sanitize_strategy(fund_id, loaded)
    }
}

/// Drop unusable parts of a loaded strategy, keeping the rest.
fn sanitize_strategy(fund_id: &str, mut strategy: FundStrategy) -> FundStrategy {
    if !strategy.thresholds.is_valid() {
        warn!(
            fund_id,
            thresholds = ?strategy.thresholds,
            "Fund thresholds are not strictly ascending within 0-100, using defaults"
        );
        strategy.thresholds = Thresholds::default();
    }

    strategy.weights.retain(|name, weight| {
        let usable = weight.is_finite() && *weight >= 0.0;
        if !usable {
            warn!(fund_id, category = %name, weight = *weight, "Ignoring invalid weight hint");
        }
        usable
    });

    for weight in strategy.weights.values_mut() {
        *weight = weight.min(100.0);
    }

    strategy
}

//
// ================= In-memory source =================
//

#[derive(Default)]
pub struct InMemoryStrategySource {
    strategies: Arc<RwLock<HashMap<String, FundStrategy>>>,
}

impl InMemoryStrategySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, fund_id: impl Into<String>, strategy: FundStrategy) {
        let mut strategies = self.strategies.write().await;
        strategies.insert(fund_id.into(), strategy);
    }
}

#[async_trait]
impl StrategySource for InMemoryStrategySource {
    async fn load_strategy(&self, fund_id: &str) -> Result<Option<FundStrategy>> {
        let strategies = self.strategies.read().await;
        Ok(strategies.get(fund_id).cloned())
    }
}

//
// ================= TOML file source =================
//

#[derive(Debug, Default, Deserialize)]
struct StrategyFile {
    #[serde(default)]
    funds: BTreeMap<String, FundStrategy>,
}

/// Strategies read once from a TOML file of `[funds.<fund_id>]` tables.
pub struct TomlStrategySource {
    strategies: BTreeMap<String, FundStrategy>,
}

impl TomlStrategySource {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: StrategyFile = toml::from_str(content)?;
        Ok(Self {
            strategies: file.funds,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn fund_count(&self) -> usize {
        self.strategies.len()
    }
}

#[async_trait]
impl StrategySource for TomlStrategySource {
    async fn load_strategy(&self, fund_id: &str) -> Result<Option<FundStrategy>> {
        Ok(self.strategies.get(fund_id).cloned())
    }
}
