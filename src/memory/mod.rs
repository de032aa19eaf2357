//! Cross-fund memory
//!
//! A shared store of anonymized deal patterns. Only [`SanitizedRecord`]s
//! cross into it; the types in [`sanitize`] have no field able to hold a
//! fund or subject identifier.

pub mod sanitize;
pub mod store;

pub use sanitize::{
    sanitize_analysis, sanitize_migration, DealInsight, EnginePattern, IndustryBucket,
    MigratedAction, MigrationRecord, PatternStrength, SizeBucket, StageBucket,
};
pub use store::InMemoryMemoryStore;

use crate::Result;
use serde::{Deserialize, Serialize};

/// Anything allowed across the air gap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum SanitizedRecord {
    DealInsight(DealInsight),
    LegacyMigration(MigrationRecord),
}

impl SanitizedRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            SanitizedRecord::DealInsight(_) => "deal_insight",
            SanitizedRecord::LegacyMigration(_) => "legacy_migration",
        }
    }
}

/// Long-term cross-fund memory. Best-effort relative to the fund's own result.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store_sanitized_insight(&self, record: SanitizedRecord) -> Result<()>;
}
