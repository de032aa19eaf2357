//! Core data models for deal analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Enums =================
//

/// Closed set of scored evaluation categories.
///
/// Declaration order is roster order; `Ord` follows it so a
/// `BTreeMap<Category, _>` iterates in roster order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    StrategicFit,
    Market,
    Product,
    Financial,
    Team,
}

impl Category {
    /// The fixed engine roster, in invocation order.
    pub const ALL: [Category; 5] = [
        Category::StrategicFit,
        Category::Market,
        Category::Product,
        Category::Financial,
        Category::Team,
    ];

    /// Engine name as deployed.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::StrategicFit => "strategic-fit",
            Category::Market => "market",
            Category::Product => "product",
            Category::Financial => "financial",
            Category::Team => "team",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::StrategicFit => "Strategic Fit",
            Category::Market => "Market",
            Category::Product => "Product",
            Category::Financial => "Financial",
            Category::Team => "Team",
        }
    }

    /// Weight used when the fund supplies no usable hints. Sums to 1.0.
    pub fn default_weight(&self) -> f64 {
        match self {
            Category::StrategicFit => 0.25,
            Category::Market => 0.20,
            Category::Product => 0.20,
            Category::Financial => 0.20,
            Category::Team => 0.15,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Validated,
    Partial,
    Unvalidated,
}

/// Recommendation tier, best first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RagBand {
    Exciting,
    Promising,
    NeedsDevelopment,
    NotAligned,
}

impl RagBand {
    /// Higher is better.
    pub fn rank(&self) -> u8 {
        match self {
            RagBand::NotAligned => 0,
            RagBand::NeedsDevelopment => 1,
            RagBand::Promising => 2,
            RagBand::Exciting => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RagBand::Exciting => "exciting",
            RagBand::Promising => "promising",
            RagBand::NeedsDevelopment => "needs_development",
            RagBand::NotAligned => "not_aligned",
        }
    }
}

impl fmt::Display for RagBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RagBand::Exciting => "Exciting",
            RagBand::Promising => "Promising",
            RagBand::NeedsDevelopment => "Needs Development",
            RagBand::NotAligned => "Not Aligned",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

//
// ================= Subject & Fund =================
//

/// The deal being analyzed. Created and edited outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: String,
    pub fund_id: String,
    pub name: String,
    /// Free-text industry / sector.
    #[serde(default)]
    pub category: Option<String>,
    /// Deal size in USD.
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub description: Option<String>,

    // Written back by the pipeline
    #[serde(default)]
    pub last_overall_score: Option<u8>,
    #[serde(default)]
    pub last_rag_band: Option<RagBand>,
    #[serde(default)]
    pub analysis_version: u32,
}

/// Score boundaries, strictly ascending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub needs_development: f64,
    pub promising: f64,
    pub exciting: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            needs_development: 50.0,
            promising: 70.0,
            exciting: 85.0,
        }
    }
}

impl Thresholds {
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);

        in_range(self.needs_development)
            && in_range(self.promising)
            && in_range(self.exciting)
            && self.needs_development < self.promising
            && self.promising < self.exciting
    }
}

/// A fund's resolved strategy.
///
/// `weights` are free-form category hints (0-100), matched to
/// [`Category`] by the score aggregator. Empty means "use defaults".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FundStrategy {
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

//
// ================= Context =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub title: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSignal {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInteraction {
    pub agent: String,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
}

/// Immutable input bundle handed unchanged to every engine.
///
/// `None` on an auxiliary field means the fetch failed; `Some(vec![])`
/// means it succeeded and found nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineContext {
    pub subject: SubjectRecord,
    pub strategy: FundStrategy,
    pub documents: Option<Vec<DocumentRef>>,
    pub notes: Option<Vec<NoteSignal>>,
    pub interactions: Option<Vec<AgentInteraction>>,
    pub assembled_at: DateTime<Utc>,
}

//
// ================= Engine I/O =================
//

/// What an engine returns on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOutput {
    pub score: f64,
    #[serde(default)]
    pub analysis: String,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    pub validation_status: ValidationStatus,
}

/// One engine's contribution to a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineResult {
    pub engine: String,
    pub score: f64,
    pub analysis: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub validation_status: ValidationStatus,
}

/// Output of the best-effort research engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchEnrichment {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub subject_id: String,
    pub overall_score: u8,
    pub rag_band: RagBand,
    pub recommendation: String,
    pub confidence_level: ConfidenceLevel,
    pub category_results: BTreeMap<Category, EngineResult>,
    pub risk_factors: Vec<String>,
    pub next_steps: Vec<String>,
    pub executive_summary: String,
    pub research_available: bool,
    pub analysis_version: u32,
    pub analyzed_at: DateTime<Utc>,
}
