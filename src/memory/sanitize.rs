//! Air-gap projection
//!
//! One-directional transforms from fund-owned data into records that may
//! be shared across funds. Every output field is an enum, a number, a date,
//! or a value generated here; there is nowhere to put an identifier or free
//! text from the source.

use crate::audit::compute_content_hash;
use crate::models::{
    AggregateResult, Category, ConfidenceLevel, EngineResult, RagBand, SubjectRecord,
    ValidationStatus,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

//
// ================= Coarse taxonomy =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndustryBucket {
    Software,
    Fintech,
    Healthcare,
    Climate,
    Consumer,
    Industrial,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageBucket {
    Early,
    Growth,
    Late,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatternStrength {
    Low,
    Medium,
    High,
}

/// Industry keyword table, checked in order.
const INDUSTRY_KEYWORDS: &[(IndustryBucket, &[&str])] = &[
    (
        IndustryBucket::Fintech,
        &["fintech", "payment", "banking", "insur", "lending", "crypto", "wealth"],
    ),
    (
        IndustryBucket::Healthcare,
        &["health", "bio", "medtech", "medical", "pharma", "clinic", "therapeut"],
    ),
    (
        IndustryBucket::Climate,
        &["climate", "energy", "cleantech", "solar", "carbon", "sustainab", "battery"],
    ),
    (
        IndustryBucket::Software,
        &["saas", "software", "ai", "data", "cloud", "security", "cyber", "developer", "devtools"],
    ),
    (
        IndustryBucket::Consumer,
        &["consumer", "retail", "commerce", "marketplace", "food", "media", "gaming", "d2c"],
    ),
    (
        IndustryBucket::Industrial,
        &["industrial", "manufactur", "robot", "hardware", "logistic", "mobility", "aerospace"],
    ),
];

impl IndustryBucket {
    pub fn from_category(category: Option<&str>) -> Self {
        let Some(raw) = category else {
            return IndustryBucket::Other;
        };
        let normalized = raw.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        INDUSTRY_KEYWORDS
            .iter()
            .find(|(_, keywords)| {
                keywords.iter().any(|kw| {
                    // Two-letter keywords must match a whole word ("ai" vs "airline")
                    if kw.len() <= 2 {
                        words.iter().any(|w| w == kw)
                    } else {
                        words.iter().any(|w| w.starts_with(kw))
                    }
                })
            })
            .map(|(bucket, _)| *bucket)
            .unwrap_or(IndustryBucket::Other)
    }
}

impl StageBucket {
    pub fn from_stage(stage: Option<&str>) -> Self {
        let Some(raw) = stage else {
            return StageBucket::Unknown;
        };
        let s = raw.to_lowercase().replace(['-', '_'], " ");

        const LATE: &[&str] = &["series c", "series d", "series e", "series f", "late", "pre ipo", "buyout"];
        const GROWTH: &[&str] = &["series a", "series b", "growth", "expansion"];
        const EARLY: &[&str] = &["seed", "angel", "pre series", "idea", "incubat"];

        if LATE.iter().any(|kw| s.contains(kw)) {
            StageBucket::Late
        } else if GROWTH.iter().any(|kw| s.contains(kw)) {
            StageBucket::Growth
        } else if EARLY.iter().any(|kw| s.contains(kw)) {
            StageBucket::Early
        } else {
            StageBucket::Unknown
        }
    }
}

impl SizeBucket {
    /// Deal size in USD.
    pub fn from_size(size: Option<f64>) -> Self {
        match size {
            Some(v) if v.is_finite() && v >= 0.0 => {
                if v < 5_000_000.0 {
                    SizeBucket::Small
                } else if v < 25_000_000.0 {
                    SizeBucket::Medium
                } else {
                    SizeBucket::Large
                }
            }
            _ => SizeBucket::Unknown,
        }
    }
}

impl PatternStrength {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            PatternStrength::High
        } else if score >= 50.0 {
            PatternStrength::Medium
        } else {
            PatternStrength::Low
        }
    }
}

//
// ================= Records =================
//

/// Per-engine signal with all free text dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnginePattern {
    pub pattern_strength: PatternStrength,
    /// Rounded to the nearest 10.
    pub confidence: u8,
    pub validation_status: ValidationStatus,
}

impl From<&EngineResult> for EnginePattern {
    fn from(result: &EngineResult) -> Self {
        Self {
            pattern_strength: PatternStrength::from_score(result.score),
            confidence: round_to_ten(result.confidence),
            validation_status: result.validation_status,
        }
    }
}

/// Anonymized projection of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealInsight {
    pub insight_id: Uuid,
    /// Hash over the coarse fields only. Shared by every insight with the
    /// same pattern, so it groups records rather than identifying one.
    pub pattern_hash: String,
    pub industry: IndustryBucket,
    pub stage: StageBucket,
    pub size: SizeBucket,
    pub rag_band: RagBand,
    pub score_decile: u8,
    pub confidence_level: ConfidenceLevel,
    pub engine_patterns: BTreeMap<Category, EnginePattern>,
    pub research_available: bool,
    pub recorded_on: NaiveDate,
}

/// Legacy actions that can complete successfully.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MigratedAction {
    ComprehensiveAnalysis,
    EnrichDeal,
    AnalyzeCriteria,
    GenerateIcMemo,
    CalculateOverallScore,
}

/// Record that a legacy call was translated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub record_id: Uuid,
    pub action: MigratedAction,
    pub industry: Option<IndustryBucket>,
    pub stage: Option<StageBucket>,
    pub recorded_on: NaiveDate,
}

#[derive(Serialize)]
struct PatternKey<'a> {
    industry: IndustryBucket,
    stage: StageBucket,
    size: SizeBucket,
    rag_band: RagBand,
    score_decile: u8,
    confidence_level: ConfidenceLevel,
    engine_patterns: &'a BTreeMap<Category, EnginePattern>,
    recorded_on: NaiveDate,
}

/// Project an analysis across the air gap.
pub fn sanitize_analysis(subject: &SubjectRecord, result: &AggregateResult) -> DealInsight {
    let industry = IndustryBucket::from_category(subject.category.as_deref());
    let stage = StageBucket::from_stage(subject.stage.as_deref());
    let size = SizeBucket::from_size(subject.size);
    let score_decile = (result.overall_score / 10).saturating_mul(10);
    let recorded_on = Utc::now().date_naive();

    let engine_patterns: BTreeMap<Category, EnginePattern> = result
        .category_results
        .iter()
        .map(|(category, engine_result)| (*category, EnginePattern::from(engine_result)))
        .collect();

    let pattern_hash = compute_content_hash(&PatternKey {
        industry,
        stage,
        size,
        rag_band: result.rag_band,
        score_decile,
        confidence_level: result.confidence_level,
        engine_patterns: &engine_patterns,
        recorded_on,
    });

    DealInsight {
        insight_id: Uuid::new_v4(),
        pattern_hash,
        industry,
        stage,
        size,
        rag_band: result.rag_band,
        score_decile,
        confidence_level: result.confidence_level,
        engine_patterns,
        research_available: result.research_available,
        recorded_on,
    }
}

/// Project a legacy translation across the air gap.
pub fn sanitize_migration(
    action: MigratedAction,
    subject: Option<&SubjectRecord>,
) -> MigrationRecord {
    MigrationRecord {
        record_id: Uuid::new_v4(),
        action,
        industry: subject.map(|s| IndustryBucket::from_category(s.category.as_deref())),
        stage: subject.map(|s| StageBucket::from_stage(s.stage.as_deref())),
        recorded_on: Utc::now().date_naive(),
    }
}

fn round_to_ten(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    ((value.clamp(0.0, 100.0) / 10.0).round() * 10.0) as u8
}
