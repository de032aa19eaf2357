//! Recommendation Classifier
//!
//! Maps an overall score onto one of four ordered bands:
//! - Exciting:          score >= exciting
//! - Promising:         score >= promising
//! - Needs Development: score >= needs_development
//! - Not Aligned:       below every threshold
//!
//! Boundaries are inclusive upward. Confidence level is derived separately,
//! from the mean engine confidence.

use crate::models::{Category, ConfidenceLevel, EngineResult, RagBand, Thresholds};
use std::collections::BTreeMap;

const HIGH_CONFIDENCE: f64 = 80.0;
const MEDIUM_CONFIDENCE: f64 = 60.0;

/// Recommendation band classifier
pub struct RagClassifier;

impl RagClassifier {
    /// Classify a score against the fund's thresholds
    pub fn classify(score: f64, thresholds: &Thresholds) -> RagBand {
        if score >= thresholds.exciting {
            RagBand::Exciting
        } else if score >= thresholds.promising {
            RagBand::Promising
        } else if score >= thresholds.needs_development {
            RagBand::NeedsDevelopment
        } else {
            RagBand::NotAligned
        }
    }

    pub fn recommendation(band: RagBand) -> &'static str {
        match band {
            RagBand::Exciting => "STRONG RECOMMEND — proceed to committee",
            RagBand::Promising => "RECOMMEND — continue diligence",
            RagBand::NeedsDevelopment => "CONSIDER — needs further development",
            RagBand::NotAligned => "PASS — does not meet criteria",
        }
    }

    /// Plain mean of engine confidences, bucketed
    pub fn confidence_level(results: &BTreeMap<Category, EngineResult>) -> ConfidenceLevel {
        if results.is_empty() {
            return ConfidenceLevel::Low;
        }

        let mean = results.values().map(|r| r.confidence).sum::<f64>() / results.len() as f64;

        if mean >= HIGH_CONFIDENCE {
            ConfidenceLevel::High
        } else if mean >= MEDIUM_CONFIDENCE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}
