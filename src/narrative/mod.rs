//! Narrative composition
//!
//! Turns aggregated results into an executive summary, a risk list and a
//! next-steps list. The summary may come from an LLM backend; every other
//! piece is templated, and the summary falls back to a template whenever the
//! backend is missing, slow or failing.

pub mod gemini;

pub use gemini::GeminiNarrativeBackend;

use crate::models::{AggregateResult, Category, EngineResult, RagBand, ResearchEnrichment};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Categories scoring below this are listed as risks.
pub const RISK_SCORE_THRESHOLD: f64 = 60.0;
pub const RISK_EXCERPT_CHARS: usize = 150;
pub const NO_MAJOR_RISKS: &str = "No major risks identified";

const MAX_HIGHLIGHTS: usize = 2;

const STEPS_STRONG: &[&str] = &[
    "Schedule investment committee presentation",
    "Begin confirmatory due diligence",
    "Draft term sheet",
];

const STEPS_DEVELOPING: &[&str] = &[
    "Address gaps in lower-scoring categories",
    "Request additional information from management",
    "Re-run analysis once new materials arrive",
];

const STEPS_WEAK: &[&str] = &[
    "Document reasons for pass",
    "Share feedback with founders",
    "Archive for future reference",
];

/// Everything a backend needs to draft a summary. No fund identifiers.
#[derive(Debug, Clone)]
pub struct NarrativeInput<'a> {
    pub subject_name: &'a str,
    pub overall_score: u8,
    pub rag_band: RagBand,
    pub results: &'a BTreeMap<Category, EngineResult>,
    pub enrichment: Option<&'a ResearchEnrichment>,
}

/// LLM (or other) executive summary generator
#[async_trait::async_trait]
pub trait NarrativeBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn executive_summary(&self, input: &NarrativeInput<'_>) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub executive_summary: String,
    pub risk_factors: Vec<String>,
    pub next_steps: Vec<String>,
    /// Whether the summary came from the backend rather than the template.
    pub generated: bool,
}

pub struct NarrativeComposer {
    backend: Option<Arc<dyn NarrativeBackend>>,
    backend_timeout: Duration,
}

impl NarrativeComposer {
    /// Template-only composer
    pub fn new() -> Self {
        Self {
            backend: None,
            backend_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_backend(backend: Arc<dyn NarrativeBackend>, backend_timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            backend_timeout,
        }
    }

    pub async fn compose(&self, input: &NarrativeInput<'_>) -> Narrative {
        let (executive_summary, generated) = match self.generated_summary(input).await {
            Some(summary) => (summary, true),
            None => (templated_summary(input), false),
        };

        Narrative {
            executive_summary,
            risk_factors: risk_factors(input.results),
            next_steps: next_steps(input.overall_score),
            generated,
        }
    }

    async fn generated_summary(&self, input: &NarrativeInput<'_>) -> Option<String> {
        let backend = self.backend.as_ref()?;

        match timeout(self.backend_timeout, backend.executive_summary(input)).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => {
                debug!(backend = backend.name(), "Narrative generated");
                Some(summary.trim().to_string())
            }
            Ok(Ok(_)) => {
                warn!(backend = backend.name(), "Narrative backend returned empty summary");
                None
            }
            Ok(Err(e)) => {
                warn!(backend = backend.name(), error = %e, "Narrative backend failed, using template");
                None
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout_ms = self.backend_timeout.as_millis() as u64,
                    "Narrative backend timed out, using template"
                );
                None
            }
        }
    }
}

impl Default for NarrativeComposer {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Templates =====

/// Up to two research highlights, opportunities first.
pub fn highlights(enrichment: &ResearchEnrichment) -> Vec<String> {
    let opportunities: Vec<&str> = non_blank(&enrichment.opportunities);
    let risks: Vec<&str> = non_blank(&enrichment.risks);

    let mut picked: Vec<String> = Vec::with_capacity(MAX_HIGHLIGHTS);
    if let Some(o) = opportunities.first() {
        picked.push(format!("opportunity: {}", o));
    }
    if let Some(r) = risks.first() {
        picked.push(format!("risk: {}", r));
    }

    // Only one kind present: take a second of the same kind
    if risks.is_empty() {
        picked.extend(opportunities.get(1).map(|o| format!("opportunity: {}", o)));
    } else if opportunities.is_empty() {
        picked.extend(risks.get(1).map(|r| format!("risk: {}", r)));
    }

    picked.truncate(MAX_HIGHLIGHTS);
    picked
}

fn non_blank(items: &[String]) -> Vec<&str> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn templated_summary(input: &NarrativeInput<'_>) -> String {
    let mut summary = format!(
        "{} scored {}/100 overall, placing it in the {} band.",
        input.subject_name, input.overall_score, input.rag_band
    );

    let picked = input.enrichment.map(highlights).unwrap_or_default();

    if picked.is_empty() {
        let strongest = input
            .results
            .iter()
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score));
        let weakest = input
            .results
            .iter()
            .min_by(|a, b| a.1.score.total_cmp(&b.1.score));

        if let (Some((best, b)), Some((worst, w))) = (strongest, weakest) {
            if best != worst {
                summary.push_str(&format!(
                    " Strongest area: {} ({:.0}); weakest: {} ({:.0}).",
                    best.label(),
                    b.score,
                    worst.label(),
                    w.score
                ));
            }
        }
        summary.push_str(" No external research enrichment was available.");
    } else {
        summary.push_str(&format!(" Research highlights {}.", picked.join("; ")));
    }

    summary
}

/// Every category below the risk threshold, with an analysis excerpt.
pub fn risk_factors(results: &BTreeMap<Category, EngineResult>) -> Vec<String> {
    let risks: Vec<String> = results
        .iter()
        .filter(|(_, r)| r.score < RISK_SCORE_THRESHOLD)
        .map(|(category, r)| {
            format!(
                "{} ({:.0}/100): {}",
                category.label(),
                r.score,
                excerpt(&r.analysis, RISK_EXCERPT_CHARS)
            )
        })
        .collect();

    if risks.is_empty() {
        vec![NO_MAJOR_RISKS.to_string()]
    } else {
        risks
    }
}

pub fn next_steps(overall_score: u8) -> Vec<String> {
    let template = if overall_score >= 70 {
        STEPS_STRONG
    } else if overall_score >= 50 {
        STEPS_DEVELOPING
    } else {
        STEPS_WEAK
    };
    template.iter().map(|s| s.to_string()).collect()
}

/// Truncate to `max_chars` characters, appending "..." when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

// ===== IC Memo =====

/// Markdown investment committee memo for a finished analysis.
pub fn render_ic_memo(subject_name: &str, result: &AggregateResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("## Investment Committee Memo: {}\n\n", subject_name));
    out.push_str(&format!(
        "**Overall score:** {}/100 • **Band:** {} • **Confidence:** {:?}\n\n",
        result.overall_score, result.rag_band, result.confidence_level
    ));
    out.push_str(&format!("**Recommendation:** {}\n\n", result.recommendation));

    out.push_str("### Executive Summary\n\n");
    out.push_str(&result.executive_summary);
    out.push_str("\n\n");

    // ── Category table ──
    out.push_str("### Category Scores\n\n");
    out.push_str("| Category | Score | Confidence | Status |\n");
    out.push_str("|----------|-------|------------|--------|\n");
    for (category, r) in &result.category_results {
        let status_icon = match r.validation_status {
            crate::models::ValidationStatus::Unvalidated => " ⚠️",
            _ => "",
        };
        out.push_str(&format!(
            "| {}{} | {:.0} | {:.0} | {:?} |\n",
            category.label(),
            status_icon,
            r.score,
            r.confidence,
            r.validation_status
        ));
    }
    out.push('\n');

    out.push_str("### Risk Factors\n\n");
    for risk in &result.risk_factors {
        out.push_str(&format!("- {}\n", risk));
    }
    out.push('\n');

    out.push_str("### Next Steps\n\n");
    for (i, step) in result.next_steps.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, step));
    }
    out.push('\n');

    out.push_str(&format!(
        "_Analysis v{} • {}{}_\n",
        result.analysis_version,
        result.analyzed_at.format("%Y-%m-%d %H:%M UTC"),
        if result.research_available {
            ""
        } else {
            " • research unavailable"
        }
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::models::ValidationStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result(score: f64, analysis: &str) -> EngineResult {
        EngineResult {
            engine: "test".to_string(),
            score,
            analysis: analysis.to_string(),
            confidence: 80.0,
            sources: vec![],
            validation_status: ValidationStatus::Validated,
        }
    }

    fn sample_results() -> BTreeMap<Category, EngineResult> {
        let mut results = BTreeMap::new();
        results.insert(Category::StrategicFit, result(88.0, "Core thesis fit"));
        results.insert(Category::Market, result(72.0, "Growing market"));
        results.insert(Category::Financial, result(41.0, "Burn exceeds plan"));
        results
    }

    fn input<'a>(
        results: &'a BTreeMap<Category, EngineResult>,
        enrichment: Option<&'a ResearchEnrichment>,
    ) -> NarrativeInput<'a> {
        NarrativeInput {
            subject_name: "Acme Robotics",
            overall_score: 72,
            rag_band: RagBand::Promising,
            results,
            enrichment,
        }
    }

    struct StubBackend {
        reply: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NarrativeBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn executive_summary(&self, _input: &NarrativeInput<'_>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .clone()
                .ok_or_else(|| OrchestrationError::LlmError("quota exceeded".into()))
        }
    }

    #[test]
    fn test_risk_factors() {
        let risks = risk_factors(&sample_results());
        assert_eq!(risks, vec!["Financial (41/100): Burn exceeds plan".to_string()]);

        let mut healthy = BTreeMap::new();
        healthy.insert(Category::Team, result(60.0, "Solid"));
        assert_eq!(risk_factors(&healthy), vec![NO_MAJOR_RISKS.to_string()]);
    }

    #[test]
    fn test_risk_excerpt_truncated() {
        let long = "é".repeat(400);
        let mut results = BTreeMap::new();
        results.insert(Category::Product, result(10.0, &long));

        let risks = risk_factors(&results);
        let text = risks[0].split(": ").nth(1).unwrap();
        assert_eq!(text.chars().count(), RISK_EXCERPT_CHARS + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_next_steps_bands() {
        assert_eq!(next_steps(70)[0], STEPS_STRONG[0]);
        assert_eq!(next_steps(69)[0], STEPS_DEVELOPING[0]);
        assert_eq!(next_steps(50)[0], STEPS_DEVELOPING[0]);
        assert_eq!(next_steps(49)[0], STEPS_WEAK[0]);
    }

    #[test]
    fn test_templated_summary_without_enrichment() {
        let results = sample_results();
        let summary = templated_summary(&input(&results, None));

        assert!(summary.starts_with("Acme Robotics scored 72/100"));
        assert!(summary.contains("Strongest area: Strategic Fit (88)"));
        assert!(summary.contains("weakest: Financial (41)"));
    }

    #[test]
    fn test_templated_summary_uses_two_highlights() {
        let results = sample_results();
        let enrichment = ResearchEnrichment {
            summary: String::new(),
            opportunities: vec!["EU expansion".into(), "OEM deals".into()],
            risks: vec!["Key-person risk".into(), "FX exposure".into()],
            sources: vec![],
        };
        let summary = templated_summary(&input(&results, Some(&enrichment)));

        assert!(summary.contains("opportunity: EU expansion"));
        assert!(summary.contains("risk: Key-person risk"));
        assert!(!summary.contains("OEM deals"));
        assert!(!summary.contains("FX exposure"));

        let only_opportunities = ResearchEnrichment {
            opportunities: vec!["EU expansion".into(), "OEM deals".into(), "Gov".into()],
            ..Default::default()
        };
        assert_eq!(highlights(&only_opportunities).len(), 2);
    }

    #[tokio::test]
    async fn test_backend_summary_used() {
        let backend = Arc::new(StubBackend {
            reply: Some("  Generated summary. ".into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let composer = NarrativeComposer::with_backend(backend.clone(), Duration::from_secs(1));
        let results = sample_results();

        let narrative = composer.compose(&input(&results, None)).await;
        assert!(narrative.generated);
        assert_eq!(narrative.executive_summary, "Generated summary.");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back() {
        let backend = Arc::new(StubBackend {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let composer = NarrativeComposer::with_backend(backend, Duration::from_secs(1));
        let results = sample_results();

        let narrative = composer.compose(&input(&results, None)).await;
        assert!(!narrative.generated);
        assert!(narrative.executive_summary.starts_with("Acme Robotics scored"));
        assert_eq!(narrative.next_steps.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let backend = Arc::new(StubBackend {
            reply: Some("late".into()),
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let composer = NarrativeComposer::with_backend(backend, Duration::from_secs(2));
        let results = sample_results();

        let narrative = composer.compose(&input(&results, None)).await;
        assert!(!narrative.generated);
    }

    #[test]
    fn test_ic_memo() {
        let results = sample_results();
        let aggregate = AggregateResult {
            subject_id: "s-1".into(),
            overall_score: 72,
            rag_band: RagBand::Promising,
            recommendation: "RECOMMEND — continue diligence".into(),
            confidence_level: crate::models::ConfidenceLevel::High,
            category_results: results.clone(),
            risk_factors: risk_factors(&results),
            next_steps: next_steps(72),
            executive_summary: "Solid deal.".into(),
            research_available: false,
            analysis_version: 3,
            analyzed_at: chrono::Utc::now(),
        };

        let memo = render_ic_memo("Acme Robotics", &aggregate);
        assert!(memo.contains("## Investment Committee Memo: Acme Robotics"));
        assert!(memo.contains("| Financial | 41 | 80 | Validated |"));
        assert!(memo.contains("1. Schedule investment committee presentation"));
        assert!(memo.contains("Analysis v3"));
        assert!(memo.contains("research unavailable"));
    }
}
