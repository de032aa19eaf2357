//! Gemini-powered executive summaries

use crate::gemini::GeminiClient;
use crate::narrative::{highlights, NarrativeBackend, NarrativeInput};
use crate::Result;
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = r#"You are a venture capital investment analyst.

Guidelines:
- Write 2 to 4 plain sentences, no markdown, no bullet points
- Reference the company by name and its overall score
- Only use the facts provided; never invent numbers
- Mention at most two research highlights
- Neutral, professional tone"#;

pub struct GeminiNarrativeBackend {
    client: GeminiClient,
}

impl GeminiNarrativeBackend {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key)?,
        })
    }

    pub fn from_client(client: GeminiClient) -> Self {
        Self { client }
    }

    /// Build the summary prompt
    fn build_prompt(input: &NarrativeInput<'_>) -> String {
        let categories = input
            .results
            .iter()
            .map(|(category, r)| {
                format!(
                    "- {}: {:.0}/100 (confidence {:.0}, {:?})",
                    category.label(),
                    r.score,
                    r.confidence,
                    r.validation_status
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let research = match input.enrichment {
            Some(enrichment) => {
                let picked = highlights(enrichment);
                if picked.is_empty() {
                    enrichment.summary.clone()
                } else {
                    format!("{}\nHighlights:\n- {}", enrichment.summary, picked.join("\n- "))
                }
            }
            None => "No research enrichment available.".to_string(),
        };

        format!(
            r#"Write an executive summary for an investment committee.

COMPANY:
{}

OVERALL SCORE:
{}/100 ({})

CATEGORY SCORES:
{}

RESEARCH:
{}
"#,
            input.subject_name, input.overall_score, input.rag_band, categories, research,
        )
    }
}

#[async_trait]
impl NarrativeBackend for GeminiNarrativeBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn executive_summary(&self, input: &NarrativeInput<'_>) -> Result<String> {
        let prompt = Self::build_prompt(input);
        let response = self.client.generate(&prompt, SYSTEM_PROMPT).await?;
        Ok(clean_response(&response))
    }
}

/// Strip code fences and surrounding quotes models sometimes add
fn clean_response(response: &str) -> String {
    response
        .trim()
        .trim_start_matches("```text")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}
