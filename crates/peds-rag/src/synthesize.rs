use peds_core::{SearchHistoryRecord, SearchResult};
use peds_error::{PedsError, Result};
use peds_llm::CompletionModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::orchestrator::SearchStats;
use crate::store::ReferenceStore;

pub const MEDICAL_DISCLAIMER: &str = "**Medical Disclaimer**: This information is for educational purposes only and should not replace professional medical advice.";

const SYSTEM_PROMPT: &str = "You are a medical assistant specialized in pediatrics, providing information based on the Nelson Textbook of Pediatrics.
Your goal is to give accurate, evidence-based answers about pediatric conditions, treatments, and guidelines.
Always include a medical disclaimer stating that this information is for educational purposes only.
Format your responses in Markdown for better readability.

When applicable to the query, your answer should:
1. Define the condition or term clearly
2. Discuss etiology and/or causative agents when relevant
3. Outline diagnostic approaches
4. Explain treatment strategies
5. Include prognosis when available
6. Add any special considerations for pediatric patients

Always provide detailed, specific information from the reference text, not generic responses.";

/// Which strategy produced an answer. `Canned` is selected upstream by the
/// conversation layer when search itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOrigin {
    Synthesized,
    Extractive,
    Canned,
}

#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub origin: AnswerOrigin,
}

/// Builds a grounded prompt from search results and calls the completion
/// provider; any completion failure is absorbed into a deterministic
/// extractive answer so the caller always gets text back.
pub struct AnswerSynthesizer {
    model: Arc<dyn CompletionModel>,
    store: Arc<dyn ReferenceStore>,
    stats: Arc<SearchStats>,
}

fn reference_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn user_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following information from the Nelson Textbook of Pediatrics, please provide a comprehensive answer to this query: \"{}\"\n\nREFERENCE INFORMATION:\n{}",
        query, context
    )
}

/// Non-generative answer assembled from the raw passages: up to five
/// sentence-derived key points, then every passage in full, then the
/// disclaimer. Pure string formatting, never fails.
pub fn extractive_answer(query: &str, results: &[SearchResult]) -> String {
    let mut out = String::from("# Information from Nelson Textbook of Pediatrics\n\n");
    out.push_str(&format!("## Response to: \"{}\"\n\n", query));

    let combined = results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let sentences: Vec<&str> = combined
        .split(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    out.push_str("## Key Points\n");
    let bullets: Vec<String> = sentences
        .iter()
        .take(5)
        .map(|s| {
            if s.ends_with('.') {
                format!("* {}", s)
            } else {
                format!("* {}.", s)
            }
        })
        .collect();
    out.push_str(&bullets.join("\n"));

    out.push_str("\n\n## Detailed Information\n");
    for result in results {
        out.push_str(&result.content);
        out.push_str("\n\n");
    }

    out.push('\n');
    out.push_str(MEDICAL_DISCLAIMER);
    out
}

impl AnswerSynthesizer {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        store: Arc<dyn ReferenceStore>,
        stats: Arc<SearchStats>,
    ) -> Self {
        Self {
            model,
            store,
            stats,
        }
    }

    #[instrument(skip(self, results))]
    pub async fn synthesize(
        &self,
        query: &str,
        results: &[SearchResult],
    ) -> Result<SynthesizedAnswer> {
        if results.is_empty() {
            // The empty-result case is handled upstream with a fixed
            // message; reaching here with no passages is a caller bug.
            return Err(PedsError::InvalidInput {
                reason: "search results are required".to_string(),
            });
        }

        let context = reference_context(results);
        let prompt = user_prompt(query, &context);

        let answer = match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => SynthesizedAnswer {
                text,
                origin: AnswerOrigin::Synthesized,
            },
            Err(e) => {
                warn!(error = %e, "completion failed; using extractive fallback");
                SynthesizedAnswer {
                    text: extractive_answer(query, results),
                    origin: AnswerOrigin::Extractive,
                }
            }
        };

        let record = SearchHistoryRecord {
            query: query.to_string(),
            response_chunks: results.iter().map(|r| r.chunk_id.clone()).collect(),
            enhanced_response: Some(answer.text.clone()),
        };
        if let Err(e) = self.store.log_search(&record).await {
            self.stats
                .audit_failures
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!(error = %e, "failed to record search history with enhanced response");
        }

        Ok(answer)
    }
}
