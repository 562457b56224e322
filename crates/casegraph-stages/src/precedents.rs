use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_core::traits::{infer_as, SearchBackend};
use casegraph_core::types::{ResponseShape, Structured};
use casegraph_engine::{node_fn, retry, Node};

use crate::keys::{DOCUMENT_TEXT_EN, HISTORICAL_CASES};
use crate::prompt::truncate_chars;
use crate::services::Services;

pub const HISTORICAL_CASES_NODE: &str = "historical_cases";

const QUESTION_CONTEXT_CHARS: usize = 5000;
const SUMMARY_INPUT_CHARS: usize = 3000;
pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable";

/// A past case found on the web, with a short summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentCase {
    pub title: String,
    pub url: String,
    /// Empty when the page had no content.
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuestion {
    question: String,
}

impl Structured for SearchQuestion {
    fn shape() -> ResponseShape {
        ResponseShape::new(
            "search_question",
            serde_json::json!({
                "type": "object",
                "properties": {"question": {"type": "string"}},
                "required": ["question"],
                "additionalProperties": false
            }),
        )
    }
}

pub fn node(services: Arc<Services>, search: Arc<dyn SearchBackend>) -> Node {
    Node::new(
        HISTORICAL_CASES_NODE,
        node_fn(move |input| {
            let services = services.clone();
            let search = search.clone();
            async move { find_precedents(&services, search.as_ref(), input).await }
        }),
    )
    .with_name("Historical cases")
    .with_inputs([DOCUMENT_TEXT_EN])
    .with_outputs([HISTORICAL_CASES])
}

async fn find_precedents(
    services: &Services,
    search: &dyn SearchBackend,
    input: WorkflowState,
) -> Result<PartialUpdate> {
    let text = input.require_str(HISTORICAL_CASES_NODE, DOCUMENT_TEXT_EN)?;
    let inference = services.inference.as_ref();

    let prompt = format!(
        r#"Based on the following FIR content, write one question I can search on the internet to find historical cases related to this FIR.

FIR Content:
{}

Make the question specific enough to surface similar past legal cases."#,
        truncate_chars(text, QUESTION_CONTEXT_CHARS)
    );
    let question = retry(&services.retry, "search_question", || {
        let prompt = prompt.clone();
        async move {
            let q = infer_as::<SearchQuestion>(inference, prompt).await?.question;
            if q.trim().is_empty() {
                return Err(CaseGraphError::invalid_response(inference.name(), "empty search question"));
            }
            Ok(q)
        }
    })
    .await?;
    info!(question = %question, "Searching for historical cases");

    let max_results = services.search_results;
    let hits = retry(&services.retry, "web_search", || {
        search.search(question.clone(), max_results)
    })
    .await?;

    let mut cases = Vec::with_capacity(hits.len());
    for hit in hits {
        let summary = match hit.raw_content.as_deref() {
            Some(raw) => summarize(services, &hit.title, raw).await,
            None => String::new(),
        };
        cases.push(PrecedentCase {
            title: hit.title,
            url: hit.url,
            summary,
        });
    }

    info!(cases = cases.len(), "Found historical cases");
    PartialUpdate::new().with(HISTORICAL_CASES, &cases)
}

/// A two-to-three sentence summary; a failed summary degrades to a marker
/// rather than failing the stage.
async fn summarize(services: &Services, title: &str, raw: &str) -> String {
    let prompt = format!(
        "Summarize the following legal case content in 2-3 sentences, focusing on key facts, legal issues, and outcomes:\n\n{}",
        truncate_chars(raw, SUMMARY_INPUT_CHARS)
    );
    let inference = services.inference.as_ref();
    match retry(&services.retry, "summarize_case", || inference.complete(prompt.clone())).await {
        Ok(summary) => summary.trim().to_string(),
        Err(e) => {
            warn!(title, error = %e, "Could not summarize case");
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}
