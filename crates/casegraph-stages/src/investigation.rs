use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_core::traits::infer_as;
use casegraph_core::types::{ResponseShape, RetrievalHit, Structured};
use casegraph_engine::{node_fn, retry, Node};

use crate::keys::{DOCUMENT_TEXT_EN, NEXT_STEPS};
use crate::mapping::FORENSIC;
use crate::records::string_list_schema;
use crate::services::Services;

pub const INVESTIGATION_PLAN: &str = "investigation_plan";

pub const MAX_STEPS: usize = 8;
const MAX_PROCEDURAL_POINTS: usize = 6;
const NO_GUIDANCE: &str = "No specific procedural guidance available from forensic guide.";

#[derive(Debug, Deserialize)]
struct ProceduralPoints {
    summary_points: Vec<String>,
}

impl Structured for ProceduralPoints {
    fn shape() -> ResponseShape {
        ResponseShape::new("procedural_points", string_list_schema("summary_points"))
    }
}

#[derive(Debug, Deserialize)]
struct NextSteps {
    next_steps: Vec<String>,
}

impl Structured for NextSteps {
    fn shape() -> ResponseShape {
        ResponseShape::new("next_steps", string_list_schema("next_steps"))
    }
}

/// Joins the mapping branches: plans the investigating officer's next steps
/// from procedure-relevant facts and the forensic guide.
pub fn node(services: Arc<Services>) -> Node {
    Node::new(
        INVESTIGATION_PLAN,
        node_fn(move |input| {
            let services = services.clone();
            async move { plan(&services, input).await }
        }),
    )
    .with_name("Investigation plan")
    .with_inputs([DOCUMENT_TEXT_EN])
    .with_outputs([NEXT_STEPS])
}

async fn plan(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let text = input.require_str(INVESTIGATION_PLAN, DOCUMENT_TEXT_EN)?;
    let inference = services.inference.as_ref();

    let points_prompt = format!(
        r#"You are extracting facts from an FIR for an NDPS investigation.

Rules:
- Extract only facts explicitly stated. Do not infer or add.
- Each point must affect legal procedure.
- Keep to 5-6 points.

Examples:
- "Accused found in possession of 10 kg ganja"
- "Seizure occurred at railway station"
- "Samples were not drawn at spot"

FIR Text:
{}"#,
        text
    );
    let mut points: Vec<String> = retry(&services.retry, "procedural_points", || {
        let prompt = points_prompt.clone();
        async move { Ok(infer_as::<ProceduralPoints>(inference, prompt).await?.summary_points) }
    })
    .await?;
    points.truncate(MAX_PROCEDURAL_POINTS);

    let chunks = forensic_context(services, &points).await?;
    info!(points = points.len(), chunks = chunks.len(), "Gathered procedural guidance");

    let context = if chunks.is_empty() {
        NO_GUIDANCE.to_string()
    } else {
        chunks
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    let steps_prompt = format!(
        r#"You are writing an NDPS investigation plan.

Use only the information below. Do not invent steps.

Legal / Procedural Information:
{}

Task: turn this into a concise step-by-step list of actions for the Investigating Officer.
- Each step short and actionable
- At most {} steps
- If no procedural guidance is available, give general investigation steps for NDPS cases"#,
        context, MAX_STEPS
    );
    let mut steps: Vec<String> = retry(&services.retry, INVESTIGATION_PLAN, || {
        let prompt = steps_prompt.clone();
        async move { Ok(infer_as::<NextSteps>(inference, prompt).await?.next_steps) }
    })
    .await?;
    steps.truncate(MAX_STEPS);

    info!(steps = steps.len(), "Planned next steps");
    PartialUpdate::new().with(NEXT_STEPS, &steps)
}

/// Forensic-guide passages for every point, de-duplicated by text.
///
/// A corpus without an index yields no context rather than an error.
async fn forensic_context(services: &Services, points: &[String]) -> Result<Vec<String>> {
    let mut hits: Vec<RetrievalHit> = Vec::new();
    for point in points {
        let query = point.as_str();
        let found = retry(&services.retry, "retrieve", || {
            services.retrieval.query(FORENSIC.corpus, query, services.top_k)
        })
        .await;
        match found {
            Ok(found) => hits.extend(found),
            Err(CaseGraphError::IndexNotFound(corpus)) => {
                warn!(corpus = %corpus, "Forensic index not found; planning without guide context");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }
    }

    let mut seen = HashSet::new();
    Ok(hits
        .iter()
        .filter_map(|h| h.content())
        .filter(|c| seen.insert(*c))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegraph_test_utils::{
        chunk, fast_retry, MockInference, MockReader, MockRetrieval, MockTranslation,
    };
    use serde_json::json;

    fn run_services(inference: Arc<MockInference>, retrieval: MockRetrieval) -> Arc<Services> {
        Arc::new(
            Services::new(
                inference,
                Arc::new(retrieval),
                Arc::new(MockTranslation::identity()),
                Arc::new(MockReader::new()),
            )
            .with_retry(fast_retry(1)),
        )
    }

    fn input() -> WorkflowState {
        let mut state = WorkflowState::new();
        state.set(DOCUMENT_TEXT_EN, json!("Accused found with ganja; samples not drawn at spot."));
        state
    }

    #[tokio::test]
    async fn test_plan_uses_deduplicated_guidance() {
        let steps: Vec<String> = (1..=11).map(|i| format!("step {}", i)).collect();
        let inference = Arc::new(
            MockInference::new()
                .respond("procedural_points", json!({"summary_points": ["possession", "no samples"]}))
                .respond("next_steps", json!({ "next_steps": steps })),
        );
        let retrieval = MockRetrieval::new().with_corpus(
            "forensic",
            vec![
                chunk("Draw samples in the presence of a magistrate.", json!({}), 0.9),
                chunk("Seal the samples.", json!({}), 0.8),
            ],
        );
        let node = node(run_services(inference.clone(), retrieval));

        let update = node.invoke(node.prepare_input(&input()).unwrap()).await.unwrap();
        let written: Vec<String> = serde_json::from_value(update.get(NEXT_STEPS).unwrap().clone()).unwrap();
        assert_eq!(written.len(), MAX_STEPS);

        let prompt = &inference.prompts("next_steps")[0];
        // Both points retrieved the same two chunks; each appears once.
        assert_eq!(prompt.matches("Seal the samples.").count(), 1);
        assert!(!prompt.contains(NO_GUIDANCE));
    }

    #[tokio::test]
    async fn test_long_guidance_chunk_kept_whole() {
        let long = format!("{}END-OF-GUIDE", "Weigh the seized ganja on site. ".repeat(200));
        let inference = Arc::new(
            MockInference::new()
                .respond("procedural_points", json!({"summary_points": ["weighing"]}))
                .respond("next_steps", json!({"next_steps": ["Weigh the seizure"]})),
        );
        let retrieval =
            MockRetrieval::new().with_corpus("forensic", vec![chunk(&long, json!({}), 0.9)]);
        let node = node(run_services(inference.clone(), retrieval));

        node.invoke(node.prepare_input(&input()).unwrap()).await.unwrap();
        assert!(inference.prompts("next_steps")[0].contains(&long));
    }

    #[tokio::test]
    async fn test_missing_forensic_index_is_tolerated() {
        let inference = Arc::new(
            MockInference::new()
                .respond("procedural_points", json!({"summary_points": ["possession"]}))
                .respond("next_steps", json!({"next_steps": ["Record statements"]})),
        );
        let node = node(run_services(inference.clone(), MockRetrieval::new()));

        let update = node.invoke(node.prepare_input(&input()).unwrap()).await.unwrap();
        assert_eq!(update.get(NEXT_STEPS), Some(&json!(["Record statements"])));
        assert!(inference.prompts("next_steps")[0].contains(NO_GUIDANCE));
    }

    #[tokio::test]
    async fn test_retrieval_outage_is_not_tolerated() {
        let inference = Arc::new(
            MockInference::new().respond("procedural_points", json!({"summary_points": ["p"]})),
        );
        let retrieval = MockRetrieval::new()
            .with_corpus("forensic", vec![])
            .fail_next(5);
        let node = node(run_services(inference, retrieval));

        let err = node.invoke(node.prepare_input(&input()).unwrap()).await.unwrap_err();
        assert!(matches!(err, CaseGraphError::ExhaustedRetries { .. }));
    }
}
