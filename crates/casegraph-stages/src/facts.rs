use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use casegraph_core::error::Result;
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_core::traits::infer_as;
use casegraph_core::types::{ResponseShape, Structured};
use casegraph_engine::{node_fn, retry, Node};

use crate::keys::{CASE_FACTS, DOCUMENT_TEXT_EN};
use crate::services::Services;

pub const EXTRACT_CASE_FACTS: &str = "extract_case_facts";

/// The core facts of a First Information Report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFacts {
    pub summary: String,
    #[serde(default)]
    pub accused: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub incident_date: Option<String>,
    #[serde(default)]
    pub substances: Vec<Substance>,
    #[serde(default)]
    pub seizure_details: Option<String>,
    #[serde(default)]
    pub witnesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substance {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
}

impl Structured for CaseFacts {
    fn shape() -> ResponseShape {
        let optional_text = json!({"type": ["string", "null"]});
        let text_list = json!({"type": "array", "items": {"type": "string"}});
        ResponseShape::new(
            "case_facts",
            json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string", "description": "Two or three sentence account of the incident"},
                    "accused": text_list,
                    "location": optional_text,
                    "incident_date": optional_text,
                    "substances": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "quantity": optional_text
                            },
                            "required": ["name", "quantity"],
                            "additionalProperties": false
                        }
                    },
                    "seizure_details": optional_text,
                    "witnesses": text_list
                },
                "required": ["summary", "accused", "location", "incident_date", "substances", "seizure_details", "witnesses"],
                "additionalProperties": false
            }),
        )
    }
}

impl CaseFacts {
    /// Compact rendering used as context in later prompts.
    pub fn brief(&self) -> String {
        let mut lines = vec![format!("Summary: {}", self.summary)];
        if !self.accused.is_empty() {
            lines.push(format!("Accused: {}", self.accused.join(", ")));
        }
        if let Some(location) = &self.location {
            lines.push(format!("Location: {}", location));
        }
        if let Some(date) = &self.incident_date {
            lines.push(format!("Date: {}", date));
        }
        for s in &self.substances {
            match &s.quantity {
                Some(q) => lines.push(format!("Substance: {} ({})", s.name, q)),
                None => lines.push(format!("Substance: {}", s.name)),
            }
        }
        if let Some(seizure) = &self.seizure_details {
            lines.push(format!("Seizure: {}", seizure));
        }
        lines.join("\n")
    }
}

pub fn node(services: Arc<Services>) -> Node {
    Node::new(
        EXTRACT_CASE_FACTS,
        node_fn(move |input| {
            let services = services.clone();
            async move { extract(&services, input).await }
        }),
    )
    .with_name("Extract case facts")
    .with_inputs([DOCUMENT_TEXT_EN])
    .with_outputs([CASE_FACTS])
}

async fn extract(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let text = input.require_str(EXTRACT_CASE_FACTS, DOCUMENT_TEXT_EN)?;
    let prompt = format!(
        r#"You are reading a First Information Report (FIR) filed with the police.

Extract the facts below. Use only what the FIR states; leave a field null or empty when the FIR is silent.
- summary: two or three sentences describing the incident
- accused: names of the accused
- location and incident_date as written
- substances: every seized substance with its quantity
- seizure_details: how and where the seizure happened
- witnesses: names of witnesses

FIR Text:
{}"#,
        text
    );

    let inference = services.inference.as_ref();
    let facts: CaseFacts = retry(&services.retry, EXTRACT_CASE_FACTS, || {
        infer_as(inference, prompt.clone())
    })
    .await?;

    info!(
        accused = facts.accused.len(),
        substances = facts.substances.len(),
        "Extracted case facts"
    );
    PartialUpdate::new().with(CASE_FACTS, &facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegraph_test_utils::{fast_retry, MockInference, MockReader, MockRetrieval, MockTranslation};

    fn facts_json() -> serde_json::Value {
        json!({
            "summary": "Accused intercepted near the bus stand carrying ganja.",
            "accused": ["Ramesh"],
            "location": "Bus stand, Sector 4",
            "incident_date": null,
            "substances": [{"name": "ganja", "quantity": "2 kg"}],
            "seizure_details": null,
            "witnesses": []
        })
    }

    #[tokio::test]
    async fn test_extract_case_facts() {
        let inference = Arc::new(
            MockInference::new()
                .enqueue("case_facts", Ok(json!({"summary": 42})))
                .respond("case_facts", facts_json()),
        );
        let services = Arc::new(
            Services::new(
                inference.clone(),
                Arc::new(MockRetrieval::new()),
                Arc::new(MockTranslation::identity()),
                Arc::new(MockReader::new()),
            )
            .with_retry(fast_retry(2)),
        );
        let node = node(services);
        let mut state = WorkflowState::new();
        state.set(DOCUMENT_TEXT_EN, json!("FIR text"));

        let update = node.invoke(node.prepare_input(&state).unwrap()).await.unwrap();
        let facts: CaseFacts = serde_json::from_value(update.get(CASE_FACTS).unwrap().clone()).unwrap();
        assert_eq!(facts.substances[0].quantity.as_deref(), Some("2 kg"));
        // The malformed first reply was retried.
        assert_eq!(inference.call_count("case_facts"), 2);
        assert!(inference.prompts("case_facts")[0].contains("FIR text"));
    }

    #[test]
    fn test_brief() {
        let facts: CaseFacts = serde_json::from_value(facts_json()).unwrap();
        assert_eq!(
            facts.brief(),
            "Summary: Accused intercepted near the bus stand carrying ganja.\nAccused: Ramesh\nLocation: Bus stand, Sector 4\nSubstance: ganja (2 kg)"
        );
    }
}
