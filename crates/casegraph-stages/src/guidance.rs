//! Officer-facing guidance: the evidence checklist, then dos and donts and
//! the weaknesses a defence is likely to exploit.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use casegraph_core::error::Result;
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_core::traits::infer_as;
use casegraph_core::types::{ResponseShape, Structured};
use casegraph_engine::{node_fn, retry, Node};

use crate::keys::{
    DOCUMENT_TEXT_EN, DONTS, DOS, EVIDENCE_CHECKLIST, MAPPED, NEXT_STEPS, PROSECUTION_WEAKNESSES,
};
use crate::prompt::{numbered, summarize_records};
use crate::records::string_list_schema;
use crate::services::Services;

pub const EVIDENCE_CHECKLIST_NODE: &str = "generate_evidence_checklist";
pub const DOS_AND_DONTS_NODE: &str = "generate_dos_and_donts";
pub const WEAKNESSES_NODE: &str = "generate_prosecution_weaknesses";

pub const MAX_DOS: usize = 10;

#[derive(Debug, Deserialize)]
struct Checklist {
    items: Vec<String>,
}

impl Structured for Checklist {
    fn shape() -> ResponseShape {
        ResponseShape::new("evidence_checklist", string_list_schema("items"))
    }
}

#[derive(Debug, Deserialize)]
struct DosAndDonts {
    dos: Vec<String>,
    donts: Vec<String>,
}

impl Structured for DosAndDonts {
    fn shape() -> ResponseShape {
        let list = json!({"type": "array", "items": {"type": "string"}});
        ResponseShape::new(
            "dos_and_donts",
            json!({
                "type": "object",
                "properties": {"dos": list, "donts": list},
                "required": ["dos", "donts"],
                "additionalProperties": false
            }),
        )
    }
}

#[derive(Debug, Deserialize)]
struct Weaknesses {
    weaknesses: Vec<String>,
}

impl Structured for Weaknesses {
    fn shape() -> ResponseShape {
        ResponseShape::new("prosecution_weaknesses", string_list_schema("weaknesses"))
    }
}

/// Every mapped category rendered as one block per act.
fn mapped_context(input: &WorkflowState) -> String {
    const LABELS: [&str; 5] = ["NDPS", "BNS", "BNSS", "BSA", "Forensic Guidelines"];
    LABELS
        .iter()
        .zip(MAPPED)
        .map(|(label, key)| format!("{}:\n{}", label, summarize_records(input.get(key))))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn stage(id: &'static str, name: &str, services: Arc<Services>, run: RunFn) -> Node {
    Node::new(
        id,
        node_fn(move |input| {
            let services = services.clone();
            async move { run(services, input).await }
        }),
    )
    .with_name(name)
    .with_optional_inputs(MAPPED)
}

type RunFn = fn(Arc<Services>, WorkflowState) -> futures::future::BoxFuture<'static, Result<PartialUpdate>>;

pub fn evidence_checklist_node(services: Arc<Services>) -> Node {
    stage(EVIDENCE_CHECKLIST_NODE, "Evidence checklist", services, |s, input| {
        Box::pin(async move { evidence_checklist(&s, input).await })
    })
    .with_inputs([DOCUMENT_TEXT_EN, NEXT_STEPS])
    .with_outputs([EVIDENCE_CHECKLIST])
}

async fn evidence_checklist(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let text = input.require_str(EVIDENCE_CHECKLIST_NODE, DOCUMENT_TEXT_EN)?;
    let steps: Vec<String> = input.require(EVIDENCE_CHECKLIST_NODE, NEXT_STEPS)?;
    let prompt = format!(
        r#"You are preparing an evidence checklist for an NDPS case.

FIR Content:
{}

Planned investigation steps:
{}

Applicable provisions:
{}

List every piece of evidence and every document the Investigating Officer must collect or prepare
(seizure memo, sample records, witness statements, compliance records and so on). One item per entry."#,
        text,
        numbered(&steps),
        mapped_context(&input)
    );

    let inference = services.inference.as_ref();
    let items: Vec<String> = retry(&services.retry, EVIDENCE_CHECKLIST_NODE, || {
        let prompt = prompt.clone();
        async move { Ok(infer_as::<Checklist>(inference, prompt).await?.items) }
    })
    .await?;

    info!(items = items.len(), "Built evidence checklist");
    PartialUpdate::new().with(EVIDENCE_CHECKLIST, &items)
}

pub fn dos_and_donts_node(services: Arc<Services>) -> Node {
    stage(DOS_AND_DONTS_NODE, "Dos and donts", services, |s, input| {
        Box::pin(async move { dos_and_donts(&s, input).await })
    })
    .with_inputs([DOCUMENT_TEXT_EN])
    .with_outputs([DOS, DONTS])
}

async fn dos_and_donts(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let text = input.require_str(DOS_AND_DONTS_NODE, DOCUMENT_TEXT_EN)?;
    let prompt = format!(
        r#"Based on the following FIR content and legal sections, generate dos and donts for law enforcement officers.

FIR Content:
{}

{}

Give specific, actionable dos and donts (at most {} each) for the investigation, evidence handling and custody of the accused."#,
        text,
        mapped_context(&input),
        MAX_DOS
    );

    let inference = services.inference.as_ref();
    let mut answer: DosAndDonts = retry(&services.retry, DOS_AND_DONTS_NODE, || {
        infer_as(inference, prompt.clone())
    })
    .await?;
    answer.dos.truncate(MAX_DOS);
    answer.donts.truncate(MAX_DOS);

    info!(dos = answer.dos.len(), donts = answer.donts.len(), "Generated dos and donts");
    PartialUpdate::new()
        .with(DOS, &answer.dos)?
        .with(DONTS, &answer.donts)
}

pub fn weaknesses_node(services: Arc<Services>) -> Node {
    stage(WEAKNESSES_NODE, "Prosecution weaknesses", services, |s, input| {
        Box::pin(async move { weaknesses(&s, input).await })
    })
    .with_inputs([DOCUMENT_TEXT_EN, EVIDENCE_CHECKLIST])
    .with_outputs([PROSECUTION_WEAKNESSES])
}

async fn weaknesses(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let text = input.require_str(WEAKNESSES_NODE, DOCUMENT_TEXT_EN)?;
    let checklist: Vec<String> = input.require(WEAKNESSES_NODE, EVIDENCE_CHECKLIST)?;
    let prompt = format!(
        r#"You are reviewing an NDPS case file the way defence counsel would.

FIR Content:
{}

Evidence the prosecution intends to rely on:
{}

{}

List the potential weaknesses in the prosecution's case: procedural lapses, gaps in evidence,
non-compliance with mandatory provisions. One weakness per entry, most serious first."#,
        text,
        numbered(&checklist),
        mapped_context(&input)
    );

    let inference = services.inference.as_ref();
    let found: Vec<String> = retry(&services.retry, WEAKNESSES_NODE, || {
        let prompt = prompt.clone();
        async move { Ok(infer_as::<Weaknesses>(inference, prompt).await?.weaknesses) }
    })
    .await?;

    info!(weaknesses = found.len(), "Listed prosecution weaknesses");
    PartialUpdate::new().with(PROSECUTION_WEAKNESSES, &found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegraph_core::error::CaseGraphError;
    use casegraph_test_utils::{fast_retry, MockInference, MockReader, MockRetrieval, MockTranslation};

    fn services(inference: Arc<MockInference>) -> Arc<Services> {
        Arc::new(
            Services::new(
                inference,
                Arc::new(MockRetrieval::new()),
                Arc::new(MockTranslation::identity()),
                Arc::new(MockReader::new()),
            )
            .with_retry(fast_retry(1)),
        )
    }

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new();
        state.set(DOCUMENT_TEXT_EN, json!("FIR text"));
        state.set(NEXT_STEPS, json!(["Send samples to FSL"]));
        state.set(
            crate::keys::NDPS_SECTIONS,
            json!([{"section_number": "Section 20", "section_description": "Cannabis"}]),
        );
        state
    }

    #[tokio::test]
    async fn test_checklist_sees_steps_and_sections() {
        let inference = Arc::new(
            MockInference::new().respond("evidence_checklist", json!({"items": ["Seizure memo"]})),
        );
        let node = evidence_checklist_node(services(inference.clone()));

        let update = node.invoke(node.prepare_input(&state()).unwrap()).await.unwrap();
        assert_eq!(update.get(EVIDENCE_CHECKLIST), Some(&json!(["Seizure memo"])));

        let prompt = &inference.prompts("evidence_checklist")[0];
        assert!(prompt.contains("1. Send samples to FSL"));
        assert!(prompt.contains("- Section 20: Cannabis"));
        assert!(prompt.contains("BSA:\nNone"));
    }

    #[tokio::test]
    async fn test_dos_and_donts_capped() {
        let many: Vec<String> = (0..15).map(|i| format!("do {}", i)).collect();
        let inference = Arc::new(
            MockInference::new().respond("dos_and_donts", json!({"dos": many, "donts": ["Do not delay"]})),
        );
        let node = dos_and_donts_node(services(inference));

        let update = node.invoke(node.prepare_input(&state()).unwrap()).await.unwrap();
        assert_eq!(update.get(DOS).unwrap().as_array().unwrap().len(), MAX_DOS);
        assert_eq!(update.get(DONTS), Some(&json!(["Do not delay"])));
    }

    #[test]
    fn test_weaknesses_require_checklist() {
        let node = weaknesses_node(services(Arc::new(MockInference::new())));
        let err = node.prepare_input(&state()).unwrap_err();
        assert!(matches!(err, CaseGraphError::Validation { ref key, .. } if key == EVIDENCE_CHECKLIST));
    }

    #[tokio::test]
    async fn test_weaknesses() {
        let inference = Arc::new(
            MockInference::new()
                .respond("prosecution_weaknesses", json!({"weaknesses": ["No independent witness"]})),
        );
        let node = weaknesses_node(services(inference));
        let mut state = state();
        state.set(EVIDENCE_CHECKLIST, json!(["Seizure memo"]));

        let update = node.invoke(node.prepare_input(&state).unwrap()).await.unwrap();
        assert_eq!(
            update.get(PROSECUTION_WEAKNESSES),
            Some(&json!(["No independent witness"]))
        );
    }
}
