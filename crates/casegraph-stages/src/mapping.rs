//! The fan-out mapping branches.
//!
//! Each branch lifts up to ten factual points out of the document, retrieves
//! the closest passages of one corpus for every point, asks the model which
//! provisions apply, then reconciles provisions that several points produced.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info};

use casegraph_core::error::Result;
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_core::traits::{infer_as, InferenceBackend};
use casegraph_core::types::{DedupRecord, RetrievalHit, Structured};
use casegraph_engine::{node_fn, reconcile, retry, Node, RecordMerger};

use crate::facts::CaseFacts;
use crate::keys::{
    BNSS_SECTIONS, BNS_SECTIONS, BSA_SECTIONS, CASE_FACTS, DOCUMENT_TEXT_EN, FORENSIC_GUIDELINES,
    NDPS_SECTIONS,
};
use crate::prompt::{format_guide_hits, format_statute_hits};
use crate::records::{FactualPoints, ForensicGuideline, GuidelineBatch, LegalSection, SectionBatch};
use crate::services::Services;

/// Upper bound on factual points per branch.
pub const MAX_POINTS: usize = 10;

/// A record type a mapping branch produces.
pub trait MappedRecord: DedupRecord + Structured + Serialize {
    /// What one per-point inference call returns.
    type Batch: Structured;

    fn into_records(batch: Self::Batch) -> Vec<Self>;

    /// Render retrieved passages for the per-point prompt.
    fn format_hits(hits: &[RetrievalHit]) -> String;

    /// Render the record for a merge prompt.
    fn describe(&self) -> String;

    /// Name of the key field, used in prompts.
    fn key_field() -> &'static str;
}

impl MappedRecord for LegalSection {
    type Batch = SectionBatch;

    fn into_records(batch: SectionBatch) -> Vec<Self> {
        batch.sections
    }

    fn format_hits(hits: &[RetrievalHit]) -> String {
        format_statute_hits(hits)
    }

    fn describe(&self) -> String {
        format!(
            "Section Description: {}\nWhy Section is Relevant: {}\nSource: {}",
            self.section_description, self.why_section_is_relevant, self.source
        )
    }

    fn key_field() -> &'static str {
        "section_number"
    }
}

impl MappedRecord for ForensicGuideline {
    type Batch = GuidelineBatch;

    fn into_records(batch: GuidelineBatch) -> Vec<Self> {
        batch.guidelines
    }

    fn format_hits(hits: &[RetrievalHit]) -> String {
        format_guide_hits(hits)
    }

    fn describe(&self) -> String {
        format!(
            "Guideline Description: {}\nWhy Guideline is Relevant: {}\nSource: {}",
            self.guideline_description, self.why_guideline_is_relevant, self.source
        )
    }

    fn key_field() -> &'static str {
        "guideline_topic"
    }
}

/// One mapping branch of the case workflow.
#[derive(Debug, Clone, Copy)]
pub struct Branch {
    pub node_id: &'static str,
    /// Retrieval corpus name.
    pub corpus: &'static str,
    pub output_key: &'static str,
    /// Human name of the corpus, used in prompts.
    pub subject: &'static str,
}

pub const NDPS: Branch = Branch {
    node_id: "ndps_legal_mapping",
    corpus: "ndps",
    output_key: NDPS_SECTIONS,
    subject: "the NDPS Act, 1985",
};

pub const BNS: Branch = Branch {
    node_id: "bns_legal_mapping",
    corpus: "bns",
    output_key: BNS_SECTIONS,
    subject: "the Bharatiya Nyaya Sanhita, 2023",
};

pub const BNSS: Branch = Branch {
    node_id: "bnss_legal_mapping",
    corpus: "bnss",
    output_key: BNSS_SECTIONS,
    subject: "the Bharatiya Nagarik Suraksha Sanhita, 2023",
};

pub const BSA: Branch = Branch {
    node_id: "bsa_legal_mapping",
    corpus: "bsa",
    output_key: BSA_SECTIONS,
    subject: "the Bharatiya Sakshya Adhiniyam, 2023",
};

pub const FORENSIC: Branch = Branch {
    node_id: "forensic_legal_mapping",
    corpus: "forensic",
    output_key: FORENSIC_GUIDELINES,
    subject: "the forensic investigation guide for NDPS cases",
};

/// Statute branches, in the order they appear in the graph.
pub const STATUTE_BRANCHES: [Branch; 4] = [NDPS, BNS, BNSS, BSA];

/// Build the node for a branch producing records of type `R`.
pub fn node<R: MappedRecord>(branch: Branch, services: Arc<Services>) -> Node {
    Node::new(
        branch.node_id,
        node_fn(move |input| {
            let services = services.clone();
            async move {
                let records = map_branch::<R>(&branch, &services, &input).await?;
                PartialUpdate::new().with(branch.output_key, &records)
            }
        }),
    )
    .with_name(format!("Map {}", branch.subject))
    .with_inputs([DOCUMENT_TEXT_EN])
    .with_optional_inputs([CASE_FACTS])
    .with_outputs([branch.output_key])
}

/// Run one branch end to end and return its reconciled records.
pub async fn map_branch<R: MappedRecord>(
    branch: &Branch,
    services: &Services,
    input: &WorkflowState,
) -> Result<Vec<R>> {
    let text = input.require_str(branch.node_id, DOCUMENT_TEXT_EN)?;
    let facts: Option<CaseFacts> = input.get_as(CASE_FACTS)?;
    let inference = services.inference.as_ref();

    let points = extract_points(branch, services, text, facts.as_ref()).await?;
    info!(node_id = branch.node_id, points = points.len(), "Extracted factual points");

    let mut records: Vec<R> = Vec::new();
    for (i, point) in points.iter().enumerate() {
        let (corpus, query) = (branch.corpus, point.as_str());
        let hits = retry(&services.retry, "retrieve", || {
            services.retrieval.query(corpus, query, services.top_k)
        })
        .await?;

        let prompt = mapping_prompt::<R>(branch, point, &hits);
        let batch: R::Batch = retry(&services.retry, branch.node_id, || {
            infer_as(inference, prompt.clone())
        })
        .await?;
        let found = R::into_records(batch);
        debug!(
            node_id = branch.node_id,
            point = i + 1,
            hits = hits.len(),
            records = found.len(),
            "Mapped point"
        );
        records.extend(found);
    }

    let merger = LlmMerger::<R>::new(services.inference.clone(), branch.subject);
    reconcile(records, &merger, &services.retry).await
}

async fn extract_points(
    branch: &Branch,
    services: &Services,
    text: &str,
    facts: Option<&CaseFacts>,
) -> Result<Vec<String>> {
    let context = facts
        .map(|f| format!("\nKey facts already identified:\n{}\n", f.brief()))
        .unwrap_or_default();
    let prompt = format!(
        r#"You are an expert in {subject}.

Task: extract factual points from the FIR text below that matter under {subject}.

Rules:
- At most {max} points, most legally significant first.
- Use only facts explicitly written in the FIR. Do not infer or add anything.
- Do not mention section numbers.
- Each point is one clear, separate statement.
{context}
FIR Text:
{text}"#,
        subject = branch.subject,
        max = MAX_POINTS,
        context = context,
        text = text,
    );

    let inference = services.inference.as_ref();
    let mut points: Vec<String> = retry(&services.retry, "extract_points", || {
        let prompt = prompt.clone();
        async move { Ok(infer_as::<FactualPoints>(inference, prompt).await?.points) }
    })
    .await?;

    points.retain(|p| !p.trim().is_empty());
    points.truncate(MAX_POINTS);
    Ok(points)
}

fn mapping_prompt<R: MappedRecord>(branch: &Branch, point: &str, hits: &[RetrievalHit]) -> String {
    format!(
        r#"You are an expert in {subject}.

Factual point (from the FIR):
{point}

Retrieved text:
{retrieved}

Task: list only the provisions of the retrieved text that directly apply to the factual point.

Rules:
1. Use only the retrieved text above. No outside knowledge.
2. Every provision must be clearly supported by the retrieved text.
3. Prefer fewer accurate provisions over many weak ones.
4. {key} must match the retrieved text exactly.
5. source must read "Page X, Document: [pdf_name], Source URL: [source_url]".

Return an empty list when nothing applies."#,
        subject = branch.subject,
        point = point,
        retrieved = R::format_hits(hits),
        key = R::key_field(),
    )
}

/// Merges duplicate records with one structured inference call per group.
pub struct LlmMerger<R> {
    inference: Arc<dyn InferenceBackend>,
    subject: &'static str,
    _record: PhantomData<fn() -> R>,
}

impl<R> LlmMerger<R> {
    pub fn new(inference: Arc<dyn InferenceBackend>, subject: &'static str) -> Self {
        Self {
            inference,
            subject,
            _record: PhantomData,
        }
    }
}

impl<R: MappedRecord> RecordMerger<R> for LlmMerger<R> {
    fn merge<'a>(&'a self, key: &'a str, duplicates: &'a [R]) -> BoxFuture<'a, Result<R>> {
        let entries: String = duplicates
            .iter()
            .enumerate()
            .map(|(i, r)| format!("\n--- Duplicate {} ---\n{}\n", i + 1, r.describe()))
            .collect();
        let prompt = format!(
            r#"You are an expert in {subject}. Merge these duplicate entries for the same {field} into one.

{field}: {key}

Duplicate entries:
{entries}
Rules:
- Use the {field} exactly: {key}
- Combine the information from every duplicate without losing details.
- Use only information present in the duplicates.
- For source, keep the most relevant citation or combine them if they differ."#,
            subject = self.subject,
            field = R::key_field(),
            key = key,
            entries = entries,
        );
        Box::pin(infer_as::<R>(self.inference.as_ref(), prompt))
    }
}
