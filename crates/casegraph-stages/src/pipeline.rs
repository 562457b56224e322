//! The case-analysis workflow definition.
//!
//! ```text
//! read_document -> translate_to_english -> extract_case_facts
//!     extract_case_facts => {ndps, bns, bnss, bsa, forensic}_legal_mapping
//!     all five mappings  => investigation_plan -> generate_evidence_checklist
//!     generate_evidence_checklist => {generate_dos_and_donts, generate_prosecution_weaknesses}
//!     translate_to_english -> historical_cases      (only with a search backend)
//! ```

use std::sync::Arc;

use casegraph_core::error::Result;
use casegraph_engine::{GraphBuilder, Workflow, WorkflowGraph};

use crate::guidance::{
    dos_and_donts_node, evidence_checklist_node, weaknesses_node, DOS_AND_DONTS_NODE,
    EVIDENCE_CHECKLIST_NODE, WEAKNESSES_NODE,
};
use crate::ingest::{read_document_node, translate_node, READ_DOCUMENT, TRANSLATE};
use crate::investigation::INVESTIGATION_PLAN;
use crate::mapping::{Branch, FORENSIC, STATUTE_BRANCHES};
use crate::precedents::HISTORICAL_CASES_NODE;
use crate::records::{ForensicGuideline, LegalSection};
use crate::services::Services;
use crate::{facts, investigation, mapping, precedents};

/// Ids of the mapping branches, in fan-out order.
pub fn mapping_ids() -> Vec<&'static str> {
    STATUTE_BRANCHES
        .iter()
        .chain(std::iter::once(&FORENSIC))
        .map(|b: &Branch| b.node_id)
        .collect()
}

/// Build and validate the case-analysis graph.
pub fn build_case_graph(services: Arc<Services>) -> Result<WorkflowGraph> {
    let mut builder = GraphBuilder::new()
        .node(read_document_node(services.clone()))
        .node(translate_node(services.clone()))
        .node(facts::node(services.clone()));

    for branch in STATUTE_BRANCHES {
        builder = builder.node(mapping::node::<LegalSection>(branch, services.clone()));
    }
    builder = builder
        .node(mapping::node::<ForensicGuideline>(FORENSIC, services.clone()))
        .node(investigation::node(services.clone()))
        .node(evidence_checklist_node(services.clone()))
        .node(dos_and_donts_node(services.clone()))
        .node(weaknesses_node(services.clone()));

    let branches = mapping_ids();
    builder = builder
        .entry(READ_DOCUMENT)
        .edge(READ_DOCUMENT, TRANSLATE)
        .edge(TRANSLATE, facts::EXTRACT_CASE_FACTS)
        .fan_out(facts::EXTRACT_CASE_FACTS, branches.iter().copied())
        .join(branches.iter().copied(), INVESTIGATION_PLAN)
        .edge(INVESTIGATION_PLAN, EVIDENCE_CHECKLIST_NODE)
        .fan_out(EVIDENCE_CHECKLIST_NODE, [DOS_AND_DONTS_NODE, WEAKNESSES_NODE]);

    if let Some(search) = services.search.clone() {
        builder = builder
            .node(precedents::node(services.clone(), search))
            .edge(TRANSLATE, HISTORICAL_CASES_NODE);
    }

    Ok(builder.build()?)
}

/// The case-analysis workflow, ready to invoke.
pub fn case_workflow(services: Arc<Services>) -> Result<Workflow> {
    Ok(Workflow::new(build_case_graph(services)?))
}
