//! Structured records requested from the inference backend.

use serde::{Deserialize, Serialize};
use serde_json::json;

use casegraph_core::types::{DedupRecord, ResponseShape, Structured};

/// A statutory provision mapped to the facts of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalSection {
    /// Provision label as printed in the act, e.g. "Section 20 (b)".
    pub section_number: String,
    pub section_description: String,
    pub why_section_is_relevant: String,
    /// "Page X, Document: [pdf_name], Source URL: [url]".
    pub source: String,
}

impl DedupRecord for LegalSection {
    fn dedup_key(&self) -> &str {
        &self.section_number
    }
}

impl Structured for LegalSection {
    fn shape() -> ResponseShape {
        ResponseShape::new("legal_section", section_schema())
    }
}

fn section_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "section_number": {"type": "string", "description": "Section label exactly as in the retrieved text"},
            "section_description": {"type": "string", "description": "What the section covers, from the retrieved text only"},
            "why_section_is_relevant": {"type": "string", "description": "How the case facts connect to this section"},
            "source": {"type": "string", "description": "Page X, Document: [pdf_name], Source URL: [source_url]"}
        },
        "required": ["section_number", "section_description", "why_section_is_relevant", "source"],
        "additionalProperties": false
    })
}

/// A forensic-procedure guideline mapped to the facts of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicGuideline {
    pub guideline_topic: String,
    pub guideline_description: String,
    pub why_guideline_is_relevant: String,
    pub source: String,
}

impl DedupRecord for ForensicGuideline {
    fn dedup_key(&self) -> &str {
        &self.guideline_topic
    }
}

impl Structured for ForensicGuideline {
    fn shape() -> ResponseShape {
        ResponseShape::new("forensic_guideline", guideline_schema())
    }
}

fn guideline_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "guideline_topic": {"type": "string", "description": "Topic or heading from the forensic guide"},
            "guideline_description": {"type": "string", "description": "What the guideline covers, from the retrieved text only"},
            "why_guideline_is_relevant": {"type": "string", "description": "How the case facts connect to this guideline"},
            "source": {"type": "string", "description": "Page X, Document: [pdf_name], Source URL: [source_url]"}
        },
        "required": ["guideline_topic", "guideline_description", "why_guideline_is_relevant", "source"],
        "additionalProperties": false
    })
}

/// Sections found applicable to one factual point.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionBatch {
    #[serde(default)]
    pub sections: Vec<LegalSection>,
}

impl Structured for SectionBatch {
    fn shape() -> ResponseShape {
        ResponseShape::new(
            "legal_sections",
            json!({
                "type": "object",
                "properties": {"sections": {"type": "array", "items": section_schema()}},
                "required": ["sections"],
                "additionalProperties": false
            }),
        )
    }
}

/// Guidelines found applicable to one factual point.
#[derive(Debug, Clone, Deserialize)]
pub struct GuidelineBatch {
    #[serde(default)]
    pub guidelines: Vec<ForensicGuideline>,
}

impl Structured for GuidelineBatch {
    fn shape() -> ResponseShape {
        ResponseShape::new(
            "forensic_guidelines",
            json!({
                "type": "object",
                "properties": {"guidelines": {"type": "array", "items": guideline_schema()}},
                "required": ["guidelines"],
                "additionalProperties": false
            }),
        )
    }
}

/// Short factual statements lifted from the document.
#[derive(Debug, Clone, Deserialize)]
pub struct FactualPoints {
    pub points: Vec<String>,
}

impl Structured for FactualPoints {
    fn shape() -> ResponseShape {
        ResponseShape::new("factual_points", string_list_schema("points"))
    }
}

/// A JSON Schema for `{ <field>: [string] }`.
pub(crate) fn string_list_schema(field: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {field: {"type": "array", "items": {"type": "string"}}},
        "required": [field],
        "additionalProperties": false
    })
}
