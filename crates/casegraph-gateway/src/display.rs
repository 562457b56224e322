//! Shapes a stored run for the results page.

use serde::Serialize;
use serde_json::Value;

use casegraph_stages::keys::{
    BNSS_SECTIONS, BNS_SECTIONS, BSA_SECTIONS, CASE_FACTS, DOCUMENT_FILENAME, DOCUMENT_TEXT,
    DOCUMENT_TEXT_EN, DONTS, DOS, EVIDENCE_CHECKLIST, FORENSIC_GUIDELINES, HISTORICAL_CASES,
    NDPS_SECTIONS, NEXT_STEPS, PROSECUTION_WEAKNESSES,
};
use casegraph_stages::prompt::preview;

pub const WORKFLOW_ID: &str = "workflow_id";
const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayStats {
    pub ndps_count: usize,
    pub bns_count: usize,
    pub bnss_count: usize,
    pub bsa_count: usize,
    pub forensic_count: usize,
    pub next_steps_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplayState {
    pub workflow_id: Option<String>,
    pub document_filename: Option<String>,
    pub text_preview: Option<String>,
    pub text_en_preview: Option<String>,
    pub case_facts: Option<Value>,
    pub ndps_sections: Vec<Value>,
    pub bns_sections: Vec<Value>,
    pub bnss_sections: Vec<Value>,
    pub bsa_sections: Vec<Value>,
    pub forensic_guidelines: Vec<Value>,
    pub next_steps: Vec<String>,
    pub evidence_checklist: Vec<String>,
    pub dos: Vec<String>,
    pub donts: Vec<String>,
    pub prosecution_weaknesses: Vec<String>,
    pub historical_cases: Vec<Value>,
    pub stats: DisplayStats,
}

/// Mapped records as a list. Older results may carry the list as a JSON
/// string; anything unparseable shows as empty.
fn records(state: &Value, key: &str) -> Vec<Value> {
    match state.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn strings(state: &Value, key: &str) -> Vec<String> {
    state
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn text(state: &Value, key: &str) -> Option<String> {
    state
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn format_for_display(state: &Value) -> DisplayState {
    let ndps_sections = records(state, NDPS_SECTIONS);
    let bns_sections = records(state, BNS_SECTIONS);
    let bnss_sections = records(state, BNSS_SECTIONS);
    let bsa_sections = records(state, BSA_SECTIONS);
    let forensic_guidelines = records(state, FORENSIC_GUIDELINES);
    let next_steps = strings(state, NEXT_STEPS);

    let stats = DisplayStats {
        ndps_count: ndps_sections.len(),
        bns_count: bns_sections.len(),
        bnss_count: bnss_sections.len(),
        bsa_count: bsa_sections.len(),
        forensic_count: forensic_guidelines.len(),
        next_steps_count: next_steps.len(),
    };

    DisplayState {
        workflow_id: text(state, WORKFLOW_ID),
        document_filename: text(state, DOCUMENT_FILENAME),
        text_preview: text(state, DOCUMENT_TEXT).map(|t| preview(&t, PREVIEW_CHARS)),
        text_en_preview: text(state, DOCUMENT_TEXT_EN).map(|t| preview(&t, PREVIEW_CHARS)),
        case_facts: state.get(CASE_FACTS).filter(|v| !v.is_null()).cloned(),
        ndps_sections,
        bns_sections,
        bnss_sections,
        bsa_sections,
        forensic_guidelines,
        next_steps,
        evidence_checklist: strings(state, EVIDENCE_CHECKLIST),
        dos: strings(state, DOS),
        donts: strings(state, DONTS),
        prosecution_weaknesses: strings(state, PROSECUTION_WEAKNESSES),
        historical_cases: records(state, HISTORICAL_CASES),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_and_previews() {
        let state = json!({
            "workflow_id": "abc",
            "document_filename": "fir.pdf",
            "document_text": "x".repeat(800),
            "document_text_en": "short",
            "ndps_sections_mapped": [{"section_number": "Section 20"}, {"section_number": "Section 8"}],
            "bns_sections_mapped": "[{\"section_number\": \"Section 111\"}]",
            "bsa_sections_mapped": "not json",
            "next_steps": ["Send samples", "Record statements", 3],
        });
        let display = format_for_display(&state);

        assert_eq!(display.workflow_id.as_deref(), Some("abc"));
        assert_eq!(display.text_preview.as_ref().unwrap().chars().count(), 503);
        assert_eq!(display.text_en_preview.as_deref(), Some("short"));
        assert_eq!(
            display.stats,
            DisplayStats {
                ndps_count: 2,
                bns_count: 1,
                bnss_count: 0,
                bsa_count: 0,
                forensic_count: 0,
                next_steps_count: 2,
            }
        );
        assert!(display.case_facts.is_none());
    }

    #[test]
    fn test_empty_state() {
        let display = format_for_display(&json!({}));
        assert!(display.text_preview.is_none());
        assert_eq!(display.stats, DisplayStats::default());
    }
}
