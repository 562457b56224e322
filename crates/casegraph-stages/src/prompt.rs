//! Formatting helpers shared by the stage prompts.

use casegraph_core::types::RetrievalHit;
use serde_json::Value;

const RULE: &str = "--------------------------------------------------------------------------------";

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Like [`truncate_chars`], with "..." appended when anything was cut.
pub fn preview(text: &str, max: usize) -> String {
    let head = truncate_chars(text, max);
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

/// Section label of a statute chunk: section plus subsection when present.
pub fn section_label(hit: &RetrievalHit) -> String {
    let section = hit.field("section").unwrap_or("Unknown section");
    match hit.field("subsection").filter(|s| !s.is_empty()) {
        Some(sub) => format!("{} {}", section, sub),
        None => section.to_string(),
    }
}

/// The citation line stored on mapped records.
pub fn source_line(hit: &RetrievalHit) -> String {
    let page = match hit.chunk.get("page_number") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => "?".to_string(),
    };
    format!(
        "Page {}, Document: {}, Source URL: {}",
        page,
        hit.field("pdf_name").unwrap_or("unknown"),
        hit.field("source_url").unwrap_or("unknown"),
    )
}

/// Render retrieved statute chunks for a mapping prompt.
pub fn format_statute_hits(hits: &[RetrievalHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&section_label(hit));
        out.push('\n');
        if let Some(chapter) = hit.field("chapter") {
            out.push_str(&format!(
                "Chapter: {} - {}\n",
                chapter,
                hit.field("chapter_heading").unwrap_or("")
            ));
        }
        out.push_str(&format!("Chunk {}: {}\n", i + 1, source_line(hit)));
        out.push_str(&format!("Legal Text:\n{}\n", hit.content().unwrap_or("")));
        out.push_str(RULE);
        out.push('\n');
    }
    out
}

/// Render retrieved forensic-guide chunks for a mapping prompt.
pub fn format_guide_hits(hits: &[RetrievalHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let topic = hit
            .field("heading")
            .or_else(|| hit.field("section"))
            .unwrap_or("Untitled");
        out.push_str(&format!("Topic: {}\n", topic));
        out.push_str(&format!("Chunk {}: {}\n", i + 1, source_line(hit)));
        out.push_str(&format!("Guide Text:\n{}\n", hit.content().unwrap_or("")));
        out.push_str(RULE);
        out.push('\n');
    }
    out
}

/// One line per mapped record: its key and description.
///
/// Works for both statute sections and forensic guidelines.
pub fn summarize_records(records: Option<&Value>) -> String {
    let Some(Value::Array(items)) = records else {
        return "None".to_string();
    };
    if items.is_empty() {
        return "None".to_string();
    }
    items
        .iter()
        .map(|item| {
            let key = item
                .get("section_number")
                .or_else(|| item.get("guideline_topic"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            let description = item
                .get("section_description")
                .or_else(|| item.get("guideline_description"))
                .and_then(Value::as_str)
                .unwrap_or("");
            format!("- {}: {}", key, description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A numbered list.
pub fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn statute_hit() -> RetrievalHit {
        RetrievalHit {
            chunk: json!({
                "section": "Section 20",
                "subsection": "(b)",
                "chapter": "IV",
                "chapter_heading": "Offences and penalties",
                "content": "Punishment for contravention in relation to cannabis plant and cannabis.",
                "page_number": 15,
                "source_url": "https://www.indiacode.nic.in/ndps",
                "pdf_name": "ndps_act_1985.pdf"
            }),
            score: 0.9,
        }
    }

    #[test]
    fn test_section_label_and_source() {
        let hit = statute_hit();
        assert_eq!(section_label(&hit), "Section 20 (b)");
        assert_eq!(
            source_line(&hit),
            "Page 15, Document: ndps_act_1985.pdf, Source URL: https://www.indiacode.nic.in/ndps"
        );

        let mut bare = hit.clone();
        bare.chunk["subsection"] = Value::Null;
        assert_eq!(section_label(&bare), "Section 20");
    }

    #[test]
    fn test_format_statute_hits() {
        let text = format_statute_hits(&[statute_hit()]);
        assert!(text.starts_with("Section 20 (b)\nChapter: IV - Offences and penalties\n"));
        assert!(text.contains("Legal Text:\nPunishment"));
    }

    #[test]
    fn test_truncate_and_preview() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("नमस्ते", 2), "नम");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }

    #[test]
    fn test_summarize_records() {
        assert_eq!(summarize_records(None), "None");
        assert_eq!(summarize_records(Some(&json!([]))), "None");
        let records = json!([
            {"section_number": "Section 20", "section_description": "Cannabis offences"},
            {"guideline_topic": "Sampling", "guideline_description": "Draw two samples"}
        ]);
        assert_eq!(
            summarize_records(Some(&records)),
            "- Section 20: Cannabis offences\n- Sampling: Draw two samples"
        );
    }
}
