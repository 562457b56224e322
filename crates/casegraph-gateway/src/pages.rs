//! Server-rendered HTML.

use std::fmt::Write;

use serde_json::Value;

use crate::display::DisplayState;

pub const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>FIR analysis</title></head>
<body>
<h1>FIR analysis</h1>
<form id="upload" enctype="multipart/form-data">
  <input type="file" name="file" accept=".pdf,.txt" required>
  <button type="submit">Analyze</button>
</form>
<p id="status"></p>
<script>
document.getElementById("upload").addEventListener("submit", async (e) => {
  e.preventDefault();
  const status = document.getElementById("status");
  status.textContent = "Processing...";
  const resp = await fetch("/upload", { method: "POST", body: new FormData(e.target) });
  const body = await resp.json();
  if (body.success) {
    window.location = body.redirect_url;
  } else {
    status.textContent = body.error || body.detail || "Upload failed";
  }
});
</script>
</body>
</html>
"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn field<'a>(record: &'a Value, name: &str) -> &'a str {
    record.get(name).and_then(Value::as_str).unwrap_or("")
}

fn first_of<'a>(record: &'a Value, names: &[&str]) -> &'a str {
    names
        .iter()
        .map(|n| field(record, n))
        .find(|v| !v.is_empty())
        .unwrap_or("")
}

fn list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(out, "<h2>{}</h2>\n<ol>\n", escape(title));
    for item in items {
        let _ = writeln!(out, "<li>{}</li>", escape(item));
    }
    out.push_str("</ol>\n");
}

fn record_table(out: &mut String, title: &str, key_field: &str, records: &[Value]) {
    let _ = writeln!(out, "<h2>{} ({})</h2>", escape(title), records.len());
    if records.is_empty() {
        out.push_str("<p>None identified.</p>\n");
        return;
    }
    out.push_str("<table>\n");
    for record in records {
        let description = first_of(record, &["section_description", "guideline_description"]);
        let relevance = first_of(record, &["why_section_is_relevant", "why_guideline_is_relevant"]);
        let _ = writeln!(
            out,
            "<tr><th>{}</th><td>{}<br><em>{}</em><br><small>{}</small></td></tr>",
            escape(field(record, key_field)),
            escape(description),
            escape(relevance),
            escape(field(record, "source")),
        );
    }
    out.push_str("</table>\n");
}

pub fn render_results(state: &DisplayState) -> String {
    let mut out = String::from(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>FIR analysis results</title></head>\n<body>\n",
    );
    let _ = writeln!(
        out,
        "<h1>Results for {}</h1>",
        escape(state.document_filename.as_deref().unwrap_or("uploaded document"))
    );
    if let Some(id) = &state.workflow_id {
        let _ = writeln!(
            out,
            "<p>Workflow <code>{0}</code> &middot; <a href=\"/api/results/{0}\">JSON</a></p>",
            escape(id)
        );
    }

    let s = &state.stats;
    let _ = writeln!(
        out,
        "<p>NDPS: {} &middot; BNS: {} &middot; BNSS: {} &middot; BSA: {} &middot; Forensic: {} &middot; Next steps: {}</p>",
        s.ndps_count, s.bns_count, s.bnss_count, s.bsa_count, s.forensic_count, s.next_steps_count
    );

    if let Some(preview) = &state.text_en_preview {
        let _ = writeln!(out, "<h2>Document (English)</h2>\n<pre>{}</pre>", escape(preview));
    }
    if let Some(summary) = state
        .case_facts
        .as_ref()
        .and_then(|f| f.get("summary"))
        .and_then(Value::as_str)
    {
        let _ = writeln!(out, "<h2>Case facts</h2>\n<p>{}</p>", escape(summary));
    }

    record_table(&mut out, "NDPS Act", "section_number", &state.ndps_sections);
    record_table(&mut out, "Bharatiya Nyaya Sanhita", "section_number", &state.bns_sections);
    record_table(&mut out, "Bharatiya Nagarik Suraksha Sanhita", "section_number", &state.bnss_sections);
    record_table(&mut out, "Bharatiya Sakshya Adhiniyam", "section_number", &state.bsa_sections);
    record_table(&mut out, "Forensic guidelines", "guideline_topic", &state.forensic_guidelines);

    list(&mut out, "Next steps", &state.next_steps);
    list(&mut out, "Evidence checklist", &state.evidence_checklist);
    list(&mut out, "Dos", &state.dos);
    list(&mut out, "Donts", &state.donts);
    list(&mut out, "Prosecution weaknesses", &state.prosecution_weaknesses);

    if !state.historical_cases.is_empty() {
        out.push_str("<h2>Historical cases</h2>\n<ul>\n");
        for case in &state.historical_cases {
            let _ = writeln!(
                out,
                "<li><a href=\"{}\">{}</a><br>{}</li>",
                escape(field(case, "url")),
                escape(field(case, "title")),
                escape(field(case, "summary")),
            );
        }
        out.push_str("</ul>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::format_for_display;
    use serde_json::json;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_render_escapes_model_output() {
        let state = format_for_display(&json!({
            "workflow_id": "w1",
            "document_filename": "fir.txt",
            "ndps_sections_mapped": [{
                "section_number": "Section 20",
                "section_description": "<script>alert(1)</script>",
                "why_section_is_relevant": "Ganja seized",
                "source": "Page 4"
            }],
            "dos": ["Seal samples"],
        }));
        let html = render_results(&state);
        assert!(html.contains("Results for fir.txt"));
        assert!(html.contains("NDPS Act (1)"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("<li>Seal samples</li>"));
        assert!(!html.contains("<h2>Donts</h2>"));
    }
}
