use std::net::SocketAddr;

use casegraph_core::config::AppConfig;
use casegraph_memory::IndexStore;
use casegraph_stages::mapping::{FORENSIC, STATUTE_BRANCHES};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        check_api_key(config),
        check_embedding(config),
        check_indexes(config),
        check_translation(config),
        check_ingestion(config),
        check_web_search(config),
        check_retry(config),
        check_gateway(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn is_set(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.is_empty() && !k.starts_with("${"))
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let provider = &config.model.provider;
    let needs_key = provider != "ollama";

    if !needs_key || is_set(config.model.api_key.as_deref()) {
        CheckResult {
            label: "API Key".into(),
            ok: true,
            detail: format!("Configured for {} ({})", config.model.model_id, provider),
        }
    } else {
        CheckResult {
            label: "API Key".into(),
            ok: false,
            detail: format!("No API key set for provider '{}'", provider),
        }
    }
}

fn check_embedding(config: &AppConfig) -> CheckResult {
    match &config.embedding {
        Some(e) => CheckResult {
            label: "Embeddings".into(),
            ok: e.provider == "ollama" || is_set(e.api_key.as_deref()),
            detail: format!("{} ({}, {} dims)", e.model, e.provider, e.dimensions),
        },
        None => CheckResult {
            label: "Embeddings".into(),
            ok: false,
            detail: "No [embedding] section; retrieval is unavailable".into(),
        },
    }
}

fn check_indexes(config: &AppConfig) -> CheckResult {
    let store = IndexStore::new(config.index_dir());
    let available = store.available();
    let missing: Vec<&str> = STATUTE_BRANCHES
        .iter()
        .chain(std::iter::once(&FORENSIC))
        .map(|b| b.corpus)
        .filter(|c| !available.iter().any(|a| a == c))
        .collect();

    if missing.is_empty() {
        CheckResult {
            label: "Indexes".into(),
            ok: true,
            detail: format!("{} ({})", store.dir().display(), available.join(", ")),
        }
    } else {
        CheckResult {
            label: "Indexes".into(),
            ok: false,
            detail: format!(
                "{}: missing {} (build with `casegraph index <corpus> <chunks.jsonl>`)",
                store.dir().display(),
                missing.join(", ")
            ),
        }
    }
}

fn check_translation(config: &AppConfig) -> CheckResult {
    match &config.translation {
        Some(t) if is_set(Some(&t.api_key)) => CheckResult {
            label: "Translation".into(),
            ok: true,
            detail: format!("Google project {} -> {}", t.project_id, t.target_language),
        },
        Some(_) => CheckResult {
            label: "Translation".into(),
            ok: false,
            detail: "translation.api_key is empty".into(),
        },
        None => CheckResult {
            label: "Translation".into(),
            ok: true,
            detail: "Not configured (text passes through)".into(),
        },
    }
}

fn check_ingestion(config: &AppConfig) -> CheckResult {
    match &config.ingestion.extraction_url {
        Some(url) => CheckResult {
            label: "Ingestion".into(),
            ok: url.starts_with("http://") || url.starts_with("https://"),
            detail: format!("PDF extraction via {}", url),
        },
        None => CheckResult {
            label: "Ingestion".into(),
            ok: true,
            detail: "Plain text only (no extraction_url)".into(),
        },
    }
}

fn check_web_search(config: &AppConfig) -> CheckResult {
    match &config.web_search {
        Some(ws) => CheckResult {
            label: "Web search".into(),
            ok: ws.provider == "tavily" && is_set(Some(&ws.api_key)),
            detail: format!("{} (max {} results)", ws.provider, ws.max_results),
        },
        None => CheckResult {
            label: "Web search".into(),
            ok: true,
            detail: "Not configured (historical cases skipped)".into(),
        },
    }
}

fn check_retry(config: &AppConfig) -> CheckResult {
    let r = &config.retry;
    if r.base_delay_ms > r.max_delay_ms {
        return CheckResult {
            label: "Retry".into(),
            ok: false,
            detail: format!(
                "base_delay_ms ({}) > max_delay_ms ({})",
                r.base_delay_ms, r.max_delay_ms
            ),
        };
    }
    CheckResult {
        label: "Retry".into(),
        ok: true,
        detail: format!(
            "{} retries, {}ms..{}ms",
            r.max_attempts, r.base_delay_ms, r.max_delay_ms
        ),
    }
}

fn check_gateway(config: &AppConfig) -> CheckResult {
    match config.gateway.bind.parse::<SocketAddr>() {
        Ok(addr) => CheckResult {
            label: "Gateway".into(),
            ok: true,
            detail: format!("{} (uploads up to {} bytes)", addr, config.gateway.max_upload_bytes),
        },
        Err(e) => CheckResult {
            label: "Gateway".into(),
            ok: false,
            detail: format!("bad bind address '{}': {}", config.gateway.bind, e),
        },
    }
}
