use std::io::Write;

use casegraph_core::config::AppConfig;

fn load(toml_content: &str) -> AppConfig {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");
    AppConfig::load(tmp.path()).expect("load config")
}

#[test]
fn test_load_full_config_from_file() {
    let config = load(
        r#"
[model]
provider = "anthropic"
model_id = "claude-sonnet-4-20250514"
api_key = "sk-test-key"
max_tokens = 4096
temperature = 0.5

[retry]
max_attempts = 3
base_delay_ms = 500
max_delay_ms = 10000

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dimensions = 768

[retrieval]
index_dir = "/tmp/casegraph-indexes"
top_k = 8

[translation]
project_id = "fir-project"
api_key = "ya29.token"

[web_search]
api_key = "tvly-test"
max_results = 3

[ingestion]
extraction_url = "http://localhost:9000/extract"

[gateway]
bind = "127.0.0.1:9999"
max_upload_bytes = 1048576
"#,
    );

    assert_eq!(config.model.provider, "anthropic");
    assert_eq!(config.model.model_id, "claude-sonnet-4-20250514");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));

    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 500);
    assert_eq!(config.retry.max_delay_ms, 10000);

    let embedding = config.embedding.as_ref().expect("embedding present");
    assert_eq!(embedding.model, "nomic-embed-text");
    assert_eq!(embedding.dimensions, 768);

    assert_eq!(config.retrieval.top_k, 8);
    assert_eq!(
        config.index_dir(),
        std::path::PathBuf::from("/tmp/casegraph-indexes")
    );

    let translation = config.translation.expect("translation present");
    assert_eq!(translation.location, "global");
    assert_eq!(translation.target_language, "en");

    let search = config.web_search.expect("web search present");
    assert_eq!(search.provider, "tavily");
    assert_eq!(search.max_results, 3);

    assert_eq!(
        config.ingestion.extraction_url.as_deref(),
        Some("http://localhost:9000/extract")
    );
    assert_eq!(config.gateway.bind, "127.0.0.1:9999");
    assert_eq!(config.gateway.max_upload_bytes, 1048576);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("CASEGRAPH_TEST_API_KEY", "expanded-key-value");

    let config = load(
        r#"
[model]
model_id = "test-model"
api_key = "${CASEGRAPH_TEST_API_KEY}"
"#,
    );
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("CASEGRAPH_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = load(
        r#"
[model]
model_id = "llama3.2"
"#,
    );

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.retry.max_delay_ms, 60_000);
    assert_eq!(config.retrieval.top_k, 5);
    assert!(config.embedding.is_none());
    assert!(config.translation.is_none());
    assert!(config.web_search.is_none());
    assert!(config.ingestion.extraction_url.is_none());
    assert_eq!(config.gateway.bind, "0.0.0.0:8000");
    assert_eq!(config.gateway.max_upload_bytes, 20 * 1024 * 1024);
}

#[test]
fn test_out_of_range_jitter_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model]\nmodel_id = \"m\"\n\n[retry]\njitter_fraction = 1e30\n")
        .expect("write toml");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(
        err,
        casegraph_core::error::CaseGraphError::Config(ref msg) if msg.contains("jitter_fraction")
    ));
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/casegraph.toml")).unwrap_err();
    assert!(matches!(
        err,
        casegraph_core::error::CaseGraphError::ConfigNotFound(_)
    ));
}
