use casegraph_core::config::ModelConfig;
use casegraph_core::error::{CaseGraphError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_url: &'static str,
    pub needs_api_key: bool,
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    let (default_url, needs_api_key) = match provider {
        "openai" => (OPENAI_API_URL, true),
        "ollama" => ("http://localhost:11434/v1/chat/completions", false),
        "groq" => ("https://api.groq.com/openai/v1/chat/completions", true),
        "openrouter" => ("https://openrouter.ai/api/v1/chat/completions", true),
        "together" => ("https://api.together.xyz/v1/chat/completions", true),
        "mistral" => ("https://api.mistral.ai/v1/chat/completions", true),
        "deepseek" => ("https://api.deepseek.com/v1/chat/completions", true),
        _ => return None,
    };
    Some(ProviderPreset {
        default_url,
        needs_api_key,
    })
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &[
        "openai",
        "ollama",
        "groq",
        "openrouter",
        "together",
        "mistral",
        "deepseek",
    ]
}

/// Resolved chat-completions endpoint for a model config.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub api_key: Option<String>,
}

/// Work out the URL and key for an OpenAI-compatible provider.
///
/// An explicit `base_url` wins; a bare `/v1` style base gets
/// `/chat/completions` appended. Unknown providers must give a `base_url`.
pub fn resolve_endpoint(config: &ModelConfig) -> Result<Endpoint> {
    let preset = get_preset(&config.provider);

    let url = match (&config.base_url, &preset) {
        (Some(base), _) => chat_url(base),
        (None, Some(p)) => p.default_url.to_string(),
        (None, None) => {
            return Err(CaseGraphError::Config(format!(
                "provider '{}' has no preset; set model.base_url",
                config.provider
            )))
        }
    };

    let api_key = config.api_key.clone().filter(|k| !k.is_empty());
    let needs_key = preset.map(|p| p.needs_api_key).unwrap_or(false);
    if needs_key && api_key.is_none() && config.base_url.is_none() {
        return Err(CaseGraphError::Config(format!(
            "provider '{}' requires model.api_key",
            config.provider
        )));
    }

    Ok(Endpoint { url, api_key })
}

fn chat_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, base_url: Option<&str>, api_key: Option<&str>) -> ModelConfig {
        ModelConfig {
            provider: provider.into(),
            model_id: "m".into(),
            api_key: api_key.map(String::from),
            base_url: base_url.map(String::from),
            max_tokens: 100,
            temperature: 0.0,
            timeout_secs: 10,
        }
    }

    #[test]
    fn test_presets_known() {
        for name in all_preset_names() {
            assert!(get_preset(name).is_some(), "missing preset {name}");
        }
        assert!(get_preset("nonexistent").is_none());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let ep = resolve_endpoint(&config("ollama", None, None)).unwrap();
        assert_eq!(ep.url, "http://localhost:11434/v1/chat/completions");
        assert!(ep.api_key.is_none());
    }

    #[test]
    fn test_base_url_gets_path() {
        let ep = resolve_endpoint(&config("vllm", Some("http://gpu:8000/v1/"), None)).unwrap();
        assert_eq!(ep.url, "http://gpu:8000/v1/chat/completions");

        let ep = resolve_endpoint(&config(
            "openai",
            Some("https://proxy/v1/chat/completions"),
            Some("k"),
        ))
        .unwrap();
        assert_eq!(ep.url, "https://proxy/v1/chat/completions");
    }

    #[test]
    fn test_missing_key_and_unknown_provider() {
        assert!(resolve_endpoint(&config("groq", None, None)).is_err());
        assert!(resolve_endpoint(&config("groq", None, Some(""))).is_err());
        assert!(resolve_endpoint(&config("vllm", None, None)).is_err());
    }
}
