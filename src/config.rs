use std::env;
use std::fmt;

use crate::presets::{self, DEFAULT_PRESET};

const DEFAULT_MODEL_PROVIDER: &str = "gemini";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:3b";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 32_768;
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_TOP_P: f32 = 0.95;
const DEFAULT_TOP_K: u64 = 40;
const DEFAULT_MAX_ATTACHMENT_MB: u64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub max_output_tokens: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub model_provider: String,
    pub model: String,
    pub model_base_url: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub system_prompt_preset: String,
    pub model_timeout_secs: u64,
    pub generation: GenerationSettings,
    pub max_attachment_mb: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model_provider", &self.model_provider)
            .field("model", &self.model)
            .field("model_base_url", &self.model_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("system_prompt", &self.system_prompt)
            .field("system_prompt_preset", &self.system_prompt_preset)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("generation", &self.generation)
            .field("max_attachment_mb", &self.max_attachment_mb)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let model_provider = get_var("MODEL_PROVIDER")
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_PROVIDER.to_string());
        let (default_model, default_base_url) = provider_defaults(&model_provider);

        let system_prompt_preset = parse_preset(get_var("SYSTEM_PROMPT_PRESET").as_deref());
        let system_prompt = get_var("SYSTEM_PROMPT").unwrap_or_else(|| {
            presets::prompt_text(&system_prompt_preset)
                .unwrap_or_default()
                .to_string()
        });
        let api_key = non_empty(get_var("GOOGLE_API_KEY"))
            .or_else(|| non_empty(get_var("GEMINI_API_KEY")));

        let generation = GenerationSettings {
            max_output_tokens: parse_positive_u64(
                get_var("MAX_OUTPUT_TOKENS").as_deref(),
                DEFAULT_MAX_OUTPUT_TOKENS,
            ),
            temperature: parse_unit_f32(get_var("TEMPERATURE").as_deref(), 2.0, DEFAULT_TEMPERATURE),
            top_p: parse_unit_f32(get_var("TOP_P").as_deref(), 1.0, DEFAULT_TOP_P),
            top_k: parse_positive_u64(get_var("TOP_K").as_deref(), DEFAULT_TOP_K),
        };

        Self {
            model: non_empty(get_var("MODEL")).unwrap_or_else(|| default_model.to_string()),
            model_base_url: non_empty(get_var("MODEL_BASE_URL"))
                .unwrap_or_else(|| default_base_url.to_string()),
            model_provider,
            api_key,
            system_prompt,
            system_prompt_preset,
            model_timeout_secs: parse_model_timeout_secs(get_var("MODEL_TIMEOUT_SECS").as_deref()),
            generation,
            max_attachment_mb: parse_positive_u64(
                get_var("MAX_ATTACHMENT_MB").as_deref(),
                DEFAULT_MAX_ATTACHMENT_MB,
            ),
        }
    }

    /// The configured system prompt, or `None` when it is blank.
    pub fn effective_system_prompt(&self) -> Option<String> {
        non_empty(Some(self.system_prompt.clone()))
    }

    pub fn max_attachment_bytes(&self) -> u64 {
        self.max_attachment_mb.saturating_mul(1024 * 1024)
    }
}

fn provider_defaults(provider: &str) -> (&'static str, &'static str) {
    match provider {
        "ollama" => (DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_BASE_URL),
        _ => (DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_BASE_URL),
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_preset(raw: Option<&str>) -> String {
    raw.and_then(presets::find)
        .map(|preset| preset.key)
        .unwrap_or(DEFAULT_PRESET)
        .to_string()
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_model_timeout_secs(raw: Option<&str>) -> u64 {
    parse_positive_u64(raw, DEFAULT_MODEL_TIMEOUT_SECS)
}

fn parse_unit_f32(raw: Option<&str>, max: f32, default: f32) -> f32 {
    raw.and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite() && (0.0..=max).contains(value))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{
        Config, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, DEFAULT_MAX_ATTACHMENT_MB,
        DEFAULT_MODEL_PROVIDER, DEFAULT_MODEL_TIMEOUT_SECS, DEFAULT_OLLAMA_BASE_URL,
        DEFAULT_OLLAMA_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TOP_P, GenerationSettings,
        parse_model_timeout_secs, parse_preset, parse_unit_f32,
    };
    use crate::presets;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_env_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn from_env_uses_defaults_when_vars_are_missing() {
        let cfg = config_from_pairs(&[]);
        assert_eq!(cfg.model_provider, DEFAULT_MODEL_PROVIDER);
        assert_eq!(cfg.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(cfg.model_base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.system_prompt_preset, "default");
        assert_eq!(cfg.system_prompt, presets::prompt_text("default").unwrap());
        assert_eq!(cfg.model_timeout_secs, DEFAULT_MODEL_TIMEOUT_SECS);
        assert_eq!(cfg.generation, GenerationSettings::default());
        assert_eq!(cfg.max_attachment_mb, DEFAULT_MAX_ATTACHMENT_MB);
    }

    #[test]
    fn from_env_reads_configured_values() {
        let cfg = config_from_pairs(&[
            ("MODEL_PROVIDER", " Ollama "),
            ("MODEL", "llama3:8b"),
            ("MODEL_BASE_URL", "http://localhost:9999"),
            ("GOOGLE_API_KEY", "secret"),
            ("SYSTEM_PROMPT", "Be concise."),
            ("MODEL_TIMEOUT_SECS", "15"),
            ("MAX_OUTPUT_TOKENS", "1024"),
            ("TEMPERATURE", "0.7"),
            ("TOP_P", "0.5"),
            ("TOP_K", "12"),
            ("MAX_ATTACHMENT_MB", "5"),
        ]);

        assert_eq!(cfg.model_provider, "ollama");
        assert_eq!(cfg.model, "llama3:8b");
        assert_eq!(cfg.model_base_url, "http://localhost:9999");
        assert_eq!(cfg.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.system_prompt, "Be concise.");
        assert_eq!(cfg.model_timeout_secs, 15);
        assert_eq!(
            cfg.generation,
            GenerationSettings {
                max_output_tokens: 1024,
                temperature: 0.7,
                top_p: 0.5,
                top_k: 12,
            }
        );
        assert_eq!(cfg.max_attachment_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn ollama_provider_gets_its_own_defaults() {
        let cfg = config_from_pairs(&[("MODEL_PROVIDER", "ollama")]);
        assert_eq!(cfg.model, DEFAULT_OLLAMA_MODEL);
        assert_eq!(cfg.model_base_url, DEFAULT_OLLAMA_BASE_URL);
    }

    #[test]
    fn gemini_api_key_is_used_as_fallback() {
        let cfg = config_from_pairs(&[("GOOGLE_API_KEY", "  "), ("GEMINI_API_KEY", "alt-key")]);
        assert_eq!(cfg.api_key.as_deref(), Some("alt-key"));
    }

    #[test]
    fn preset_selects_system_prompt_unless_overridden() {
        let cfg = config_from_pairs(&[("SYSTEM_PROMPT_PRESET", "summarizer")]);
        assert_eq!(cfg.system_prompt, presets::prompt_text("summarizer").unwrap());

        let cfg = config_from_pairs(&[
            ("SYSTEM_PROMPT_PRESET", "summarizer"),
            ("SYSTEM_PROMPT", "Custom."),
        ]);
        assert_eq!(cfg.system_prompt, "Custom.");
    }

    #[test]
    fn empty_system_prompt_disables_it() {
        let cfg = config_from_pairs(&[("SYSTEM_PROMPT", "   ")]);
        assert_eq!(cfg.effective_system_prompt(), None);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let cfg = config_from_pairs(&[("GOOGLE_API_KEY", "top-secret-key")]);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("top-secret-key"), "leaked key: {rendered}");
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn parse_model_timeout_secs_uses_default_for_missing_or_invalid_values() {
        assert_eq!(parse_model_timeout_secs(None), DEFAULT_MODEL_TIMEOUT_SECS);
        assert_eq!(
            parse_model_timeout_secs(Some("not-a-number")),
            DEFAULT_MODEL_TIMEOUT_SECS
        );
        assert_eq!(
            parse_model_timeout_secs(Some("0")),
            DEFAULT_MODEL_TIMEOUT_SECS
        );
        assert_eq!(parse_model_timeout_secs(Some("  90  ")), 90);
    }

    #[test]
    fn parse_unit_f32_rejects_out_of_range_values() {
        assert_eq!(parse_unit_f32(Some("3.5"), 2.0, DEFAULT_TEMPERATURE), DEFAULT_TEMPERATURE);
        assert_eq!(parse_unit_f32(Some("-0.1"), 1.0, DEFAULT_TOP_P), DEFAULT_TOP_P);
        assert_eq!(parse_unit_f32(Some("NaN"), 1.0, DEFAULT_TOP_P), DEFAULT_TOP_P);
        assert_eq!(parse_unit_f32(Some("1.0"), 1.0, DEFAULT_TOP_P), 1.0);
    }

    #[test]
    fn parse_preset_falls_back_to_default() {
        assert_eq!(parse_preset(None), "default");
        assert_eq!(parse_preset(Some("unknown")), "default");
        assert_eq!(parse_preset(Some("TEACHER")), "teacher");
    }

    #[test]
    fn from_env_uses_defaults_for_invalid_numeric_settings() {
        let cfg = config_from_pairs(&[
            ("MODEL_TIMEOUT_SECS", "0"),
            ("MAX_OUTPUT_TOKENS", "-4"),
            ("TOP_K", "many"),
            ("MAX_ATTACHMENT_MB", ""),
        ]);

        assert_eq!(cfg.model_timeout_secs, DEFAULT_MODEL_TIMEOUT_SECS);
        assert_eq!(cfg.generation, GenerationSettings::default());
        assert_eq!(cfg.max_attachment_mb, DEFAULT_MAX_ATTACHMENT_MB);
    }
}
