// src/config/ai.rs
use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_concurrency() -> usize {
    2
}
fn default_call_timeout_secs() -> u64 {
    20
}
fn default_enabled() -> bool {
    true
}

/// Enrichment provider settings (`[ai]` table of the ingest config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Only "openai" is implemented (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" or absent means: read from OPENAI_API_KEY.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Max enrichment calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-call timeout; a slower call counts as a failed enrichment.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Deterministic offline client (env `AI_TEST_MODE=mock`).
    #[serde(default)]
    pub mock: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            mock: false,
        }
    }
}

impl AiConfig {
    /// Overlay environment variables looked up through `get`.
    pub fn apply_env_with<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("ENRICH_ENABLED") {
            self.enabled = parse_flag(&v);
        }
        if let Some(v) = get("ENRICH_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            self.concurrency = v;
        }
        if let Some(v) = get("ENRICH_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.call_timeout_secs = v;
        }
        if let Some(v) = get("OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model = v.trim().to_string();
        }
        if let Some(v) = get("OPENAI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = v.trim().to_string();
        }
        if get("AI_TEST_MODE").is_some_and(|v| v.trim() == "mock") {
            self.mock = true;
        }

        // Resolve api key if "ENV" or absent
        let wants_env = self
            .api_key
            .as_deref()
            .map(|k| k.trim().is_empty() || k.trim().eq_ignore_ascii_case("env"))
            .unwrap_or(true);
        if wants_env {
            self.api_key = get("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        }
    }

    /// Normalize provider name and keep numeric knobs in range.
    pub fn sanitize(&mut self) {
        self.provider = self.provider.trim().to_ascii_lowercase();
        if self.concurrency == 0 {
            self.concurrency = default_concurrency();
        }
        if self.call_timeout_secs == 0 {
            self.call_timeout_secs = default_call_timeout_secs();
        }
    }

    /// True when a live provider will be called.
    pub fn needs_credential(&self) -> bool {
        self.enabled && !self.mock
    }
}

pub(crate) fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_key_resolves_when_marked_env() {
        let mut cfg = AiConfig {
            api_key: Some("ENV".into()),
            ..AiConfig::default()
        };
        cfg.apply_env_with(env(&[("OPENAI_API_KEY", "sk-1")]));
        assert_eq!(cfg.api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn explicit_key_is_kept() {
        let mut cfg = AiConfig {
            api_key: Some("sk-file".into()),
            ..AiConfig::default()
        };
        cfg.apply_env_with(env(&[("OPENAI_API_KEY", "sk-env")]));
        assert_eq!(cfg.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn env_overrides_knobs() {
        let mut cfg = AiConfig::default();
        cfg.apply_env_with(env(&[
            ("ENRICH_ENABLED", "0"),
            ("ENRICH_CONCURRENCY", "5"),
            ("AI_TEST_MODE", "mock"),
        ]));
        assert!(!cfg.enabled);
        assert_eq!(cfg.concurrency, 5);
        assert!(cfg.mock);
        assert!(!cfg.needs_credential());
    }

    #[test]
    fn sanitize_fixes_zero_and_case() {
        let mut cfg = AiConfig {
            provider: " OpenAI ".into(),
            concurrency: 0,
            call_timeout_secs: 0,
            ..AiConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.call_timeout_secs, 20);
    }
}
