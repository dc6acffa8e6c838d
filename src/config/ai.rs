// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";

fn default_api_base() -> String {
    "https://api.deepseek.com/v1".to_string()
}
fn default_model() -> String {
    "deepseek-reasoner".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

/// Chat-completions endpoint used for compliance analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from DEEPSEEK_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff step; doubles after every failed attempt.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: default_api_key(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiConfig {
    /// Key to send, with the "ENV" indirection resolved. `None` when no key is available.
    pub fn resolved_api_key(&self) -> Option<String> {
        let raw = self.api_key.trim();
        let key = if raw.eq_ignore_ascii_case("env") {
            env::var(ENV_DEEPSEEK_API_KEY).ok()?
        } else {
            raw.to_string()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    /// Clamp values a hand-edited config may get wrong.
    pub fn sanitized(mut self) -> Self {
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_retries == 0 {
            self.max_retries = 1;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: AiConfig = serde_json::from_str(r#"{"model":"deepseek-chat"}"#).unwrap();
        assert_eq!(cfg.model, "deepseek-chat");
        assert_eq!(cfg.api_base, "https://api.deepseek.com/v1");
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn sanitize_fixes_out_of_range_values() {
        let cfg = AiConfig {
            temperature: 7.0,
            max_retries: 0,
            api_base: "https://example.test/v1/".into(),
            ..AiConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.temperature, 0.3);
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.api_base, "https://example.test/v1");
    }

    #[test]
    fn literal_key_is_used_as_is() {
        let cfg = AiConfig {
            api_key: " sk-test ".into(),
            ..AiConfig::default()
        };
        assert_eq!(cfg.resolved_api_key().as_deref(), Some("sk-test"));
    }
}
