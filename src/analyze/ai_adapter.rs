//! AI adapter: chat-provider abstraction + compliance analysis on top of it.
//!
//! The analyzer never fails. Transport errors and unparseable model output
//! both come back as a structured fallback so callers can render something.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::config::ai::AiConfig;
use crate::ingest::types::UpdateRecord;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Discovery window used when assessing the impact of recent updates.
pub const IMPACT_WINDOW_DAYS: u32 = 30;

const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert EU regulatory compliance consultant specializing in GDPR, \
Digital Services Act, and AI Act. Your task is to analyze business activities against EU regulations \
and provide detailed compliance recommendations.

For each analysis, provide:
1. Relevant regulatory requirements
2. Current compliance gaps
3. Specific action items to achieve compliance
4. Timeline and priority for each action
5. Potential risks of non-compliance

Format your response as a structured JSON object with the following keys:
- regulatory_requirements: array of strings
- compliance_gaps: array of strings
- action_items: array of objects with keys: action, priority, timeline, estimated_cost
- risks: array of strings
- overall_compliance_score: integer from 0-100";

/// What the caller tells us about the business. Every field is optional text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessProfile {
    pub business_name: String,
    pub industry: String,
    pub business_activities: String,
    pub target_markets: String,
    pub data_processing: String,
    pub ai_systems: String,
    pub online_services: String,
    pub current_compliance: String,
}

impl BusinessProfile {
    fn or<'a>(v: &'a str, missing: &'a str) -> &'a str {
        let t = v.trim();
        if t.is_empty() {
            missing
        } else {
            t
        }
    }

    fn prompt(&self) -> String {
        format!(
            "Please analyze the following business for EU regulatory compliance:\n\n\
             Business Name: {}\n\
             Industry: {}\n\
             Business Activities: {}\n\
             Target Markets: {}\n\
             Data Processing Activities: {}\n\
             AI Systems in Use: {}\n\
             Online Services Provided: {}\n\
             Current Compliance Measures: {}\n\n\
             Please provide a comprehensive compliance analysis covering GDPR, Digital Services Act, and AI Act.",
            Self::or(&self.business_name, "Unknown"),
            Self::or(&self.industry, "Unknown"),
            Self::or(&self.business_activities, "Unknown"),
            Self::or(&self.target_markets, "Unknown"),
            Self::or(&self.data_processing, "Unknown"),
            Self::or(&self.ai_systems, "None"),
            Self::or(&self.online_services, "Unknown"),
            Self::or(&self.current_compliance, "None"),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionItem {
    #[serde(deserialize_with = "lenient_text")]
    pub action: String,
    #[serde(deserialize_with = "lenient_text")]
    pub priority: String,
    #[serde(deserialize_with = "lenient_text")]
    pub timeline: String,
    #[serde(deserialize_with = "lenient_text")]
    pub estimated_cost: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceAnalysis {
    pub regulatory_requirements: Vec<String>,
    pub compliance_gaps: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub risks: Vec<String>,
    /// 0..=100, clamped on the way in.
    #[serde(deserialize_with = "lenient_score")]
    pub overall_compliance_score: u8,
    pub analysis_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_info: Option<BusinessProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComplianceAnalysis {
    /// Model answered, but not with the JSON we asked for.
    fn unparsed(raw: &str) -> Self {
        Self {
            raw_response: Some(raw.to_string()),
            ..Self::default()
        }
    }

    /// Provider could not be reached at all.
    fn failed(err: &anyhow::Error) -> Self {
        Self {
            error: Some(format!("{err:#}")),
            ..Self::default()
        }
    }

    /// Accept a reply only if it carries at least one analysis field.
    fn from_reply(v: Value) -> Option<Self> {
        const FIELDS: [&str; 5] = [
            "regulatory_requirements",
            "compliance_gaps",
            "action_items",
            "risks",
            "overall_compliance_score",
        ];
        let obj = v.as_object()?;
        if !FIELDS.iter().any(|f| obj.contains_key(*f)) {
            return None;
        }
        serde_json::from_value(v).ok()
    }

    pub fn is_fallback(&self) -> bool {
        self.raw_response.is_some() || self.error.is_some()
    }
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u8, D::Error> {
    let v = Value::deserialize(d)?;
    let n = match &v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(n.round().clamp(0.0, 100.0) as u8)
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Low-level provider: one chat completion, returning the assistant text.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// DeepSeek (OpenAI-compatible chat completions).
pub struct DeepSeekProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    retry_delay: Duration,
}

impl DeepSeekProvider {
    pub fn from_config(cfg: &AiConfig) -> Result<Self> {
        let api_key = cfg
            .resolved_api_key()
            .ok_or_else(|| anyhow!("no DeepSeek API key configured"))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("eu-compliance-monitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", cfg.api_base.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            max_retries: cfg.max_retries.max(1),
            retry_delay: Duration::from_secs(cfg.retry_delay_secs),
        })
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.model,
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            })
            .send()
            .await
            .context("sending chat completion request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            bail!("API request failed with status {status}: {snippet}");
        }
        let body: Resp = resp.json().await.context("decoding chat completion")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion had no content"))
    }
}

#[async_trait]
impl ChatProvider for DeepSeekProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.complete_once(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_retries => {
                    let delay = self.retry_delay.saturating_mul(1u32 << (attempt - 1).min(16));
                    tracing::warn!(target: "ai", attempt, error = %e, ?delay, "chat completion failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e.context(format!("giving up after {attempt} attempts")));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "deepseek"
    }
}

/// Used when no API key is configured; every call fails fast.
pub struct DisabledProvider;

#[async_trait]
impl ChatProvider for DisabledProvider {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("AI analysis is not configured (set DEEPSEEK_API_KEY)")
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Canned replies for tests and offline runs. Records every prompt it sees.
pub struct MockProvider {
    reply: std::result::Result<String, String>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockProvider {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            reply: Err(reason.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().expect("mock mutex poisoned").clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.seen
            .lock()
            .expect("mock mutex poisoned")
            .push(messages.to_vec());
        self.reply.clone().map_err(|r| anyhow!(r))
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Analyzer
// ------------------------------------------------------------

#[derive(Clone)]
pub struct ComplianceAnalyzer {
    provider: Arc<dyn ChatProvider>,
}

impl ComplianceAnalyzer {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    /// DeepSeek when a key is available, otherwise a provider that always
    /// fails (so every answer is the error fallback).
    pub fn from_config(cfg: &AiConfig) -> Self {
        match DeepSeekProvider::from_config(cfg) {
            Ok(p) => {
                // Safe diagnostics: model + key length only
                tracing::info!(
                    target: "ai",
                    model = %cfg.model,
                    key_len = p.api_key.len(),
                    "AI provider ready"
                );
                Self::new(Arc::new(p))
            }
            Err(e) => {
                tracing::warn!(target: "ai", error = %e, "AI analysis disabled");
                Self::new(Arc::new(DisabledProvider))
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    async fn ask(&self, kind: &'static str, messages: Vec<ChatMessage>) -> Result<String> {
        let out = self.provider.complete(&messages).await;
        let outcome = if out.is_ok() { "ok" } else { "error" };
        counter!("ai_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
        if let Err(e) = &out {
            tracing::error!(target: "ai", kind, provider = self.provider.name(), error = %e, "AI request failed");
        }
        out
    }

    pub async fn analyze_compliance(&self, profile: &BusinessProfile) -> ComplianceAnalysis {
        let messages = vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(profile.prompt()),
        ];
        let mut analysis = match self.ask("analysis", messages).await {
            Ok(raw) => match extract_json(&raw).and_then(ComplianceAnalysis::from_reply) {
                Some(parsed) => parsed,
                None => {
                    tracing::warn!(target: "ai", "AI response was not the expected JSON");
                    ComplianceAnalysis::unparsed(&raw)
                }
            },
            Err(e) => ComplianceAnalysis::failed(&e),
        };
        analysis.analysis_date = Utc::now();
        analysis.business_info = Some(profile.clone());
        analysis
    }

    /// 12-month plan derived from an analysis.
    pub async fn generate_roadmap(&self, analysis: &ComplianceAnalysis) -> Value {
        let prompt = format!(
            "Based on the following compliance analysis, create a detailed 12-month compliance roadmap:\n\n\
             {}\n\n\
             The roadmap should include:\n\
             1. Monthly milestones\n\
             2. Resource requirements (staff, budget, tools)\n\
             3. Key performance indicators to track progress\n\
             4. Critical path items that could delay the entire process\n\
             5. Contingency plans for common challenges\n\n\
             Format your response as a structured JSON object.",
            pretty(analysis)
        );
        self.free_form(
            "roadmap",
            "You are an expert compliance project manager.",
            prompt,
            "Could not parse roadmap",
            "Could not generate roadmap",
        )
        .await
    }

    pub async fn estimate_costs(&self, analysis: &ComplianceAnalysis) -> Value {
        let prompt = format!(
            "Based on the following compliance analysis, provide a detailed cost estimate for implementing all recommended actions:\n\n\
             {}\n\n\
             The cost estimate should include:\n\
             1. One-time costs (consulting, software, training)\n\
             2. Annual recurring costs (staff, maintenance, subscriptions)\n\
             3. Potential fines for non-compliance (worst-case scenario)\n\
             4. ROI calculation for compliance investments\n\
             5. Cost-saving opportunities through efficient compliance\n\n\
             Format your response as a structured JSON object.",
            pretty(analysis)
        );
        self.free_form(
            "costs",
            "You are an expert compliance cost estimator.",
            prompt,
            "Could not parse cost estimate",
            "Could not estimate costs",
        )
        .await
    }

    /// How recently discovered updates (grouped by source) affect `profile`.
    pub async fn assess_impact(
        &self,
        profile: &BusinessProfile,
        recent_updates: &BTreeMap<String, Vec<UpdateRecord>>,
    ) -> Value {
        let prompt = format!(
            "Based on the following recent EU regulatory updates, assess the potential impact on a business with the following profile:\n\n\
             Business Profile:\n{}\n\n\
             Recent Regulatory Updates:\n{}\n\n\
             Please provide:\n\
             1. Overall impact assessment (Low, Medium, High)\n\
             2. Specific areas of concern\n\
             3. Recommended actions\n\
             4. Timeline for response\n\n\
             Format your response as a structured JSON object.",
            pretty(profile),
            pretty(recent_updates)
        );
        self.free_form(
            "impact",
            "You are an expert EU regulatory compliance consultant.",
            prompt,
            "Could not parse impact assessment",
            "Could not assess impact of updates",
        )
        .await
    }

    async fn free_form(
        &self,
        kind: &'static str,
        system: &str,
        prompt: String,
        parse_error: &str,
        transport_message: &str,
    ) -> Value {
        match self
            .ask(kind, vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .await
        {
            Ok(raw) => extract_json(&raw)
                .unwrap_or_else(|| json!({ "error": parse_error, "raw_response": raw })),
            Err(e) => json!({ "error": format!("{e:#}"), "message": transport_message }),
        }
    }
}

fn pretty<T: Serialize + ?Sized>(v: &T) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| "{}".to_string())
}

/// Pull a JSON object out of a model reply. Tolerates ```json fences and
/// chatter around the object.
pub fn extract_json(raw: &str) -> Option<Value> {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        s = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(s) {
        return Some(v);
    }
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&s[start..=end]) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}
