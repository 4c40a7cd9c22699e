//! AI adapter: provider abstraction for short-title/note generation.
//!
//! Every client makes exactly one attempt per record. Retrying, timeouts and
//! fallback to the original headline are handled by the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::config::ai::AiConfig;
use crate::error::EnrichmentError;
use crate::ingest::types::CandidateRecord;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Max chars kept for a generated short title.
pub const SHORT_TITLE_MAX_CHARS: usize = 40;
/// Max chars kept for a generated note.
pub const NOTE_MAX_CHARS: usize = 160;

/// What a provider returns for one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiEnrichment {
    pub short_title: String,
    pub note: String,
}

pub type EnrichFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AiEnrichment, EnrichmentError>> + Send + 'a>>;

/// Trait object used by the enricher (and swapped for stubs in tests).
pub trait AiClient: Send + Sync {
    /// One enrichment attempt for `record`.
    fn enrich<'a>(&'a self, record: &'a CandidateRecord) -> EnrichFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config.
///
/// * `mock == true` (env `AI_TEST_MODE=mock`) returns a deterministic mock client.
/// * Else if `enabled == false`, returns a disabled client.
/// * Else builds the real provider; a missing credential is an error.
pub fn build_client_from_config(config: &AiConfig) -> anyhow::Result<DynAiClient> {
    if config.mock {
        return Ok(Arc::new(MockClient));
    }
    if !config.enabled {
        return Ok(Arc::new(DisabledClient));
    }
    match config.provider.as_str() {
        "openai" => {
            let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
                bail!("OPENAI_API_KEY is missing; set it or disable enrichment");
            };
            let client = OpenAiClient::new(
                key,
                &config.model,
                &config.base_url,
                Duration::from_secs(config.call_timeout_secs),
            )?;
            Ok(Arc::new(client))
        }
        other => bail!("unsupported enrichment provider: {other}"),
    }
}

// ------------------------------------------------------------
// Concrete clients
// ------------------------------------------------------------

/// OpenAI Chat Completions client. Asks for a JSON object reply.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fuchupo-news/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .context("building OpenAI http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    async fn call(&self, record: &CandidateRecord) -> Result<AiEnrichment, EnrichmentError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            r#type: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: ResponseFormat,
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

        let sys = "You write compact labels for a local news feed. \
Reply with a JSON object {\"shortTitle\": string, \"note\": string}. \
shortTitle: the headline shortened to at most 20 characters, same language as the headline. \
note: one neutral sentence (at most 80 characters) saying why the story matters to local residents. \
No emojis, no markdown.";
        let user = user_prompt(record);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            max_tokens: 200,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| EnrichmentError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EnrichmentError::Status(resp.status().as_u16()));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| EnrichmentError::MalformedReply(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EnrichmentError::MalformedReply("no choices".into()))?;
        parse_reply(&content)
    }
}

impl AiClient for OpenAiClient {
    fn enrich<'a>(&'a self, record: &'a CandidateRecord) -> EnrichFuture<'a> {
        Box::pin(self.call(record))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn user_prompt(record: &CandidateRecord) -> String {
    let mut s = format!("Headline: {}", record.display_title);
    if let Some(p) = &record.source_publisher {
        s.push_str(&format!("\nPublisher: {p}"));
    }
    if let Some(d) = &record.description {
        let short: String = d.chars().take(500).collect();
        s.push_str(&format!("\nSummary: {short}"));
    }
    s
}

/// Always fails with [`EnrichmentError::Disabled`]; every record keeps its headline.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn enrich<'a>(&'a self, _record: &'a CandidateRecord) -> EnrichFuture<'a> {
        Box::pin(async { Err(EnrichmentError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic offline client for local runs (`AI_TEST_MODE=mock`).
pub struct MockClient;

impl AiClient for MockClient {
    fn enrich<'a>(&'a self, record: &'a CandidateRecord) -> EnrichFuture<'a> {
        let out = AiEnrichment {
            short_title: sanitize_line(&record.display_title, SHORT_TITLE_MAX_CHARS),
            note: "Note unavailable (mock)".to_string(),
        };
        Box::pin(async move { Ok(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Reply parsing + sanitization
// ------------------------------------------------------------

#[derive(Deserialize)]
struct Reply {
    #[serde(rename = "shortTitle", alias = "short_title", default)]
    short_title: Option<String>,
    #[serde(alias = "aiNote", alias = "comment", default)]
    note: Option<String>,
}

/// Parse the provider's structured reply. Code fences around the JSON are
/// tolerated; both fields must be present and non-empty after cleanup.
pub fn parse_reply(content: &str) -> Result<AiEnrichment, EnrichmentError> {
    let body = strip_code_fence(content);
    let reply: Reply =
        serde_json::from_str(body).map_err(|e| EnrichmentError::MalformedReply(e.to_string()))?;

    let short_title = sanitize_line(
        reply.short_title.as_deref().unwrap_or_default(),
        SHORT_TITLE_MAX_CHARS,
    );
    if short_title.is_empty() {
        return Err(EnrichmentError::EmptyField("shortTitle"));
    }
    let note = sanitize_line(reply.note.as_deref().unwrap_or_default(), NOTE_MAX_CHARS);
    if note.is_empty() {
        return Err(EnrichmentError::EmptyField("note"));
    }
    Ok(AiEnrichment { short_title, note })
}

fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // drop an optional language tag on the opening fence line
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Single line, no control chars, collapsed whitespace, at most `max_chars` chars.
pub fn sanitize_line(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars * 4));
    let mut count = 0usize;
    let mut prev_space = false;
    for ch in input.chars() {
        let c = if ch.is_whitespace() || ch.is_control() {
            ' '
        } else {
            ch
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            count += 1;
            prev_space = false;
        }
        if count >= max_chars {
            break;
        }
    }
    out.trim().to_string()
}
