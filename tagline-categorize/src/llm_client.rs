//! Completion capability used by the LLM categorizer.
//!
//! The categorizer only needs "prompt in, text out". [`CompletionProvider`] is
//! that seam; [`HttpCompletionClient`] implements it against the Anthropic
//! Messages API or OpenAI Chat Completions.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use crate::error::LlmError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Anything that can turn a prompt into completion text.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

impl<P: CompletionProvider + ?Sized> CompletionProvider for std::sync::Arc<P> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        (**self).complete(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Provider {
    #[default]
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAI => "https://api.openai.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::OpenAI => "gpt-4o-mini",
        }
    }

    /// Environment variable holding the API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAI),
            other => Err(format!("unknown LLM provider '{other}'")),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct LlmCredential {
    pub provider: Provider,
    pub api_key: String,
}

impl LlmCredential {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
        }
    }

    /// Read the key from the provider's environment variable; blank counts as unset.
    pub fn from_env(provider: Provider) -> Option<Self> {
        std::env::var(provider.env_var())
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| Self::new(provider, k))
    }
}

// Keep keys out of logs.
impl fmt::Debug for LlmCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmCredential")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Blocking HTTP client for either provider.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    credential: LlmCredential,
    model: String,
    base_url: String,
}

impl HttpCompletionClient {
    pub fn new(credential: LlmCredential, model: Option<String>, base_url: Option<String>) -> Self {
        let provider = credential.provider;
        Self {
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            base_url: base_url
                .unwrap_or_else(|| provider.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            credential,
        }
    }

    pub fn provider(&self) -> Provider {
        self.credential.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_async(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let text = match self.credential.provider {
            Provider::Anthropic => self.anthropic_complete(request).await?,
            Provider::OpenAI => self.openai_complete(request).await?,
        };
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    async fn anthropic_complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![Msg {
                role: "user",
                content: &request.prompt,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.credential.api_key)
                .map_err(|e| LlmError::Transport(format!("invalid api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: "anthropic",
                status: status.as_u16(),
                body: txt,
            });
        }

        let out: Resp = resp.json().await?;
        let mut s = String::new();
        for b in out.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        Ok(s.trim().to_string())
    }

    async fn openai_complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.credential.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: "openai",
                status: status.as_u16(),
                body: txt,
            });
        }

        let out: Resp = resp.json().await?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

impl HttpCompletionClient {
    fn complete_on_new_runtime(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let rt = Runtime::new()?;
        rt.block_on(self.complete_async(request))
    }
}

impl CompletionProvider for HttpCompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        // Calling block_on from inside a running runtime panics. A multi-thread
        // runtime can lend this worker via block_in_place; a current-thread one
        // cannot, so the call gets its own thread and runtime.
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.complete_async(request)))
            }
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| self.complete_on_new_runtime(request))
                    .join()
                    .unwrap_or_else(|_| Err(LlmError::Transport("completion thread panicked".into())))
            }),
            Err(_) => self.complete_on_new_runtime(request),
        }
    }
}
