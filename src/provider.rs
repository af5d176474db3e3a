//! Completion provider boundary
//!
//! The assembly only ever needs "text prompt in, text completion out". Any
//! failure (transport, timeout, bad status, undecodable body) is a
//! [`ProviderError`]; callers decide whether to fall back or abort.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::space::QUESTION_MARKER;

/// Errors returned by a completion provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The request did not complete in time
    #[error("provider timed out")]
    Timeout,

    /// The provider answered with a non-success status
    #[error("provider returned status {0}")]
    Status(u16),

    /// The request could not be sent or the connection failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider refuses this kind of prompt
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A text-completion collaborator
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`, returning the raw completion text
    fn complete(&self, prompt: &str) -> ProviderResult<String>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "provider"
    }
}

/// Closure-backed provider, mostly for tests
pub struct ScriptedProvider {
    script: Box<dyn Fn(&str) -> ProviderResult<String> + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(&str) -> ProviderResult<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider that fails every prompt with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Number of prompts answered so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CompletionProvider for ScriptedProvider {
    fn complete(&self, prompt: &str) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        (self.script)(prompt)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Words too common to be worth placing in the field
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from",
    "how", "i", "if", "in", "into", "is", "it", "its", "of", "on", "or", "so", "that", "the",
    "their", "there", "these", "this", "to", "was", "we", "what", "when", "where", "which", "who",
    "why", "will", "with", "you",
];

/// Network-free provider
///
/// Answers the word-list prompt with the distinct content words of the
/// question and declines everything else, so ratings fall back to defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

impl OfflineProvider {
    fn words_for(question: &str) -> Vec<String> {
        let mut words: Vec<String> = Vec::new();
        for token in question
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .map(str::to_lowercase)
        {
            if token.len() < 2 || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            if !words.contains(&token) {
                words.push(token);
            }
        }
        words
    }
}

impl CompletionProvider for OfflineProvider {
    fn complete(&self, prompt: &str) -> ProviderResult<String> {
        let question = prompt
            .lines()
            .find_map(|line| line.strip_prefix(QUESTION_MARKER))
            .ok_or_else(|| ProviderError::Unavailable("offline provider".to_string()))?;

        Ok(Self::words_for(question).join(", "))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Settings for [`HttpProvider`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// Chat-completions endpoint
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 30,
            temperature: 0.3,
            max_tokens: 800,
        }
    }
}

/// OpenAI-compatible chat-completions provider
pub struct HttpProvider {
    config: HttpProviderConfig,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: String,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> ProviderResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }
}

impl CompletionProvider for HttpProvider {
    fn complete(&self, prompt: &str) -> ProviderResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self
            .client
            .post(&self.config.url)
            .header("content-type", "application/json");
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.json(&request).send().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: ChatResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Malformed(e.to_string())
            }
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("no choices in response".to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
