//! AI code suggestions
//!
//! [`GroqClient`] talks to any OpenAI-compatible chat-completions API. It is
//! constructed explicitly from [`SuggestConfig`] and handed to the router as
//! an `Arc<dyn SuggestionService>`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::SuggestConfig;

/// A single proposed change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub explanation: String,
}

/// Analysis of a snippet plus proposed changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    pub analysis: String,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("API key variable {0} is not set")]
    MissingApiKey(String),

    #[error("request to suggestion API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("suggestion API returned {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("suggestion API returned no choices")]
    EmptyResponse,
}

/// Source of code suggestions
#[async_trait]
pub trait SuggestionService: Send + Sync {
    async fn suggest(
        &self,
        code: &str,
        language: &str,
        execution_result: Option<&str>,
    ) -> Result<Suggestions, SuggestError>;
}

/// Client for an OpenAI-compatible chat-completions endpoint (Groq by default)
#[derive(Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroqClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GroqClient {
    pub fn new(config: &SuggestConfig, api_key: impl Into<String>) -> Result<Self, SuggestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Build a client with the key read from `config.api_key_env`
    ///
    /// # Errors
    ///
    /// Returns [`SuggestError::MissingApiKey`] when the variable is unset or
    /// empty.
    pub fn from_env(config: &SuggestConfig) -> Result<Self, SuggestError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SuggestError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SuggestionService for GroqClient {
    #[instrument(skip(self, code, execution_result), fields(model = %self.model))]
    async fn suggest(
        &self,
        code: &str,
        language: &str,
        execution_result: Option<&str>,
    ) -> Result<Suggestions, SuggestError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt(language),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(code, language, execution_result),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "suggestion API returned an error");
            return Err(SuggestError::Upstream { status, body });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(SuggestError::EmptyResponse)?;
        debug!(len = content.len(), "received suggestions");

        Ok(parse_suggestions(&content, code))
    }
}

fn system_prompt(language: &str) -> String {
    format!(
        "You are an expert code assistant that analyzes {language} code and provides suggestions for improvements. \
         Analyze the code and execution result provided by the user. \
         If there are errors, provide solutions. If no errors, suggest optimizations, best practices, or improvements. \
         Format your response as JSON with the fields 'analysis' (string), and 'suggestions' \
         (array of objects with 'title', 'code', and 'explanation' fields)."
    )
}

fn user_prompt(code: &str, language: &str, execution_result: Option<&str>) -> String {
    let execution_result = execution_result
        .filter(|r| !r.is_empty())
        .unwrap_or("No execution result provided");
    format!(
        "Language: {language}\n\nCode:\n{code}\n\nExecution Result:\n{execution_result}\n\n\
         Please analyze this code and provide suggestions for improvements, bug fixes, or optimizations. \
         Return your response in JSON format as described."
    )
}

#[derive(Deserialize)]
struct RawSuggestions {
    #[serde(default)]
    analysis: Option<String>,

    #[serde(default)]
    suggestions: Option<Vec<Suggestion>>,
}

/// Parse a model reply, falling back to a generic suggestion on bad JSON
pub fn parse_suggestions(content: &str, code: &str) -> Suggestions {
    match serde_json::from_str::<RawSuggestions>(extract_json(content)) {
        Ok(raw) => Suggestions {
            analysis: raw
                .analysis
                .unwrap_or_else(|| "No analysis provided".to_owned()),
            suggestions: raw.suggestions.unwrap_or_default(),
        },
        Err(e) => {
            warn!(error = %e, "failed to parse suggestion reply as JSON");
            Suggestions {
                analysis: "Could not parse AI analysis".to_owned(),
                suggestions: vec![Suggestion {
                    title: "General improvement".to_owned(),
                    code: code.to_owned(),
                    explanation:
                        "Consider reviewing your code for best practices and optimizations."
                            .to_owned(),
                }],
            }
        }
    }
}

/// Body of the first ```json fence, else of the first bare fence, else the
/// whole reply
fn extract_json(content: &str) -> &str {
    let fenced = |marker: &str| {
        content
            .split_once(marker)
            .map(|(_, rest)| rest.split_once("```").map_or(rest, |(body, _)| body))
    };
    fenced("```json")
        .or_else(|| fenced("```"))
        .unwrap_or(content)
        .trim()
}
