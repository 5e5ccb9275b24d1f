//! Chat completion client
//!
//! `ChatClient` is the seam the pipeline talks to; `AzureOpenAiClient` is the
//! blocking REST implementation against an Azure OpenAI deployment.

use crate::credentials::CredentialSet;
use crate::settings::Settings;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub enum ClientError {
    Build(String),
    Request(String),
    Api { status: u16, message: String },
    InvalidResponse(String),
    EmptyResponse,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::Build(details) => write!(f, "Failed to create HTTP client: {}", details),
            ClientError::Request(details) => {
                write!(f, "Request to Azure OpenAI failed: {}", details)
            }
            ClientError::Api { status, message } => {
                write!(f, "Azure OpenAI returned {}: {}", status, message)
            }
            ClientError::InvalidResponse(details) => {
                write!(f, "Could not decode Azure OpenAI response: {}", details)
            }
            ClientError::EmptyResponse => write!(f, "Azure OpenAI returned no content"),
        }
    }
}

impl std::error::Error for ClientError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// The assistant's reply to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    /// The model stopped because it ran out of tokens
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Sends one chat completion request and waits for the full reply
pub trait ChatClient {
    fn chat(&self, messages: &[ChatMessage], options: &ChatOptions)
    -> Result<ChatResponse, ClientError>;
}

impl<C: ChatClient + ?Sized> ChatClient for &C {
    fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ClientError> {
        (**self).chat(messages, options)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    code: Option<serde_json::Value>,
}

/// Blocking client for an Azure OpenAI chat deployment
pub struct AzureOpenAiClient {
    http: HttpClient,
    url: String,
    api_key: String,
}

impl AzureOpenAiClient {
    pub fn new(credentials: &CredentialSet, settings: &Settings) -> Result<Self, ClientError> {
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(
                settings.connect_timeout_secs + settings.read_timeout_secs,
            ))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            http,
            url: completions_url(credentials),
            api_key: credentials.azure_openai_api_key.clone(),
        })
    }
}

impl ChatClient for AzureOpenAiClient {
    fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ClientError> {
        let body = ChatCompletionRequest {
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        debug!("POST {} ({} messages)", self.url, messages.len());
        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }
        parse_completion(status.as_u16(), &text)
    }
}

/// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`
pub fn completions_url(credentials: &CredentialSet) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        credentials.azure_openai_endpoint.trim().trim_end_matches('/'),
        credentials.azure_openai_deployment_name.trim(),
        credentials.azure_openai_api_version.trim()
    )
}

fn api_error(status: u16, body: &str) -> ClientError {
    let message = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.describe(),
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body.trim().to_string(),
    };
    ClientError::Api { status, message }
}

impl ApiError {
    fn describe(self) -> String {
        match self.code {
            Some(serde_json::Value::String(code)) => format!("{} ({})", self.message, code),
            Some(code) if !code.is_null() => format!("{} ({})", self.message, code),
            _ => self.message,
        }
    }
}

fn parse_completion(status: u16, body: &str) -> Result<ChatResponse, ClientError> {
    // Some gateways report failures with a success status.
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return Err(ClientError::Api {
            status,
            message: envelope.error.describe(),
        });
    }

    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

    let usage = parsed.usage;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(ClientError::EmptyResponse)?;
    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(ClientError::EmptyResponse);
    }

    if let Some(usage) = &usage {
        debug!(
            "tokens: prompt={} completion={} total={}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    Ok(ChatResponse {
        content,
        finish_reason: choice.finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        let credentials = CredentialSet {
            azure_openai_api_key: "k".to_string(),
            azure_openai_endpoint: "https://chef.openai.azure.com/".to_string(),
            azure_openai_deployment_name: "gpt-4o".to_string(),
            azure_openai_api_version: "2024-02-01".to_string(),
        };
        assert_eq!(
            completions_url(&credentials),
            "https://chef.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Use node.normal"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        }"#;
        let response = parse_completion(200, body).unwrap();
        assert_eq!(response.content, "Use node.normal");
        assert!(!response.is_truncated());
        assert_eq!(response.usage.unwrap().total_tokens, 14);
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        assert!(matches!(
            parse_completion(200, r#"{"choices": []}"#),
            Err(ClientError::EmptyResponse)
        ));
        assert!(matches!(
            parse_completion(200, r#"{"choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]}"#),
            Err(ClientError::EmptyResponse)
        ));
    }

    #[test]
    fn test_api_error_message() {
        let err = api_error(
            401,
            r#"{"error": {"code": "401", "message": "Access denied due to invalid subscription key."}}"#,
        );
        assert_eq!(
            err.to_string(),
            "Azure OpenAI returned 401: Access denied due to invalid subscription key. (401)"
        );

        let err = api_error(502, "Bad Gateway");
        assert_eq!(err.to_string(), "Azure OpenAI returned 502: Bad Gateway");
    }

    #[test]
    fn test_error_body_with_success_status() {
        let body = r#"{"error": {"message": "The response was filtered", "code": "content_filter"}}"#;
        match parse_completion(200, body) {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 200);
                assert_eq!(message, "The response was filtered (content_filter)");
            }
            other => panic!("expected an API error, got {:?}", other.map(|r| r.content)),
        }
    }
}
