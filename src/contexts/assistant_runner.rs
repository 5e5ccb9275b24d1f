use crate::client::{ChatClient, ChatMessage, ChatOptions, ClientError};
use crate::integration::boundary_text;
use crate::settings::Config;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Errors that can occur while populating a prompt template
#[derive(Debug)]
pub enum PopulateError {
    MissingMandatoryPlaceholder(String),
    InvalidPlaceholderPath(String),
    PromptNotFound(String),
    InvalidTemplate(String),
}

impl fmt::Display for PopulateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PopulateError::MissingMandatoryPlaceholder(ph) => {
                write!(f, "Required placeholder '{}' could not be resolved", ph)
            }
            PopulateError::InvalidPlaceholderPath(path) => {
                write!(f, "Invalid path '{}' in placeholder", path)
            }
            PopulateError::PromptNotFound(name) => {
                write!(f, "Prompt template for '{}' not found", name)
            }
            PopulateError::InvalidTemplate(details) => {
                write!(f, "Prompt template is invalid: {}", details)
            }
        }
    }
}

impl std::error::Error for PopulateError {}

/// Errors that can occur while talking to the model
#[derive(Debug)]
pub enum ExecutionError {
    Client(ClientError),
    EmptyReply(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionError::Client(e) => write!(f, "{}", e),
            ExecutionError::EmptyReply(command) => {
                write!(f, "The assistant returned an empty reply for '{}'", command)
            }
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::Client(e) => Some(e),
            ExecutionError::EmptyReply(_) => None,
        }
    }
}

impl From<ClientError> for ExecutionError {
    fn from(e: ClientError) -> Self {
        ExecutionError::Client(e)
    }
}

/// Errors that can occur in the assistant runner
#[derive(Debug)]
pub enum AssistantRunnerError {
    Populate(PopulateError),
    Execution(ExecutionError),
}

impl fmt::Display for AssistantRunnerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssistantRunnerError::Populate(e) => write!(f, "{}", e),
            AssistantRunnerError::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AssistantRunnerError {}

impl From<PopulateError> for AssistantRunnerError {
    fn from(e: PopulateError) -> Self {
        AssistantRunnerError::Populate(e)
    }
}

impl From<ExecutionError> for AssistantRunnerError {
    fn from(e: ExecutionError) -> Self {
        AssistantRunnerError::Execution(e)
    }
}

/// Unpopulated system and user prompt for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// A populated prompt ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulatedPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// The result of one assistant call
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    /// The reply was cut off by the token limit
    pub truncated: bool,
}

/// Trait for loading prompt templates by command name
pub trait PromptRegistry {
    /// Load the prompt template for a command
    fn get_template(&self, command: &str) -> Result<PromptTemplate, PopulateError>;
}

/// Assistant Runner context: populates a command's prompt and makes one
/// chat call with it
pub struct AssistantRunner<'a, R, C>
where
    R: PromptRegistry,
    C: ChatClient,
{
    /// The command whose prompt is used
    command: String,
    /// Registry for loading prompt templates
    prompt_registry: R,
    client: C,
    config: &'a Config,
    options: ChatOptions,
}

impl<'a, R, C> AssistantRunner<'a, R, C>
where
    R: PromptRegistry,
    C: ChatClient,
{
    /// Creates a new AssistantRunner context
    ///
    /// # Arguments
    /// * `command` - The command name, used to look up the prompt template
    /// * `prompt_registry` - Registry for loading prompt templates
    /// * `client` - Chat completion client
    /// * `config` - Settings and integration context
    pub fn new(command: &str, prompt_registry: R, client: C, config: &'a Config) -> Self {
        Self {
            command: command.to_string(),
            prompt_registry,
            client,
            config,
            options: ChatOptions::from_settings(&config.settings),
        }
    }

    /// Overrides the sampling temperature from the settings
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        if let Some(t) = temperature {
            self.options.temperature = t;
        }
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Role method: prompt.populate
    ///
    /// Fills the command's templates from `input` and appends the
    /// integration boundary to the system prompt.
    pub fn populate<T: Serialize>(&self, input: &T) -> Result<PopulatedPrompt, PopulateError> {
        let template = self.prompt_registry.get_template(&self.command)?;
        let input_json = serde_json::to_value(input)
            .map_err(|e| PopulateError::InvalidTemplate(e.to_string()))?;

        let system_prompt = replace_placeholders(&template.system_prompt, &input_json)?;
        let user_prompt = replace_placeholders(&template.user_prompt, &input_json)?;

        Ok(PopulatedPrompt {
            system_prompt: format!(
                "{}\n\n{}",
                system_prompt.trim_end(),
                boundary_text(self.config.integration.as_ref())
            ),
            user_prompt: user_prompt.trim_end().to_string(),
        })
    }

    /// Role method: prompt.execute
    fn execute(&self, prompt: &PopulatedPrompt) -> Result<ExecutionResult, ExecutionError> {
        let messages = [
            ChatMessage::system(prompt.system_prompt.as_str()),
            ChatMessage::user(prompt.user_prompt.as_str()),
        ];

        debug!(
            "running '{}' (temperature {}, max_tokens {})",
            self.command, self.options.temperature, self.options.max_tokens
        );
        let response = self.client.chat(&messages, &self.options)?;

        if response.content.trim().is_empty() {
            return Err(ExecutionError::EmptyReply(self.command.clone()));
        }
        let truncated = response.is_truncated();
        if truncated {
            warn!("reply for '{}' was cut off at the token limit", self.command);
        }

        Ok(ExecutionResult {
            output: response.content,
            truncated,
        })
    }

    /// Public function: run
    ///
    /// Populates the prompt from `input` and returns the assistant's reply.
    pub fn run<T: Serialize>(&self, input: &T) -> Result<ExecutionResult, AssistantRunnerError> {
        let prompt = self.populate(input)?;
        Ok(self.execute(&prompt)?)
    }
}

/// Replace placeholders in a template
///
/// Supports:
/// - Mandatory: {{input.prop_name}}
/// - Optional: {{input.prop_name?}}
/// - Nested: {{input.prop1.prop2}}
pub fn replace_placeholders(
    template: &str,
    input: &serde_json::Value,
) -> Result<String, PopulateError> {
    let mut result = template.to_string();
    let mut offset = 0;

    while let Some(start) = result[offset..].find("{{") {
        let start = offset + start;
        let Some(end_pos) = result[start..].find("}}") else {
            break;
        };
        let end = start + end_pos;

        let placeholder = result[start + 2..end].trim();
        let (path, is_optional) = match placeholder.strip_suffix('?') {
            Some(path) => (path, true),
            None => (placeholder, false),
        };

        match resolve_path(input, path)? {
            Some(v) => {
                let replacement = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Null => String::new(),
                    _ => serde_json::to_string(v)
                        .map_err(|e| PopulateError::InvalidTemplate(e.to_string()))?,
                };

                result.replace_range(start..end + 2, &replacement);
                offset = start + replacement.len();
            }
            None if is_optional => {
                result.replace_range(start..end + 2, "");
                offset = start;
            }
            None => {
                return Err(PopulateError::MissingMandatoryPlaceholder(path.to_string()));
            }
        }
    }

    Ok(result)
}

/// Resolve a dotted path such as "input.prop1.prop2" in a JSON value
fn resolve_path<'v>(
    value: &'v serde_json::Value,
    path: &str,
) -> Result<Option<&'v serde_json::Value>, PopulateError> {
    let mut parts = path.split('.');

    if parts.next() != Some("input") {
        return Err(PopulateError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}
