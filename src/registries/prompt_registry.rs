use crate::contexts::{PopulateError, PromptRegistry, PromptTemplate};
use std::fs;
use std::path::PathBuf;

/// Templates compiled into the binary, keyed by command name
const EMBEDDED_PROMPTS: &[(&str, &str)] = &[
    ("ask", include_str!("../../prompts/ask.yml")),
    ("explain", include_str!("../../prompts/explain.yml")),
    ("generate", include_str!("../../prompts/generate.yml")),
    ("command", include_str!("../../prompts/command.yml")),
    ("troubleshoot", include_str!("../../prompts/troubleshoot.yml")),
    ("migrate", include_str!("../../prompts/migrate.yml")),
];

/// File-based implementation of PromptRegistry
///
/// Looks for `<command>.yml` in the override directory first and falls back
/// to the embedded templates.
#[derive(Debug, Clone, Default)]
pub struct FilePromptRegistry {
    prompts_dir: Option<PathBuf>,
}

impl FilePromptRegistry {
    /// Creates a new FilePromptRegistry
    ///
    /// # Arguments
    /// * `prompts_dir` - Optional directory whose templates replace the embedded ones
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self { prompts_dir }
    }

    /// Names of all commands with an embedded template
    pub fn commands() -> impl Iterator<Item = &'static str> {
        EMBEDDED_PROMPTS.iter().map(|(name, _)| *name)
    }
}

impl PromptRegistry for FilePromptRegistry {
    fn get_template(&self, command: &str) -> Result<PromptTemplate, PopulateError> {
        if let Some(dir) = &self.prompts_dir {
            let prompt_path = dir.join(format!("{}.yml", command));
            if prompt_path.exists() {
                let content = fs::read_to_string(&prompt_path).map_err(|e| {
                    PopulateError::InvalidTemplate(format!(
                        "Failed to read prompt template {}: {}",
                        prompt_path.display(),
                        e
                    ))
                })?;
                return extract_prompt_template(&content);
            }
        }

        let (_, content) = EMBEDDED_PROMPTS
            .iter()
            .find(|(name, _)| *name == command)
            .ok_or_else(|| PopulateError::PromptNotFound(command.to_string()))?;
        extract_prompt_template(content)
    }
}

/// Extracts the system_prompt and user_prompt fields from a YAML template
fn extract_prompt_template(yaml_content: &str) -> Result<PromptTemplate, PopulateError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PopulateError::InvalidTemplate(format!("Invalid YAML: {}", e)))?;

    if docs.is_empty() {
        return Err(PopulateError::InvalidTemplate(
            "Empty YAML document".to_string(),
        ));
    }

    let doc = &docs[0];

    let Some(system_prompt) = doc["system_prompt"].as_str() else {
        return Err(PopulateError::InvalidTemplate(
            "No system_prompt field found in prompt template".to_string(),
        ));
    };
    // Without a user_prompt the request is passed through unchanged.
    let user_prompt = doc["user_prompt"].as_str().unwrap_or("{{input.request}}");

    Ok(PromptTemplate {
        system_prompt: system_prompt.to_string(),
        user_prompt: user_prompt.to_string(),
    })
}
