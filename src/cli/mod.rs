use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

mod generate;
mod migrate;
mod progress;
mod prompt;
mod shell_command;

use chef_ai::client::{AzureOpenAiClient, ChatClient, ChatMessage, ChatOptions};
use chef_ai::contexts::{
    AnalysisRequest, AssistantRunner, AssistantRunnerError, ExecutionResult, MigrationOptions,
};
use chef_ai::credentials::{CredentialSet, DEFAULT_API_VERSION};
use chef_ai::registries::FilePromptRegistry;
use chef_ai::settings::validate_temperature;
use generate::GenerateRequest;
use migrate::MigrateRequest;
use prompt::{Prompter, TerminalPrompter};

pub use chef_ai::settings::Config;

pub(crate) const RED: &str = "\u{001b}[31m";
pub(crate) const GREEN: &str = "\u{001b}[32m";
pub(crate) const YELLOW: &str = "\u{001b}[33m";
pub(crate) const RESET: &str = "\u{001b}[0m";

/// Lines of a log file passed to `troubleshoot`
const LOG_TAIL_LINES: usize = 200;

type Runner<'a> = AssistantRunner<'a, FilePromptRegistry, AzureOpenAiClient>;

#[derive(Serialize)]
struct QuestionInput<'a> {
    question: &'a str,
}

#[derive(Serialize)]
struct DescriptionInput<'a> {
    description: &'a str,
}

#[derive(Serialize, Debug, PartialEq)]
struct ExplainInput {
    kind: &'static str,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
struct TroubleshootInput<'a> {
    problem: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_excerpt: Option<String>,
}

pub fn ask(question: &str, temperature: Option<f32>, config: &Config) -> Result<()> {
    let runner = runner("ask", temperature, config)?;
    let result = run_assistant(&runner, &QuestionInput { question }, config)?;
    print_reply(&result);
    Ok(())
}

pub fn explain(target: &str, temperature: Option<f32>, config: &Config) -> Result<()> {
    let input = explain_input(target)?;
    if config.verbose {
        println!("Explaining {} '{}'", input.kind, input.target);
    }
    let runner = runner("explain", temperature, config)?;
    let result = run_assistant(&runner, &input, config)?;
    print_reply(&result);
    Ok(())
}

pub fn troubleshoot(
    problem: &str,
    log: Option<&Path>,
    temperature: Option<f32>,
    config: &Config,
) -> Result<()> {
    let log_excerpt = match log {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read log file {}", path.display()))?;
            Some(format!(
                "Last lines of {}:\n```\n{}\n```",
                path.display(),
                log_tail(&content, LOG_TAIL_LINES)
            ))
        }
        None => None,
    };

    let runner = runner("troubleshoot", temperature, config)?;
    let result = run_assistant(
        &runner,
        &TroubleshootInput {
            problem,
            log_excerpt,
        },
        config,
    )?;
    print_reply(&result);
    Ok(())
}

pub fn generate(
    description: &str,
    output_dir: &Path,
    assume_yes: bool,
    temperature: Option<f32>,
    config: &Config,
) -> Result<()> {
    let runner = runner("generate", temperature, config)?;
    println!("Generating code for: {}", description);
    let result = run_assistant(&runner, &DescriptionInput { description }, config)?;

    let request = GenerateRequest {
        output_dir,
        assume_yes,
    };
    generate::materialize_reply(
        &result.output,
        result.truncated,
        &request,
        &mut TerminalPrompter,
        config,
    )?;
    Ok(())
}

pub fn command(description: &str, temperature: Option<f32>, config: &Config) -> Result<()> {
    let runner = runner("command", temperature, config)?;
    let result = run_assistant(&runner, &DescriptionInput { description }, config)?;
    print_reply(&result);

    let Some(suggested) = shell_command::extract_command(&result.output) else {
        println!("{}No runnable command found in the reply.{}", YELLOW, RESET);
        return Ok(());
    };

    let mut prompter = TerminalPrompter;
    let command = shell_command::fill_placeholders(&suggested, &mut prompter)?;
    println!("\nCommand:\n  {}\n", command.replace('\n', "\n  "));

    if config.dry_run {
        println!("[DRY RUN] Would execute the command above");
        return Ok(());
    }
    if !prompter.confirm("Run this command?", false)? {
        println!("Cancelled.");
        return Ok(());
    }
    shell_command::execute(&command)
}

#[allow(clippy::too_many_arguments)]
pub fn migrate(
    path: &Path,
    from_version: &str,
    to_version: &str,
    output_dir: Option<&Path>,
    scan_only: bool,
    assume_yes: bool,
    temperature: Option<f32>,
    config: &Config,
) -> Result<()> {
    let options = MigrationOptions::from_settings(from_version, to_version, &config.settings);
    let request = MigrateRequest {
        target: path,
        output_dir,
        scan_only,
        assume_yes,
    };

    // Dry runs list the files without needing credentials.
    if config.dry_run {
        let mut unused = |_: &AnalysisRequest<'_>| -> Result<String, AssistantRunnerError> {
            Ok(String::new())
        };
        migrate::run_migration(options, &request, &mut unused, &mut TerminalPrompter, config)?;
        return Ok(());
    }

    let mut runner = runner("migrate", temperature, config)?;
    let session =
        migrate::run_migration(options, &request, &mut runner, &mut TerminalPrompter, config)?;
    if config.verbose {
        println!("Migration finished in state: {}", session.state().name());
    }
    Ok(())
}

/// Interactive credential setup
pub fn setup(config: &Config) -> Result<()> {
    let path = CredentialSet::default_path()?;
    let existing = CredentialSet::load_file(&path)
        .with_context(|| format!("Failed to load existing credentials from {}", path.display()))?
        .unwrap_or_default();

    println!("Configuring Azure OpenAI credentials ({})", path.display());
    let mut prompter = TerminalPrompter;
    let credentials = collect_credentials(&existing, &mut prompter)?;
    credentials.validate()?;

    if config.dry_run {
        println!("[DRY RUN] Would save credentials to {}", path.display());
    } else {
        credentials.save(&path)?;
        println!("{}✓{} Credentials saved to {}", GREEN, RESET, path.display());
    }

    if wants_test_request(&mut prompter, config)? {
        let client = AzureOpenAiClient::new(&credentials, &config.settings)
            .context("Failed to create the Azure OpenAI client")?;
        let options = ChatOptions {
            max_tokens: 16,
            ..ChatOptions::from_settings(&config.settings)
        };
        client
            .chat(&[ChatMessage::user("Reply with the single word: ready")], &options)
            .context("Test request failed")?;
        println!("{}✓{} Connection works", GREEN, RESET);
    }
    Ok(())
}

/// Dry runs never contact the service
fn wants_test_request(prompter: &mut dyn Prompter, config: &Config) -> Result<bool> {
    if config.dry_run {
        println!("[DRY RUN] Would offer a test request");
        return Ok(false);
    }
    prompter.confirm("Send a test request now?", true)
}

/// Asks for each credential, offering the stored value as default
fn collect_credentials(
    existing: &CredentialSet,
    prompter: &mut dyn Prompter,
) -> Result<CredentialSet> {
    let endpoint = prompter.ask(
        "Azure OpenAI endpoint (https://<resource>.openai.azure.com)",
        Some(&existing.azure_openai_endpoint),
    )?;
    let deployment = prompter.ask(
        "Deployment name",
        Some(&existing.azure_openai_deployment_name),
    )?;
    let stored_version = if existing.azure_openai_api_version.is_empty() {
        DEFAULT_API_VERSION
    } else {
        existing.azure_openai_api_version.as_str()
    };
    let api_version = prompter.ask("API version", Some(stored_version))?;

    let key_label = if existing.azure_openai_api_key.is_empty() {
        "API key".to_string()
    } else {
        format!("API key (Enter keeps {})", existing.masked_key())
    };
    let api_key = prompter.ask_secret(&key_label)?;
    let api_key = if api_key.is_empty() {
        existing.azure_openai_api_key.clone()
    } else {
        api_key
    };

    Ok(CredentialSet {
        azure_openai_api_key: api_key,
        azure_openai_endpoint: endpoint.trim_end_matches('/').to_string(),
        azure_openai_deployment_name: deployment,
        azure_openai_api_version: api_version,
    })
}

fn runner<'a>(command: &str, temperature: Option<f32>, config: &'a Config) -> Result<Runner<'a>> {
    if let Some(t) = temperature {
        validate_temperature(t)?;
    }
    let client = connect(config)?;
    let registry = FilePromptRegistry::new(config.settings.prompts_dir.clone());
    Ok(AssistantRunner::new(command, registry, client, config).with_temperature(temperature))
}

fn connect(config: &Config) -> Result<AzureOpenAiClient> {
    let path = CredentialSet::default_path()?;
    let credentials = CredentialSet::resolve(&path)?;
    if config.verbose {
        println!(
            "Using deployment '{}' at {}",
            credentials.azure_openai_deployment_name, credentials.azure_openai_endpoint
        );
    }
    AzureOpenAiClient::new(&credentials, &config.settings)
        .context("Failed to create the Azure OpenAI client")
}

fn run_assistant<T: Serialize>(
    runner: &Runner<'_>,
    input: &T,
    config: &Config,
) -> Result<ExecutionResult> {
    if config.verbose {
        let prompt = runner.populate(input)?;
        println!("System prompt:\n{}\n", prompt.system_prompt);
        println!("User prompt:\n{}\n", prompt.user_prompt);
    }
    runner
        .run(input)
        .with_context(|| format!("The '{}' request failed", runner.command()))
}

fn print_reply(result: &ExecutionResult) {
    println!("{}", result.output.trim());
    print_truncation_warning(result.truncated);
}

pub(crate) fn print_truncation_warning(truncated: bool) {
    if truncated {
        println!(
            "\n{}Warning: the reply hit the token limit and may be incomplete. \
Raise max_tokens in the settings file if this keeps happening.{}",
            YELLOW, RESET
        );
    }
}

fn explain_input(target: &str) -> Result<ExplainInput> {
    let path = Path::new(target);
    if !path.is_file() {
        return Ok(ExplainInput {
            kind: "concept",
            target: target.to_string(),
            content: None,
        });
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| target.to_string());
    Ok(ExplainInput {
        kind: "file",
        target: name,
        content: Some(format!("```{}\n{}\n```", fence_language(path), content.trim_end())),
    })
}

fn fence_language(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("rb") => "ruby",
        Some("json") => "json",
        Some("yml") | Some("yaml") => "yaml",
        Some("erb") => "erb",
        Some("sh") => "bash",
        Some("ps1") => "powershell",
        Some("toml") => "toml",
        _ => "",
    }
}

fn log_tail(content: &str, lines: usize) -> String {
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
