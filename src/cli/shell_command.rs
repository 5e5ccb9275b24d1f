//! Picks the suggested command out of a reply, fills its placeholders and
//! runs it.

use super::prompt::Prompter;
use anyhow::{Context, Result};
use regex::Regex;
use std::process::Command;
use std::sync::OnceLock;

const SHELL_TAGS: &[&str] = &["bash", "sh", "shell", "console", "zsh", "powershell", "ps1", "cmd"];
const TOOL_PREFIXES: &[&str] = &["knife ", "chef ", "chef-client", "chef-run ", "kitchen ", "inspec ", "cookstyle"];

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("valid regex"))
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([A-Z][A-Z0-9_]*)>").expect("valid regex"))
}

/// The command suggested in a reply
///
/// Prefers a shell-tagged fenced block, then any fenced block, then the
/// first line that starts with a Chef tool name.
pub fn extract_command(reply: &str) -> Option<String> {
    let blocks: Vec<(String, String)> = fenced_block_re()
        .captures_iter(reply)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();

    let block = blocks
        .iter()
        .find(|(lang, _)| SHELL_TAGS.contains(&lang.as_str()))
        .or_else(|| blocks.first())
        .map(|(_, body)| body.as_str());

    if let Some(body) = block {
        let command = body
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.trim_start_matches("$ ").to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if !command.is_empty() {
            return Some(command);
        }
    }

    reply
        .lines()
        .map(|l| l.trim().trim_start_matches("$ ").trim_matches('`'))
        .find(|l| TOOL_PREFIXES.iter().any(|p| l.starts_with(p)))
        .map(|l| l.to_string())
}

/// Distinct `<PLACEHOLDER>` names in order of appearance
pub fn placeholders(command: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in placeholder_re().captures_iter(command) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Asks for every placeholder value and substitutes it
pub fn fill_placeholders(command: &str, prompter: &mut dyn Prompter) -> Result<String> {
    let mut filled = command.to_string();
    for name in placeholders(command) {
        let label = format!("Value for <{}>", name);
        let value = prompter.ask(&label, None)?;
        if value.is_empty() {
            anyhow::bail!("No value given for <{}>", name);
        }
        filled = filled.replace(&format!("<{}>", name), &value);
    }
    Ok(filled)
}

/// Runs a command line through the platform shell, inheriting stdio
pub fn execute(command: &str) -> Result<()> {
    let mut shell = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C");
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c");
        c
    };

    let status = shell
        .arg(command)
        .status()
        .with_context(|| format!("Failed to execute: {}", command))?;

    if status.success() {
        println!("✓ Command finished successfully");
        Ok(())
    } else {
        anyhow::bail!("Command exited with {}", status);
    }
}
