//! Context for running inside another tool (an editor plugin, a CI wrapper)
//! and the boundary paragraph appended to every system prompt.

use serde::Serialize;

pub const TOOL_ENV: &str = "CHEF_AI_INTEGRATION_TOOL";
pub const VERSION_ENV: &str = "CHEF_AI_INTEGRATION_VERSION";
pub const DESCRIPTION_ENV: &str = "CHEF_AI_INTEGRATION_DESCRIPTION";
pub const STRICT_BOUNDARY_ENV: &str = "CHEF_AI_INTEGRATION_STRICT_BOUNDARY";

const STANDALONE_BOUNDARY: &str = "You are running as the standalone chef-ai command line assistant. \
Focus on Chef infrastructure code (cookbooks, recipes, resources, InSpec, knife), \
but you may briefly answer closely related DevOps questions when they help the user.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationContext {
    pub tool_name: String,
    pub tool_version: Option<String>,
    pub tool_description: Option<String>,
    /// Refuse anything outside the host tool's domain
    pub strict_boundary: bool,
}

impl IntegrationContext {
    /// Builds a context when a host tool name was supplied
    pub fn from_parts(
        tool_name: Option<String>,
        tool_version: Option<String>,
        tool_description: Option<String>,
        strict_boundary: bool,
    ) -> Option<Self> {
        let tool_name = tool_name.filter(|n| !n.trim().is_empty())?;
        Some(Self {
            tool_name: tool_name.trim().to_string(),
            tool_version: tool_version.filter(|v| !v.trim().is_empty()),
            tool_description: tool_description.filter(|d| !d.trim().is_empty()),
            strict_boundary,
        })
    }

    pub fn display_name(&self) -> String {
        match &self.tool_version {
            Some(version) => format!("{} {}", self.tool_name, version),
            None => self.tool_name.clone(),
        }
    }

    /// Paragraph describing where the assistant runs and what it may answer
    pub fn boundary_text(&self) -> String {
        let mut text = format!(
            "You are running inside {} as its embedded Chef assistant.",
            self.display_name()
        );
        if let Some(description) = &self.tool_description {
            text.push_str(&format!(" The host tool is described as: {}.", description.trim_end_matches('.')));
        }
        if self.strict_boundary {
            text.push_str(&format!(
                " Only answer questions about Chef and about using {} with Chef. \
If a request falls outside that boundary, reply that it is out of scope for this integration and do nothing else.",
                self.tool_name
            ));
        } else {
            text.push_str(
                " Prefer answers that fit the host tool's workflow, and keep unrelated topics brief.",
            );
        }
        text
    }
}

/// Boundary paragraph for an optional integration context
pub fn boundary_text(context: Option<&IntegrationContext>) -> String {
    context
        .map(IntegrationContext::boundary_text)
        .unwrap_or_else(|| STANDALONE_BOUNDARY.to_string())
}
