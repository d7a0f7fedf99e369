//! Gateway tool naming: `{target}___{tool}`.

pub const TARGET_DELIMITER: &str = "___";

/// A gateway tool name split into its target and tool parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolName {
    target: Option<String>,
    tool: String,
}

impl ToolName {
    /// Split on the first delimiter. Names without one have no target.
    #[must_use]
    pub fn parse(full: &str) -> Self {
        match full.split_once(TARGET_DELIMITER) {
            Some((target, tool)) => Self {
                target: Some(target.to_string()),
                tool: tool.to_string(),
            },
            None => Self {
                target: None,
                tool: full.to_string(),
            },
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }
}
