//! Structural tag vocabulary.

use std::collections::HashSet;

/// Role a known tag name plays in classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRole {
    /// Reasoning wrapper; overrides every other context.
    Thinking,
    /// Tool invocation; markers stripped.
    Tool,
    /// Parameter wrapper; markers kept verbatim.
    SystemParam,
    /// Operation result; markers kept verbatim except under the completion tool.
    Result,
}

const DEFAULT_TOOLS: &[&str] = &[
    "read_file",
    "write_to_file",
    "replace_in_file",
    "search_files",
    "list_files",
    "list_code_definition_names",
    "execute_command",
    "browser_action",
    "use_mcp_tool",
    "access_mcp_resource",
    "ask_followup_question",
    "attempt_completion",
    "new_task",
    "plan_mode_respond",
];

const DEFAULT_PARAMS: &[&str] = &[
    "args",
    "path",
    "content",
    "line_count",
    "file",
    "files",
    "diff",
    "command",
    "regex",
    "recursive",
];

const DEFAULT_RESULTS: &[&str] = &["result", "error", "output", "response"];

/// The set of tag names treated as structural markup.
///
/// Names outside the vocabulary are never structural: their markers pass
/// through as literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVocabulary {
    thinking: String,
    completion_tool: String,
    tools: HashSet<String>,
    params: HashSet<String>,
    results: HashSet<String>,
}

impl Default for TagVocabulary {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| (*n).to_owned()).collect();
        Self {
            thinking: "thinking".into(),
            completion_tool: "attempt_completion".into(),
            tools: owned(DEFAULT_TOOLS),
            params: owned(DEFAULT_PARAMS),
            results: owned(DEFAULT_RESULTS),
        }
    }
}

impl TagVocabulary {
    /// Register an additional tool-invocation tag.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tools.insert(name.into());
        self
    }

    /// Register an additional parameter-wrapper tag.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>) -> Self {
        self.params.insert(name.into());
        self
    }

    /// Register an additional result tag.
    #[must_use]
    pub fn with_result(mut self, name: impl Into<String>) -> Self {
        self.results.insert(name.into());
        self
    }

    /// Name of the thinking tag.
    #[must_use]
    pub fn thinking_tag(&self) -> &str {
        &self.thinking
    }

    /// Name of the task-completion tool, whose direct result child is
    /// reclassified as tool content.
    #[must_use]
    pub fn completion_tool(&self) -> &str {
        &self.completion_tool
    }

    /// Role of `name`, or `None` for unknown tags.
    ///
    /// A name registered under several roles resolves as thinking, then
    /// tool, then result, then parameter.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<TagRole> {
        if name == self.thinking {
            Some(TagRole::Thinking)
        } else if self.tools.contains(name) {
            Some(TagRole::Tool)
        } else if self.results.contains(name) {
            Some(TagRole::Result)
        } else if self.params.contains(name) {
            Some(TagRole::SystemParam)
        } else {
            None
        }
    }
}
