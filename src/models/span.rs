//! Classified content spans produced by the content classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic category assigned to a span of model output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ContentCategory {
    /// Ordinary prose outside any structural tag.
    Plain,
    /// Reasoning text inside a thinking section.
    Thinking,
    /// Body of a tool invocation.
    ToolCall,
    /// Result, error, or output of a nested operation, markers included.
    ToolResult,
    /// Parameter wrapper (path, args, content...), markers included.
    SystemParam,
}

impl ContentCategory {
    /// Stable wire name, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Thinking => "thinking",
            Self::ToolCall => "toolCall",
            Self::ToolResult => "toolResult",
            Self::SystemParam => "systemParam",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous unit of text with a single assigned category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedSpan {
    /// Span text; tag markers are stripped or kept depending on the category.
    pub text: String,
    /// Assigned category.
    pub category: ContentCategory,
    /// Innermost open tool-invocation tag, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// `false` when the span was drained before its section closed.
    pub is_complete: bool,
}

impl ClassifiedSpan {
    /// Build a span terminated by a tag boundary.
    #[must_use]
    pub fn complete(
        text: impl Into<String>,
        category: ContentCategory,
        tool_name: Option<String>,
    ) -> Self {
        Self {
            text: text.into(),
            category,
            tool_name,
            is_complete: true,
        }
    }
}
