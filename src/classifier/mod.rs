//! Incremental content classifier for tag-annotated model output.
//!
//! [`ContentClassifier`] consumes model output in arbitrary chunks and
//! emits [`ClassifiedSpan`]s as tag boundaries are crossed. A tag split
//! across two chunks is held in the pending buffer until its closing `>`
//! arrives, and text is only released at a tag boundary (or by
//! [`flush`](ContentClassifier::flush)), so the emitted sequence does not
//! depend on how the input was chunked.
//!
//! Classification is driven by a stack of open structural tags:
//!
//! - thinking text is always [`ContentCategory::Thinking`], markers stripped;
//!   inside a thinking section no other tag is structural;
//! - tool-invocation bodies are [`ContentCategory::ToolCall`], markers
//!   stripped, with the tool name attached;
//! - parameter wrappers are [`ContentCategory::SystemParam`] and results are
//!   [`ContentCategory::ToolResult`], both with markers kept verbatim;
//! - a result directly inside the completion tool is the agent's final
//!   answer and is reported as tool content of that tool, markers stripped;
//! - unknown tags are literal text in the surrounding category.

mod tag;
mod vocabulary;

pub use vocabulary::{TagRole, TagVocabulary};

use crate::models::span::{ClassifiedSpan, ContentCategory};
use tag::{Scan, Tag, TagKind};

/// An open structural tag and the classification its body receives.
#[derive(Debug, Clone)]
struct Frame {
    name: String,
    role: TagRole,
    category: ContentCategory,
    tool_name: Option<String>,
    /// Markers are part of the emitted text.
    verbatim: bool,
}

/// Stateful chunk-wise classifier. One instance per generation stream.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    vocabulary: TagVocabulary,
    /// Unresolved tail: text since the last tag boundary, possibly ending
    /// in a partial tag.
    pending: String,
    /// Offset into `pending` where scanning resumes.
    scan_offset: usize,
    stack: Vec<Frame>,
    /// Opening marker of a verbatim tag, waiting to prefix its body.
    carry: String,
    active_tool: Option<String>,
    in_thinking: bool,
    in_tool: bool,
}

impl ContentClassifier {
    /// Create a classifier using the default tag vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a classifier with a custom tag vocabulary.
    #[must_use]
    pub fn with_vocabulary(vocabulary: TagVocabulary) -> Self {
        Self {
            vocabulary,
            ..Self::default()
        }
    }

    /// Consume the next chunk and return the spans it completes.
    ///
    /// Chunks must be fed in arrival order. A call may return no spans
    /// (the chunk only extended pending text) or several.
    pub fn feed(&mut self, chunk: &str) -> Vec<ClassifiedSpan> {
        self.pending.push_str(chunk);
        let mut spans = Vec::new();
        let mut text_start = 0;
        let mut cursor = self.scan_offset;

        let resume = loop {
            let Some(rel) = self.pending[cursor..].find('<') else {
                break self.pending.len();
            };
            let lt = cursor + rel;
            match tag::scan(&self.pending[lt..]) {
                Scan::Incomplete => break lt,
                Scan::Literal => cursor = lt + 1,
                Scan::Tag(tag) => {
                    let text = self.pending[text_start..lt].to_owned();
                    self.apply(&text, &tag, &mut spans);
                    cursor = lt + tag.raw.len();
                    text_start = cursor;
                }
            }
        };

        // Only the consumed prefix is dropped; unresolved text stays in place.
        self.pending.drain(..text_start);
        self.scan_offset = resume - text_start;
        spans
    }

    /// Release all pending text as a span of the current category.
    ///
    /// Intended for end of generation. The span is marked incomplete; the
    /// tag stack is left untouched.
    pub fn flush(&mut self) -> Vec<ClassifiedSpan> {
        let mut body = std::mem::take(&mut self.carry);
        body.push_str(&self.pending);
        self.pending.clear();
        self.scan_offset = 0;

        if body.is_empty() {
            return Vec::new();
        }
        let (category, tool_name) = self.context();
        vec![ClassifiedSpan {
            text: body,
            category,
            tool_name,
            is_complete: false,
        }]
    }

    /// Clear all state, discarding pending text.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.scan_offset = 0;
        self.stack.clear();
        self.carry.clear();
        self.refresh();
    }

    /// Text received but not yet classified.
    #[must_use]
    pub fn peek_buffered(&self) -> &str {
        &self.pending
    }

    /// Names of the open structural tags, innermost last.
    #[must_use]
    pub fn tag_stack(&self) -> Vec<&str> {
        self.stack.iter().map(|f| f.name.as_str()).collect()
    }

    /// Innermost open tool-invocation tag.
    #[must_use]
    pub fn active_tool_name(&self) -> Option<&str> {
        self.active_tool.as_deref()
    }

    /// Whether a thinking section is open.
    #[must_use]
    pub fn in_thinking_section(&self) -> bool {
        self.in_thinking
    }

    /// Whether a tool-invocation section is open.
    #[must_use]
    pub fn in_tool_section(&self) -> bool {
        self.in_tool
    }

    fn apply(&mut self, text: &str, tag: &Tag, spans: &mut Vec<ClassifiedSpan>) {
        match tag.kind {
            TagKind::Open | TagKind::SelfClosing if self.opens_structure(&tag.name) => {
                self.open(text, tag, spans);
            }
            TagKind::Close if self.closes_structure(&tag.name) => self.close(text, tag, spans),
            _ => {
                self.emit_context(text, spans);
                self.emit_context(&tag.raw, spans);
            }
        }
    }

    fn opens_structure(&self, name: &str) -> bool {
        if self.in_thinking {
            return name == self.vocabulary.thinking_tag();
        }
        self.vocabulary.role(name).is_some()
    }

    fn closes_structure(&self, name: &str) -> bool {
        if self.in_thinking && name != self.vocabulary.thinking_tag() {
            return false;
        }
        self.stack.iter().any(|f| f.name == name)
    }

    fn open(&mut self, text: &str, tag: &Tag, spans: &mut Vec<ClassifiedSpan>) {
        self.emit_context(text, spans);
        let Some(frame) = self.frame_for(&tag.name) else {
            return;
        };

        if tag.kind == TagKind::SelfClosing {
            if frame.verbatim {
                push_span(spans, tag.raw.clone(), frame.category, frame.tool_name);
            }
            return;
        }

        if frame.verbatim {
            self.carry.clone_from(&tag.raw);
        }
        self.stack.push(frame);
        self.refresh();
    }

    fn close(&mut self, text: &str, tag: &Tag, spans: &mut Vec<ClassifiedSpan>) {
        let Some(idx) = self.stack.iter().rposition(|f| f.name == tag.name) else {
            return;
        };
        let innermost = idx + 1 == self.stack.len();
        let frame = &self.stack[idx];

        if innermost && frame.verbatim {
            let mut body = std::mem::take(&mut self.carry);
            body.push_str(text);
            body.push_str(&tag.raw);
            push_span(spans, body, frame.category, frame.tool_name.clone());
        } else {
            let closed = frame.clone();
            self.emit_context(text, spans);
            if closed.verbatim {
                push_span(spans, tag.raw.clone(), closed.category, closed.tool_name);
            }
        }

        self.stack.truncate(idx);
        self.refresh();
    }

    /// Emit carried prefix plus `text` under the current context.
    fn emit_context(&mut self, text: &str, spans: &mut Vec<ClassifiedSpan>) {
        let mut body = std::mem::take(&mut self.carry);
        body.push_str(text);
        let (category, tool_name) = self.context();
        push_span(spans, body, category, tool_name);
    }

    fn context(&self) -> (ContentCategory, Option<String>) {
        self.stack.last().map_or((ContentCategory::Plain, None), |f| {
            (f.category, f.tool_name.clone())
        })
    }

    fn frame_for(&self, name: &str) -> Option<Frame> {
        let role = self.vocabulary.role(name)?;
        let parent_is_completion = self
            .stack
            .last()
            .is_some_and(|p| p.role == TagRole::Tool && p.name == self.vocabulary.completion_tool());

        let (category, tool_name, verbatim) = match role {
            TagRole::Thinking => (ContentCategory::Thinking, None, false),
            TagRole::Tool => (ContentCategory::ToolCall, Some(name.to_owned()), false),
            TagRole::Result if parent_is_completion => (
                ContentCategory::ToolCall,
                Some(self.vocabulary.completion_tool().to_owned()),
                false,
            ),
            TagRole::Result => (ContentCategory::ToolResult, self.active_tool.clone(), true),
            TagRole::SystemParam => (ContentCategory::SystemParam, self.active_tool.clone(), true),
        };

        Some(Frame {
            name: name.to_owned(),
            role,
            category,
            tool_name,
            verbatim,
        })
    }

    fn refresh(&mut self) {
        self.in_thinking = self.stack.iter().any(|f| f.role == TagRole::Thinking);
        self.active_tool = self
            .stack
            .iter()
            .rev()
            .find(|f| f.role == TagRole::Tool)
            .map(|f| f.name.clone());
        self.in_tool = self.active_tool.is_some();
    }
}

fn push_span(
    spans: &mut Vec<ClassifiedSpan>,
    text: String,
    category: ContentCategory,
    tool_name: Option<String>,
) {
    if !text.is_empty() {
        spans.push(ClassifiedSpan::complete(text, category, tool_name));
    }
}
