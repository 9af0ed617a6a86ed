//! Rich-text delta codec.
//!
//! An edit is an ordered list of operations walked left-to-right over the
//! document:
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┐
//! │ insert   │ splice new text (with optional formatting)   │
//! │ retain   │ keep N chars, optionally patching formatting │
//! │ delete   │ drop N chars                                 │
//! └──────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Deltas are serialized as JSON — the same operation list is stored in a
//! node's `content` field and forwarded verbatim between editing sessions.
//! Application is purely client-side and sequential; there is no compose or
//! transform step.
//!
//! Invariant: the cumulative retain+delete length of a delta must not exceed
//! the content length it is applied to. Violations are a malformed-delta
//! error, never a panic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A formatting attribute value.
///
/// `Null` is meaningful on retain: it removes the attribute from the
/// retained range (`{"bold": null}` clears bold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Formatting attributes attached to an operation or a text span.
///
/// BTreeMap keeps serialization deterministic.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A single operation in a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOp {
    /// Insert text at the current position.
    Insert {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    /// Keep `len` characters, optionally patching their formatting.
    Retain {
        len: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    /// Remove `len` characters.
    Delete { len: usize },
}

/// An ordered list of operations describing one edit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    pub ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Append a plain insert.
    pub fn insert(mut self, text: impl Into<String>) -> Self {
        self.ops.push(DeltaOp::Insert {
            text: text.into(),
            attributes: None,
        });
        self
    }

    /// Append a formatted insert.
    pub fn insert_with(mut self, text: impl Into<String>, attributes: Attributes) -> Self {
        self.ops.push(DeltaOp::Insert {
            text: text.into(),
            attributes: Some(attributes),
        });
        self
    }

    /// Append a plain retain.
    pub fn retain(mut self, len: usize) -> Self {
        self.ops.push(DeltaOp::Retain {
            len,
            attributes: None,
        });
        self
    }

    /// Append a retain that patches formatting over the retained range.
    pub fn retain_with(mut self, len: usize, attributes: Attributes) -> Self {
        self.ops.push(DeltaOp::Retain {
            len,
            attributes: Some(attributes),
        });
        self
    }

    /// Append a delete.
    pub fn delete(mut self, len: usize) -> Self {
        self.ops.push(DeltaOp::Delete { len });
        self
    }

    /// Total source length this delta consumes (retain + delete).
    pub fn consumed_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Retain { len, .. } | DeltaOp::Delete { len } => *len,
                DeltaOp::Insert { .. } => 0,
            })
            .sum()
    }

    /// Total length of inserted text (in chars).
    pub fn inserted_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert { text, .. } => text.chars().count(),
                _ => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Serialize to the JSON form stored in a node's `content` field.
    pub fn to_json(&self) -> Result<String, DeltaError> {
        serde_json::to_string(self).map_err(|e| DeltaError::Serialization(e.to_string()))
    }

    /// Parse from the stored JSON form.
    pub fn from_json(json: &str) -> Result<Self, DeltaError> {
        serde_json::from_str(json).map_err(|e| DeltaError::Serialization(e.to_string()))
    }
}

/// Delta errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaError {
    /// The operation list consumes more content than exists.
    Malformed { needed: usize, available: usize },
    /// JSON encode/decode failed.
    Serialization(String),
}

impl std::fmt::Display for DeltaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeltaError::Malformed { needed, available } => write!(
                f,
                "Malformed delta: consumes {needed} chars but only {available} available"
            ),
            DeltaError::Serialization(e) => write!(f, "Delta serialization error: {e}"),
        }
    }
}

impl std::error::Error for DeltaError {}

/// A run of identically-formatted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub attributes: Attributes,
}

/// In-memory rich-text document: a normalized sequence of spans.
///
/// Adjacent spans with equal attributes are merged and empty spans dropped,
/// so two documents with the same visible content and formatting compare
/// equal regardless of edit history. Indices are Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RichText {
    spans: Vec<Span>,
}

impl RichText {
    pub fn new() -> Self {
        Self { spans: Vec::new() }
    }

    /// Build from unformatted text.
    pub fn from_plain(text: &str) -> Self {
        if text.is_empty() {
            return Self::new();
        }
        Self {
            spans: vec![Span {
                text: text.to_string(),
                attributes: Attributes::new(),
            }],
        }
    }

    /// Content length in chars.
    pub fn char_len(&self) -> usize {
        self.spans.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Concatenated text without formatting.
    pub fn plain(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Apply a delta, producing a new document.
    ///
    /// Pure: `self` is untouched. Fails with `DeltaError::Malformed` when
    /// the operation list consumes more characters than remain.
    pub fn apply(&self, delta: &Delta) -> Result<RichText, DeltaError> {
        let available = self.char_len();
        let needed = delta.consumed_len();
        if needed > available {
            return Err(DeltaError::Malformed { needed, available });
        }

        let mut source = SpanCursor::new(&self.spans);
        let mut out = RichText::new();

        for op in &delta.ops {
            match op {
                DeltaOp::Insert { text, attributes } => {
                    out.push_span(Span {
                        text: text.clone(),
                        attributes: attributes.clone().unwrap_or_default(),
                    });
                }
                DeltaOp::Retain { len, attributes } => {
                    for span in source.take(*len) {
                        let merged = match attributes {
                            Some(patch) => patch_attributes(&span.attributes, patch),
                            None => span.attributes,
                        };
                        out.push_span(Span {
                            text: span.text,
                            attributes: merged,
                        });
                    }
                }
                DeltaOp::Delete { len } => {
                    let _ = source.take(*len);
                }
            }
        }

        // Remainder past the delta's reach is carried over unchanged.
        for span in source.rest() {
            out.push_span(span);
        }

        Ok(out)
    }

    /// Append a span, merging with the tail when attributes match.
    fn push_span(&mut self, span: Span) {
        if span.text.is_empty() {
            return;
        }
        if let Some(last) = self.spans.last_mut() {
            if last.attributes == span.attributes {
                last.text.push_str(&span.text);
                return;
            }
        }
        self.spans.push(span);
    }
}

/// Apply a retain-attribute patch: `Null` removes a key, anything else sets.
fn patch_attributes(base: &Attributes, patch: &Attributes) -> Attributes {
    let mut merged = base.clone();
    for (key, value) in patch {
        match value {
            AttrValue::Null => {
                merged.remove(key);
            }
            other => {
                merged.insert(key.clone(), other.clone());
            }
        }
    }
    merged
}

/// Walks spans char-by-char, yielding sub-spans of requested lengths.
struct SpanCursor<'a> {
    spans: &'a [Span],
    span_idx: usize,
    /// Char offset into the current span.
    char_offset: usize,
}

impl<'a> SpanCursor<'a> {
    fn new(spans: &'a [Span]) -> Self {
        Self {
            spans,
            span_idx: 0,
            char_offset: 0,
        }
    }

    /// Take up to `len` chars, split on span boundaries.
    fn take(&mut self, mut len: usize) -> Vec<Span> {
        let mut taken = Vec::new();
        while len > 0 && self.span_idx < self.spans.len() {
            let span = &self.spans[self.span_idx];
            let span_chars = span.text.chars().count();
            let remaining = span_chars - self.char_offset;
            let grab = remaining.min(len);

            let text: String = span
                .text
                .chars()
                .skip(self.char_offset)
                .take(grab)
                .collect();
            taken.push(Span {
                text,
                attributes: span.attributes.clone(),
            });

            len -= grab;
            self.char_offset += grab;
            if self.char_offset == span_chars {
                self.span_idx += 1;
                self.char_offset = 0;
            }
        }
        taken
    }

    /// Everything not yet consumed.
    fn rest(&mut self) -> Vec<Span> {
        self.take(usize::MAX)
    }
}
