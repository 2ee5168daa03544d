//! LSP Common Types
//!
//! Host-facing shapes shared by every backend. JSON-RPC results are
//! normalized into these, and tsserver results are translated into them,
//! so the host sees one contract regardless of backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

// ============================================================================
// Core LSP Types
// ============================================================================

/// Position within a document (0-indexed, LSP standard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Range within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// One incremental edit; no range means the whole document is replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    pub text: String,
}

impl TextChange {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    pub fn ranged(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

/// Location in a document (LSP wire format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    #[serde(default)]
    pub range: Range,
}

/// LocationLink - returned by some servers for definition requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    pub target_uri: String,
    pub target_range: Range,
    pub target_selection_range: Range,
    #[serde(default)]
    pub origin_selection_range: Option<Range>,
}

impl LocationLink {
    pub fn to_location(&self) -> Location {
        Location {
            uri: self.target_uri.clone(),
            range: self.target_selection_range,
        }
    }
}

// ============================================================================
// Hover
// ============================================================================

/// Hover result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hover {
    pub contents: HoverContents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

/// Hover contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoverContents {
    Markup(MarkupContent),
    Array(Vec<MarkedString>),
    Marked(MarkedString),
}

/// Markup content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupContent {
    pub kind: String,
    pub value: String,
}

impl MarkupContent {
    pub fn markdown(value: impl Into<String>) -> Self {
        Self {
            kind: "markdown".to_string(),
            value: value.into(),
        }
    }
}

/// Marked string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkedString {
    String(String),
    LanguageString { language: String, value: String },
}

impl Hover {
    /// Flatten the contents into display text
    pub fn text(&self) -> String {
        fn marked(m: &MarkedString) -> String {
            match m {
                MarkedString::String(s) => s.clone(),
                MarkedString::LanguageString { value, .. } => value.clone(),
            }
        }

        match &self.contents {
            HoverContents::Markup(markup) => markup.value.clone(),
            HoverContents::Marked(m) => marked(m),
            HoverContents::Array(items) => items.iter().map(marked).collect::<Vec<_>>().join("\n"),
        }
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Completion list; items are passed through in the backend's LSP shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionList {
    #[serde(default)]
    pub is_incomplete: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Completion item kind (LSP standard - integer values)
#[derive(Debug, Clone, Copy, Serialize_repr, Deserialize_repr, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionItemKind {
    Text = 1,
    Method = 2,
    Function = 3,
    Constructor = 4,
    Field = 5,
    Variable = 6,
    Class = 7,
    Interface = 8,
    Module = 9,
    Property = 10,
    Unit = 11,
    Value = 12,
    Enum = 13,
    Keyword = 14,
    Snippet = 15,
    Color = 16,
    File = 17,
    Reference = 18,
    Folder = 19,
    EnumMember = 20,
    Constant = 21,
    Struct = 22,
    Event = 23,
    Operator = 24,
    TypeParameter = 25,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Diagnostic severity (LSP standard - integer values)
#[derive(Debug, Clone, Copy, Serialize_repr, Deserialize_repr, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

/// Normalized diagnostic (LSP `Diagnostic` shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

/// `textDocument/publishDiagnostics` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Result normalization
// ============================================================================

pub fn parse_hover(value: Value) -> Option<Hover> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value::<Hover>(value) {
        Ok(hover) => Some(hover),
        Err(e) => {
            tracing::debug!("Unrecognized hover result: {}", e);
            None
        }
    }
}

/// Accepts `CompletionItem[]`, `CompletionList` or null
pub fn parse_completion(value: Value) -> Option<CompletionList> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(CompletionList {
            is_incomplete: false,
            items,
        }),
        other => match serde_json::from_value::<CompletionList>(other) {
            Ok(list) => Some(list),
            Err(e) => {
                tracing::debug!("Unrecognized completion result: {}", e);
                None
            }
        },
    }
}

/// Accepts `Location`, `Location[]`, `LocationLink[]` or null
pub fn parse_definition(value: Value) -> Option<Vec<Location>> {
    let locations = match value {
        Value::Null => return None,
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| {
                if item.get("targetUri").is_some() {
                    serde_json::from_value::<LocationLink>(item)
                        .ok()
                        .map(|link| link.to_location())
                } else {
                    serde_json::from_value::<Location>(item).ok()
                }
            })
            .collect::<Vec<_>>(),
        single => serde_json::from_value::<Location>(single)
            .map(|loc| vec![loc])
            .unwrap_or_default(),
    };

    if locations.is_empty() {
        None
    } else {
        Some(locations)
    }
}
