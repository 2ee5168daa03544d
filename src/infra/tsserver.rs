//! tsserver wire protocol
//!
//! tsserver reads one JSON command per line and answers with
//! `Content-Length: <n>` framed messages whose header ends with a single
//! newline. Responses are correlated by `request_seq`, and events are
//! filtered through an allow-list before reaching the host. Positions on
//! this wire are 1-based `line`/`offset`; the helpers below translate to and
//! from the zero-based LSP shapes the rest of the bridge uses.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};

use super::framing::Framing;
use super::jsonrpc::error_codes;
use super::process::{Incoming, Notice, WireProtocol};
use crate::error::BackendError;
use crate::models::lsp::{
    CompletionItemKind, CompletionList, Diagnostic, DiagnosticSeverity, Hover, HoverContents,
    Location, MarkupContent, Position, PublishDiagnosticsParams, Range, TextChange,
};
use crate::models::workspace::path_to_uri;

/// Events forwarded to the host; everything else is dropped
pub const FORWARDED_EVENTS: &[&str] = &[
    "syntaxDiag",
    "semanticDiag",
    "suggestionDiag",
    "configFileDiag",
    "projectLoadingStart",
    "projectLoadingFinish",
    "projectsUpdatedInBackground",
    "telemetry",
    "requestCompleted",
    "typingsInstallerPid",
];

/// Event re-published as `textDocument/publishDiagnostics`
const DIAGNOSTICS_EVENT: &str = "semanticDiag";

#[derive(Debug, Default, Clone, Copy)]
pub struct TsServer;

impl WireProtocol for TsServer {
    fn framing(&self) -> Framing {
        Framing::LineHeader
    }

    fn encode(&self, message: &Value) -> Vec<u8> {
        let mut line = message.to_string().into_bytes();
        line.push(b'\n');
        line
    }

    fn request(&self, id: u64, method: &str, params: Option<Value>) -> Value {
        command(id, method, params)
    }

    fn notification(&self, seq: u64, method: &str, params: Option<Value>) -> Value {
        command(seq, method, params)
    }

    fn classify(&self, message: &Value) -> Incoming {
        match message.get("type").and_then(|t| t.as_str()) {
            Some("response") => classify_response(message),
            Some("event") => classify_event(message),
            other => {
                tracing::debug!("tsserver message with unexpected type {:?}", other);
                Incoming::Ignored
            }
        }
    }
}

fn command(seq: u64, command: &str, arguments: Option<Value>) -> Value {
    let mut message = json!({
        "seq": seq,
        "type": "request",
        "command": command,
    });
    if let Some(arguments) = arguments {
        message["arguments"] = arguments;
    }
    message
}

fn classify_response(message: &Value) -> Incoming {
    let Some(id) = message.get("request_seq").and_then(|s| s.as_u64()) else {
        tracing::debug!("tsserver response without request_seq");
        return Incoming::Ignored;
    };

    let success = message
        .get("success")
        .and_then(|s| s.as_bool())
        .unwrap_or(false);

    let outcome = if success {
        Ok(message.get("body").cloned().unwrap_or(Value::Null))
    } else {
        let command = message
            .get("command")
            .and_then(|c| c.as_str())
            .unwrap_or("command");
        let text = message
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} failed", command));
        Err(BackendError::Server {
            code: error_codes::INTERNAL_ERROR,
            message: text,
        })
    };

    Incoming::Response { id, outcome }
}

fn classify_event(message: &Value) -> Incoming {
    let Some(event) = message.get("event").and_then(|e| e.as_str()) else {
        return Incoming::Ignored;
    };

    if !FORWARDED_EVENTS.contains(&event) {
        tracing::trace!("Dropping tsserver event {}", event);
        return Incoming::Ignored;
    }

    let body = message.get("body").cloned().unwrap_or(Value::Null);
    let mut notices = vec![Notice {
        method: event.to_string(),
        message: message.clone(),
        params: body.clone(),
    }];

    if event == DIAGNOSTICS_EVENT
        && let Some(params) = publish_diagnostics(&body)
    {
        let params = json!(params);
        notices.push(Notice {
            method: "textDocument/publishDiagnostics".to_string(),
            message: json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": params,
            }),
            params,
        });
    }

    Incoming::Notification {
        notices,
        reply: None,
    }
}

// ============================================================================
// Positions and edits
// ============================================================================

/// 1-based tsserver location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TsLocation {
    pub line: u32,
    pub offset: u32,
}

impl TsLocation {
    pub fn from_position(position: Position) -> Self {
        Self {
            line: position.line + 1,
            offset: position.character + 1,
        }
    }

    pub fn to_position(self) -> Position {
        Position::new(self.line.saturating_sub(1), self.offset.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TsSpan {
    pub start: TsLocation,
    pub end: TsLocation,
}

impl TsSpan {
    pub fn to_range(&self) -> Range {
        Range::new(self.start.to_position(), self.end.to_position())
    }
}

pub fn file_arg(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

/// `{file, line, offset}` arguments for position-based commands
pub fn location_args(file: &Path, position: Position) -> Value {
    let location = TsLocation::from_position(position);
    json!({
        "file": file_arg(file),
        "line": location.line,
        "offset": location.offset,
    })
}

/// Arguments of a `change` command
///
/// A change without a range is sent as an empty span at (1,1)-(1,1) carrying
/// the full text. tsserver applies that as an insertion ahead of the buffer
/// it already holds, not as a replacement. Hosts that need the old text gone
/// must send a ranged change covering it.
pub fn change_args(file: &Path, change: &TextChange) -> Value {
    let (start, end) = match change.range {
        Some(range) => (
            TsLocation::from_position(range.start),
            TsLocation::from_position(range.end),
        ),
        None => {
            let origin = TsLocation { line: 1, offset: 1 };
            (origin, origin)
        }
    };

    json!({
        "file": file_arg(file),
        "line": start.line,
        "offset": start.offset,
        "endLine": end.line,
        "endOffset": end.offset,
        "insertText": change.text,
    })
}

// ============================================================================
// Result translation
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickInfo {
    #[serde(default)]
    display_string: String,
    #[serde(default)]
    documentation: Value,
    start: Option<TsLocation>,
    end: Option<TsLocation>,
}

/// `quickinfo` body → Hover
pub fn hover_from_quickinfo(body: Value) -> Option<Hover> {
    if body.is_null() {
        return None;
    }
    let info: QuickInfo = serde_json::from_value(body).ok()?;
    if info.display_string.is_empty() {
        return None;
    }

    let mut value = format!("```typescript\n{}\n```", info.display_string);
    let documentation = documentation_text(&info.documentation);
    if !documentation.is_empty() {
        value.push_str("\n\n");
        value.push_str(&documentation);
    }

    let range = match (info.start, info.end) {
        (Some(start), Some(end)) => Some(Range::new(start.to_position(), end.to_position())),
        _ => None,
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent::markdown(value)),
        range,
    })
}

/// Documentation is either a string or symbol display parts
fn documentation_text(documentation: &Value) -> String {
    match documentation {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect(),
        _ => String::new(),
    }
}

/// `completionInfo` body → CompletionList
pub fn completion_from_info(body: Value) -> Option<CompletionList> {
    let entries = body.get("entries")?.as_array()?;
    let is_incomplete = body
        .get("isIncomplete")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let items = entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            let kind = entry.get("kind").and_then(|k| k.as_str()).unwrap_or("");
            let mut item = json!({
                "label": name,
                "kind": completion_kind(kind),
            });
            if let Some(sort_text) = entry.get("sortText") {
                item["sortText"] = sort_text.clone();
            }
            if let Some(insert_text) = entry.get("insertText") {
                item["insertText"] = insert_text.clone();
            }
            if let Some(modifiers) = entry.get("kindModifiers").and_then(|m| m.as_str())
                && modifiers.split(',').any(|m| m == "deprecated")
            {
                item["deprecated"] = json!(true);
            }
            Some(item)
        })
        .collect();

    Some(CompletionList {
        is_incomplete,
        items,
    })
}

fn completion_kind(kind: &str) -> CompletionItemKind {
    match kind {
        "keyword" | "primitive type" => CompletionItemKind::Keyword,
        "function" | "local function" => CompletionItemKind::Function,
        "method" | "construct" | "call" => CompletionItemKind::Method,
        "property" | "getter" | "setter" | "accessor" => CompletionItemKind::Property,
        "var" | "let" | "local var" | "parameter" | "using" => CompletionItemKind::Variable,
        "const" => CompletionItemKind::Constant,
        "class" | "local class" => CompletionItemKind::Class,
        "interface" => CompletionItemKind::Interface,
        "type" | "alias" | "type parameter" => CompletionItemKind::TypeParameter,
        "enum" => CompletionItemKind::Enum,
        "enum member" => CompletionItemKind::EnumMember,
        "module" | "external module name" => CompletionItemKind::Module,
        "constructor" => CompletionItemKind::Constructor,
        "directory" => CompletionItemKind::Folder,
        "script" => CompletionItemKind::File,
        _ => CompletionItemKind::Text,
    }
}

#[derive(Debug, Deserialize)]
struct FileSpan {
    file: String,
    start: TsLocation,
    end: TsLocation,
}

/// `definition` body → locations
pub fn definition_locations(body: Value) -> Option<Vec<Location>> {
    let spans: Vec<FileSpan> = serde_json::from_value(body).ok()?;
    let locations: Vec<Location> = spans
        .into_iter()
        .map(|span| Location {
            uri: path_to_uri(Path::new(&span.file)),
            range: Range::new(span.start.to_position(), span.end.to_position()),
        })
        .collect();

    if locations.is_empty() {
        None
    } else {
        Some(locations)
    }
}

#[derive(Debug, Deserialize)]
struct TsDiagnostic {
    start: TsLocation,
    end: TsLocation,
    text: String,
    code: Option<Value>,
    category: Option<String>,
    source: Option<String>,
}

/// `semanticDiag` body → `textDocument/publishDiagnostics` params
pub fn publish_diagnostics(body: &Value) -> Option<PublishDiagnosticsParams> {
    let file = body.get("file")?.as_str()?;
    let raw: Vec<TsDiagnostic> =
        serde_json::from_value(body.get("diagnostics").cloned().unwrap_or(json!([]))).ok()?;

    let diagnostics = raw
        .into_iter()
        .map(|d| Diagnostic {
            range: Range::new(d.start.to_position(), d.end.to_position()),
            severity: Some(match d.category.as_deref() {
                Some("warning") => DiagnosticSeverity::Warning,
                Some("suggestion") => DiagnosticSeverity::Hint,
                Some("message") => DiagnosticSeverity::Information,
                _ => DiagnosticSeverity::Error,
            }),
            code: d.code,
            source: Some(d.source.unwrap_or_else(|| "ts".to_string())),
            message: d.text,
        })
        .collect();

    Some(PublishDiagnosticsParams {
        uri: path_to_uri(Path::new(file)),
        diagnostics,
    })
}
