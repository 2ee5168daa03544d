//! Host wire protocol
//!
//! One JSON object per line in each direction. Requests carry an `id` and
//! get exactly one response with the same `id`; events have no `id`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;
use crate::events::BridgeEvent;
use crate::models::{LanguageId, Position, TextChange, WorkspaceFolder};

/// Request from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Response to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Request ID
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {}", method))
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self::new(-32602, format!("Invalid params: {}", msg))
    }
}

impl From<&BackendError> for RpcError {
    fn from(error: &BackendError) -> Self {
        let mut rpc = Self::new(error.error_code(), error.to_string());
        if let Some(language) = error.affected_language() {
            rpc.data = Some(serde_json::json!({ "languageId": language }));
        }
        rpc
    }
}

impl From<BackendError> for RpcError {
    fn from(error: BackendError) -> Self {
        Self::from(&error)
    }
}

/// Event pushed to the host
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event: String,
    pub language_id: LanguageId,
    pub workspace: WorkspaceFolder,
    pub payload: Value,
}

impl From<&BridgeEvent> for EventMessage {
    fn from(event: &BridgeEvent) -> Self {
        Self {
            event: event.channel(),
            language_id: event.language().clone(),
            workspace: event.workspace().clone(),
            payload: event.payload(),
        }
    }
}

/// Host method names
pub mod methods {
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const IS_RUNNING: &str = "isRunning";
    pub const HOVER: &str = "hover";
    pub const COMPLETION: &str = "completion";
    pub const DEFINITION: &str = "definition";
    pub const DID_OPEN: &str = "didOpen";
    pub const DID_CHANGE: &str = "didChange";
    pub const DID_CLOSE: &str = "didClose";
    pub const LANGUAGES: &str = "languages";
    pub const PING: &str = "ping";
    pub const SHUTDOWN: &str = "shutdown";
}

// ============================================================================
// Request parameter types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleParams {
    pub workspace: WorkspaceFolder,
    pub language_id: LanguageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionParams {
    pub workspace: WorkspaceFolder,
    pub language_id: LanguageId,
    pub file: PathBuf,
    pub position: Position,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenParams {
    pub workspace: WorkspaceFolder,
    pub language_id: LanguageId,
    pub file: PathBuf,
    pub text: String,
    #[serde(default = "initial_version")]
    pub version: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeParams {
    pub workspace: WorkspaceFolder,
    pub language_id: LanguageId,
    pub file: PathBuf,
    pub changes: Vec<TextChange>,
    pub version: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseParams {
    pub workspace: WorkspaceFolder,
    pub language_id: LanguageId,
    pub file: PathBuf,
}

fn initial_version() -> i32 {
    1
}
