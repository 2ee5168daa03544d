//! JSON-RPC 2.0 wire protocol for standard language servers
//!
//! Frames are `Content-Length: <n>\r\n\r\n<json>`; responses are correlated
//! by the top-level `id`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::framing::Framing;
use super::process::{Incoming, Notice, WireProtocol};
use crate::error::BackendError;

// ============================================================================
// JSON-RPC 2.0 Core Types
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: ResponseError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Request ID - can be number or string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl RequestId {
    /// Numeric id, coercing numeric strings some servers echo back
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<ResponseError> for BackendError {
    fn from(err: ResponseError) -> Self {
        BackendError::Server {
            code: err.code,
            message: err.message,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ============================================================================
// Initialize
// ============================================================================

/// Client info for identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceFolderParam {
    pub uri: String,
    pub name: String,
}

/// Initialize params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub process_id: Option<u32>,
    pub client_info: ClientInfo,
    pub root_uri: Option<String>,
    pub root_path: Option<String>,
    pub workspace_folders: Vec<WorkspaceFolderParam>,
    pub capabilities: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<Value>,
}

/// Capabilities for the features the bridge exposes
pub fn client_capabilities() -> Value {
    json!({
        "general": {
            "positionEncodings": ["utf-16"]
        },
        "window": {
            "workDoneProgress": true
        },
        "workspace": {
            "workspaceFolders": true,
            "configuration": true
        },
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": false,
                "didSave": false
            },
            "hover": {
                "contentFormat": ["markdown", "plaintext"]
            },
            "completion": {
                "contextSupport": true,
                "completionItem": {
                    "snippetSupport": false,
                    "documentationFormat": ["markdown", "plaintext"],
                    "deprecatedSupport": true,
                    "labelDetailsSupport": true
                },
                "completionItemKind": {
                    "valueSet": (1..=25).collect::<Vec<_>>()
                }
            },
            "definition": {
                "linkSupport": true
            },
            "publishDiagnostics": {
                "relatedInformation": true,
                "versionSupport": true
            }
        }
    })
}

// ============================================================================
// Wire protocol
// ============================================================================

/// Standard LSP dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRpc;

impl JsonRpc {
    /// Answer a server-initiated request so the backend never stalls on us
    fn answer(id: RequestId, method: &str, params: &Value) -> Response {
        match method {
            "workspace/configuration" => {
                let items = params
                    .get("items")
                    .and_then(|i| i.as_array())
                    .map(|arr| arr.len())
                    .unwrap_or(0);
                Response::success(id, Value::Array(vec![json!({}); items]))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create"
            | "window/showMessageRequest" => Response::success(id, Value::Null),
            _ => {
                tracing::debug!("Unhandled server request: {}", method);
                Response::failure(
                    id,
                    ResponseError {
                        code: error_codes::METHOD_NOT_FOUND,
                        message: format!("Method not found: {}", method),
                        data: None,
                    },
                )
            }
        }
    }
}

impl WireProtocol for JsonRpc {
    fn framing(&self) -> Framing {
        Framing::ContentLength
    }

    fn encode(&self, message: &Value) -> Vec<u8> {
        Framing::encode(&message.to_string())
    }

    fn request(&self, id: u64, method: &str, params: Option<Value>) -> Value {
        json!(Request::new(id, method, params))
    }

    fn notification(&self, _seq: u64, method: &str, params: Option<Value>) -> Value {
        json!(Notification::new(method, params))
    }

    fn classify(&self, message: &Value) -> Incoming {
        let method = message.get("method").and_then(|m| m.as_str());
        let id = message
            .get("id")
            .filter(|id| !id.is_null())
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

        match (method, id) {
            (None, Some(id)) => {
                let Some(id) = id.as_u64() else {
                    tracing::debug!("Response with non-numeric id {:?}", id);
                    return Incoming::Notification {
                        notices: Vec::new(),
                        reply: None,
                    };
                };
                let outcome = match serde_json::from_value::<Response>(message.clone()) {
                    Ok(response) => response.into_result().map_err(BackendError::from),
                    Err(e) => Err(BackendError::Protocol(format!("Malformed response: {}", e))),
                };
                Incoming::Response { id, outcome }
            }
            (Some(method), id) => {
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                let reply = id.map(|id| json!(Self::answer(id, method, &params)));
                Incoming::Notification {
                    notices: vec![Notice {
                        method: method.to_string(),
                        message: message.clone(),
                        params,
                    }],
                    reply,
                }
            }
            (None, None) => {
                tracing::debug!("Message without id or method");
                Incoming::Notification {
                    notices: Vec::new(),
                    reply: None,
                }
            }
        }
    }
}
