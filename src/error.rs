//! Error types for langbridge

use std::time::Duration;

use thiserror::Error;

use crate::models::{LanguageId, WorkspaceFolder};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to start {language} backend: {message}")]
    Spawn {
        language: LanguageId,
        message: String,
    },

    #[error("{language} backend is not running for {workspace}")]
    NotRunning {
        language: LanguageId,
        workspace: WorkspaceFolder,
    },

    #[error("{language} '{method}' timed out after {}ms", .after.as_millis())]
    Timeout {
        language: LanguageId,
        method: String,
        after: Duration,
    },

    #[error("{language} backend process exited: {reason}")]
    ProcessExited { language: LanguageId, reason: String },

    #[error("{language} backend process shutdown")]
    Shutdown { language: LanguageId },

    #[error("Server error [{code}]: {message}")]
    Server { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported language: {0}")]
    UnknownLanguage(LanguageId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// JSON-RPC error code reported to the host
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Server { code, .. } => *code,
            Self::ProcessExited { .. } => -32099,
            Self::Shutdown { .. } => -32098,
            Self::Timeout { .. } => -32001,
            Self::Spawn { .. } => -32002,
            Self::NotRunning { .. } => -32003,
            Self::UnknownLanguage(_) => -32004,
            Self::Protocol(_) | Self::Json(_) => -32700,
            Self::Io(_) => -32000,
        }
    }

    pub fn affected_language(&self) -> Option<&LanguageId> {
        match self {
            Self::Spawn { language, .. }
            | Self::NotRunning { language, .. }
            | Self::Timeout { language, .. }
            | Self::ProcessExited { language, .. }
            | Self::Shutdown { language }
            | Self::UnknownLanguage(language) => Some(language),
            _ => None,
        }
    }
}

/// Framing faults; recovered locally by the reader loop
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame header: {0:?}")]
    MalformedHeader(String),

    #[error("Invalid frame body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_exit_code() {
        let err = BackendError::ProcessExited {
            language: LanguageId::GO,
            reason: "stdout closed".to_string(),
        };
        assert_eq!(err.error_code(), -32099);
        assert_eq!(err.affected_language(), Some(&LanguageId::GO));
        assert!(err.to_string().contains("exited"));
    }

    #[test]
    fn test_timeout_message() {
        let err = BackendError::Timeout {
            language: LanguageId::PYTHON,
            method: "textDocument/hover".to_string(),
            after: Duration::from_millis(4500),
        };
        assert_eq!(err.error_code(), -32001);
        assert_eq!(
            err.to_string(),
            "python 'textDocument/hover' timed out after 4500ms"
        );
    }

    #[test]
    fn test_not_running_message() {
        let err = BackendError::NotRunning {
            language: LanguageId::GO,
            workspace: WorkspaceFolder::new("/repo"),
        };
        assert_eq!(err.error_code(), -32003);
        assert!(err.to_string().contains("not running"));
    }
}
