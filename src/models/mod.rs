//! Data models for langbridge
//!
//! Contains core type definitions used throughout the application.

pub mod config;
pub mod language;
pub mod lsp;
pub mod workspace;

// Re-export commonly used types
pub use config::{BridgeConfig, ProcessSettings, ServerOverride};
pub use language::LanguageId;
pub use lsp::{
    CompletionList, Diagnostic, DiagnosticSeverity, Hover, Location, Position, Range, TextChange,
};
pub use workspace::WorkspaceFolder;
