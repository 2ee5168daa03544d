//! Per-language adapters
//!
//! An adapter is a `BackendSpec` (how to find and launch the backend) bound
//! to the component that speaks its protocol: an `LspSession` for JSON-RPC
//! servers, or the tsserver adapter.

pub mod go;
pub mod lsp;
pub mod python;
pub mod typescript;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::BackendError;
use crate::infra::BackendCommand;
use crate::infra::launcher::{find_in_path, is_executable};
use crate::models::config::ServerOverride;
use crate::models::{
    CompletionList, Hover, LanguageId, Location, Position, TextChange, WorkspaceFolder,
};

pub use lsp::LspAdapter;
pub use typescript::TsServerAdapter;

/// Uniform operations every language backend supports
#[async_trait]
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> &LanguageId;

    fn spec(&self) -> &BackendSpec;

    async fn start(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError>;

    async fn stop(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError>;

    async fn stop_all(&self) -> Vec<(WorkspaceFolder, bool)>;

    async fn is_running(&self, workspace: &WorkspaceFolder) -> bool;

    async fn workspace_folders(&self) -> Vec<WorkspaceFolder>;

    async fn hover(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Hover>, BackendError>;

    async fn completion(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<CompletionList>, BackendError>;

    async fn definition(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Vec<Location>>, BackendError>;

    async fn did_open(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        text: &str,
        version: i32,
    ) -> Result<(), BackendError>;

    async fn did_change(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        changes: &[TextChange],
        version: i32,
    ) -> Result<(), BackendError>;

    async fn did_close(&self, workspace: &WorkspaceFolder, file: &Path) -> Result<(), BackendError>;
}

// ============================================================================
// Backend specification
// ============================================================================

/// Where to look for a backend inside a workspace or home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Executable relative to the workspace root
    Local(&'static str),
    /// JavaScript entry point relative to the workspace root, run with `node`
    NodeScript(&'static str),
    /// Executable relative to the user's home directory
    Home(&'static str),
}

/// How to find and launch one language backend
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub language: LanguageId,
    /// Display name
    pub name: &'static str,
    /// Executable name searched on `PATH`
    pub executable: String,
    pub args: Vec<String>,
    pub candidates: Vec<Candidate>,
    pub install_hint: &'static str,
    /// Explicit executable from configuration; skips discovery
    pub command_override: Option<String>,
}

impl BackendSpec {
    pub fn new(language: LanguageId, name: &'static str, executable: impl Into<String>) -> Self {
        Self {
            language,
            name,
            executable: executable.into(),
            args: Vec::new(),
            candidates: Vec::new(),
            install_hint: "",
            command_override: None,
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn install_hint(mut self, hint: &'static str) -> Self {
        self.install_hint = hint;
        self
    }

    /// Apply a `[servers.<id>]` section
    pub fn with_override(mut self, server: Option<&ServerOverride>) -> Self {
        if let Some(server) = server {
            if let Some(command) = &server.command {
                self.command_override = Some(command.clone());
            }
            if let Some(args) = &server.args {
                self.args = args.clone();
            }
        }
        self
    }

    /// Resolve the launch command: configured override, then workspace-local
    /// installs, then home-relative installs, then `PATH`
    pub fn resolve(&self, workspace: Option<&WorkspaceFolder>) -> Result<BackendCommand, BackendError> {
        if let Some(command) = &self.command_override {
            let program = if command.contains(std::path::MAIN_SEPARATOR) {
                PathBuf::from(command)
            } else {
                find_in_path(command).unwrap_or_else(|| PathBuf::from(command))
            };
            return Ok(BackendCommand::new(program, self.args.clone()));
        }

        for candidate in &self.candidates {
            if let Some(command) = self.try_candidate(candidate, workspace) {
                tracing::debug!("{} resolved to {}", self.language, command);
                return Ok(command);
            }
        }

        find_in_path(&self.executable)
            .map(|program| BackendCommand::new(program, self.args.clone()))
            .ok_or_else(|| BackendError::Spawn {
                language: self.language.clone(),
                message: self.not_found_message(),
            })
    }

    fn try_candidate(
        &self,
        candidate: &Candidate,
        workspace: Option<&WorkspaceFolder>,
    ) -> Option<BackendCommand> {
        match candidate {
            Candidate::Local(relative) => {
                let path = workspace?.path().join(relative);
                is_executable(&path).then(|| BackendCommand::new(path, self.args.clone()))
            }
            Candidate::NodeScript(relative) => {
                let script = workspace?.path().join(relative);
                if !script.is_file() {
                    return None;
                }
                let node = find_in_path("node")?;
                let mut args = vec![script.to_string_lossy().into_owned()];
                args.extend(self.args.iter().cloned());
                Some(BackendCommand::new(node, args))
            }
            Candidate::Home(relative) => {
                let path = dirs::home_dir()?.join(relative);
                is_executable(&path).then(|| BackendCommand::new(path, self.args.clone()))
            }
        }
    }

    fn not_found_message(&self) -> String {
        if self.install_hint.is_empty() {
            format!("{} ({}) not found", self.name, self.executable)
        } else {
            format!(
                "{} ({}) not found. Install: {}",
                self.name, self.executable, self.install_hint
            )
        }
    }
}
