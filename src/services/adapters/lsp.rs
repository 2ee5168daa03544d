//! Adapter for backends speaking standard JSON-RPC LSP

use std::path::Path;

use async_trait::async_trait;

use super::{BackendSpec, LanguageAdapter};
use crate::error::BackendError;
use crate::models::{
    CompletionList, Hover, LanguageId, Location, Position, TextChange, WorkspaceFolder,
};
use crate::services::session::LspSession;

pub struct LspAdapter {
    spec: BackendSpec,
    session: LspSession,
}

impl LspAdapter {
    pub fn new(spec: BackendSpec, session: LspSession) -> Self {
        Self { spec, session }
    }
}

#[async_trait]
impl LanguageAdapter for LspAdapter {
    fn language(&self) -> &LanguageId {
        &self.spec.language
    }

    fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    async fn start(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError> {
        if self.session.is_running(workspace).await {
            return Ok(());
        }
        let command = self.spec.resolve(Some(workspace))?;
        self.session.start(&command, workspace).await
    }

    async fn stop(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError> {
        self.session.stop(workspace).await
    }

    async fn stop_all(&self) -> Vec<(WorkspaceFolder, bool)> {
        self.session.stop_all().await
    }

    async fn is_running(&self, workspace: &WorkspaceFolder) -> bool {
        self.session.is_running(workspace).await
    }

    async fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.session.workspace_folders().await
    }

    async fn hover(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Hover>, BackendError> {
        self.session.hover(workspace, file, position).await
    }

    async fn completion(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<CompletionList>, BackendError> {
        self.session.completion(workspace, file, position).await
    }

    async fn definition(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Vec<Location>>, BackendError> {
        self.session.definition(workspace, file, position).await
    }

    async fn did_open(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        text: &str,
        version: i32,
    ) -> Result<(), BackendError> {
        self.session.did_open(workspace, file, text, version).await
    }

    async fn did_change(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        changes: &[TextChange],
        version: i32,
    ) -> Result<(), BackendError> {
        self.session.did_change(workspace, file, changes, version).await
    }

    async fn did_close(&self, workspace: &WorkspaceFolder, file: &Path) -> Result<(), BackendError> {
        self.session.did_close(workspace, file).await
    }
}
