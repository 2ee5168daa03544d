//! Host-facing command surface
//!
//! Routes each call to the adapter registered for its language. Unknown
//! languages are logged; read-only calls then return a safe default and
//! lifecycle calls fail with `UnknownLanguage`. Document sync is
//! fire-and-forget: failures are logged and never reach the host.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;

use super::adapters::LanguageAdapter;
use super::registry::Registry;
use crate::error::BackendError;
use crate::models::{
    CompletionList, Hover, LanguageId, Location, Position, TextChange, WorkspaceFolder,
};

pub struct Bridge {
    registry: Registry,
}

impl Bridge {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn adapter(&self, language: &LanguageId) -> Option<Arc<dyn LanguageAdapter>> {
        let adapter = self.registry.get(language);
        if adapter.is_none() {
            tracing::warn!("No adapter registered for language: {}", language);
        }
        adapter
    }

    fn require(&self, language: &LanguageId) -> Result<Arc<dyn LanguageAdapter>, BackendError> {
        self.adapter(language)
            .ok_or_else(|| BackendError::UnknownLanguage(language.clone()))
    }

    pub async fn start(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
    ) -> Result<bool, BackendError> {
        self.require(language)?.start(workspace).await?;
        Ok(true)
    }

    pub async fn stop(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
    ) -> Result<bool, BackendError> {
        self.require(language)?.stop(workspace).await?;
        Ok(true)
    }

    pub async fn is_running(&self, workspace: &WorkspaceFolder, language: &LanguageId) -> bool {
        match self.adapter(language) {
            Some(adapter) => adapter.is_running(workspace).await,
            None => false,
        }
    }

    pub async fn hover(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
        file: &Path,
        position: Position,
    ) -> Result<Option<Hover>, BackendError> {
        match self.adapter(language) {
            Some(adapter) => adapter.hover(workspace, file, position).await,
            None => Ok(None),
        }
    }

    pub async fn completion(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
        file: &Path,
        position: Position,
    ) -> Result<Option<CompletionList>, BackendError> {
        match self.adapter(language) {
            Some(adapter) => adapter.completion(workspace, file, position).await,
            None => Ok(None),
        }
    }

    pub async fn definition(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
        file: &Path,
        position: Position,
    ) -> Result<Option<Vec<Location>>, BackendError> {
        match self.adapter(language) {
            Some(adapter) => adapter.definition(workspace, file, position).await,
            None => Ok(None),
        }
    }

    pub async fn did_open(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
        file: &Path,
        text: &str,
        version: i32,
    ) {
        if let Some(adapter) = self.adapter(language) {
            log_sync_failure(
                "didOpen",
                file,
                adapter.did_open(workspace, file, text, version).await,
            );
        }
    }

    pub async fn did_change(
        &self,
        workspace: &WorkspaceFolder,
        language: &LanguageId,
        file: &Path,
        changes: &[TextChange],
        version: i32,
    ) {
        if let Some(adapter) = self.adapter(language) {
            log_sync_failure(
                "didChange",
                file,
                adapter.did_change(workspace, file, changes, version).await,
            );
        }
    }

    pub async fn did_close(&self, workspace: &WorkspaceFolder, language: &LanguageId, file: &Path) {
        if let Some(adapter) = self.adapter(language) {
            log_sync_failure("didClose", file, adapter.did_close(workspace, file).await);
        }
    }

    /// Stop every backend of every language
    pub async fn shutdown_all(&self) -> Vec<(LanguageId, WorkspaceFolder, bool)> {
        let adapters = self.registry.all();
        let results = join_all(adapters.iter().map(|adapter| async move {
            let language = adapter.language().clone();
            adapter
                .stop_all()
                .await
                .into_iter()
                .map(|(workspace, stopped)| (language.clone(), workspace, stopped))
                .collect::<Vec<_>>()
        }))
        .await;

        let results: Vec<_> = results.into_iter().flatten().collect();
        tracing::info!("Stopped {} backend(s)", results.len());
        results
    }
}

fn log_sync_failure(operation: &str, file: &Path, result: Result<(), BackendError>) {
    match result {
        Ok(()) => {}
        Err(e @ BackendError::NotRunning { .. }) => {
            tracing::debug!("{} for {} ignored: {}", operation, file.display(), e)
        }
        Err(e) => tracing::warn!("{} for {} failed: {}", operation, file.display(), e),
    }
}
