//! TypeScript via tsserver
//!
//! tsserver does not speak LSP, so this adapter owns its processes directly
//! and translates document sync and feature calls into tsserver commands.
//! Diagnostics are not pushed: `geterr` is issued after every open and
//! change, and the resulting events flow through the process's allow-list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{BackendSpec, Candidate, LanguageAdapter};
use crate::error::BackendError;
use crate::events::{BridgeEvent, EventSink};
use crate::infra::tsserver::{
    TsServer, change_args, completion_from_info, definition_locations, file_arg,
    hover_from_quickinfo, location_args,
};
use crate::infra::{Launcher, TsServerProcess};
use crate::models::{
    CompletionList, Hover, LanguageId, Location, Position, ProcessSettings, TextChange,
    WorkspaceFolder,
};
use crate::services::workspaces::WorkspaceTable;

/// tsserver's reply when there is nothing under the cursor
const NO_CONTENT: &str = "No content available";

pub fn tsserver() -> BackendSpec {
    BackendSpec::new(LanguageId::TYPESCRIPT, "tsserver", "tsserver")
        .candidates(vec![
            Candidate::NodeScript("node_modules/typescript/lib/tsserver.js"),
            Candidate::Local("node_modules/.bin/tsserver"),
        ])
        .install_hint("npm install -g typescript")
}

pub struct TsServerAdapter {
    spec: BackendSpec,
    settings: ProcessSettings,
    sink: Arc<dyn EventSink>,
    launcher: Arc<dyn Launcher>,
    processes: Arc<WorkspaceTable<TsServerProcess>>,
}

impl TsServerAdapter {
    pub fn new(
        spec: BackendSpec,
        settings: ProcessSettings,
        sink: Arc<dyn EventSink>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            spec,
            settings,
            sink,
            launcher,
            processes: Arc::new(WorkspaceTable::new()),
        }
    }

    async fn launch(&self, workspace: &WorkspaceFolder) -> Result<Arc<TsServerProcess>, BackendError> {
        let command = self.spec.resolve(Some(workspace))?;
        let process = TsServerProcess::new(
            TsServer,
            self.spec.language.clone(),
            workspace.clone(),
            self.settings,
            Arc::clone(&self.sink),
        );
        process.start(self.launcher.as_ref(), &command).await?;

        let configure = process
            .request_with_timeout(
                "configure",
                Some(json!({
                    "hostInfo": "langbridge",
                    "preferences": {
                        "includeCompletionsForModuleExports": true,
                        "includeCompletionsWithInsertText": true
                    }
                })),
                self.settings.initialize_timeout,
            )
            .await;
        if let Err(e) = configure {
            tracing::error!("tsserver configure failed for {}: {}", workspace, e);
            process.shutdown().await;
            return Err(e);
        }

        self.processes.evict_on_exit(&process);
        tracing::info!("tsserver ready for {}", workspace);
        Ok(process)
    }

    async fn running(&self, workspace: &WorkspaceFolder) -> Result<Arc<TsServerProcess>, BackendError> {
        match self.processes.get(workspace).await {
            Some(process) if process.is_started() => Ok(process),
            _ => Err(BackendError::NotRunning {
                language: self.spec.language.clone(),
                workspace: workspace.clone(),
            }),
        }
    }

    /// Ask for diagnostics; results arrive as events
    async fn request_diagnostics(process: &TsServerProcess, file: &Path) -> Result<(), BackendError> {
        process
            .notify("geterr", Some(json!({ "files": [file_arg(file)], "delay": 0 })))
            .await
    }
}

fn script_kind(file: &Path) -> &'static str {
    match file.extension().and_then(|e| e.to_str()) {
        Some("tsx") => "TSX",
        Some("js" | "mjs" | "cjs") => "JS",
        Some("jsx") => "JSX",
        _ => "TS",
    }
}

fn absolute(workspace: &WorkspaceFolder, file: &Path) -> PathBuf {
    workspace.resolve(file)
}

#[async_trait]
impl LanguageAdapter for TsServerAdapter {
    fn language(&self) -> &LanguageId {
        &self.spec.language
    }

    fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    async fn start(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError> {
        let (_, fresh) = self
            .processes
            .get_or_start(workspace, || self.launch(workspace))
            .await?;
        if fresh {
            self.sink.emit(BridgeEvent::Ready {
                language: self.spec.language.clone(),
                workspace: workspace.clone(),
            });
        }
        Ok(())
    }

    async fn stop(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError> {
        let Some(process) = self.processes.take(workspace).await else {
            tracing::debug!("tsserver not running for {}", workspace);
            return Ok(());
        };
        if let Err(e) = process.notify("exit", None).await {
            tracing::debug!("tsserver exit command failed: {}", e);
        }
        process.shutdown().await;
        Ok(())
    }

    async fn stop_all(&self) -> Vec<(WorkspaceFolder, bool)> {
        let mut results = Vec::new();
        for workspace in self.processes.keys().await {
            let stopped = self.stop(&workspace).await.is_ok();
            results.push((workspace, stopped));
        }
        results
    }

    async fn is_running(&self, workspace: &WorkspaceFolder) -> bool {
        self.processes
            .get(workspace)
            .await
            .is_some_and(|p| p.is_started())
    }

    async fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.processes.folders().await
    }

    async fn hover(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Hover>, BackendError> {
        let process = self.running(workspace).await?;
        let args = location_args(&absolute(workspace, file), position);
        match process.request("quickinfo", Some(args)).await {
            Ok(body) => Ok(hover_from_quickinfo(body)),
            Err(BackendError::Server { message, .. }) if message.contains(NO_CONTENT) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn completion(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<CompletionList>, BackendError> {
        let process = self.running(workspace).await?;
        let mut args = location_args(&absolute(workspace, file), position);
        args["includeExternalModuleExports"] = json!(true);
        args["includeInsertTextCompletions"] = json!(true);
        let body = process.request("completionInfo", Some(args)).await?;
        Ok(completion_from_info(body))
    }

    async fn definition(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Vec<Location>>, BackendError> {
        let process = self.running(workspace).await?;
        let args = location_args(&absolute(workspace, file), position);
        let body = process.request("definition", Some(args)).await?;
        Ok(definition_locations(body))
    }

    async fn did_open(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        text: &str,
        _version: i32,
    ) -> Result<(), BackendError> {
        let process = self.running(workspace).await?;
        let file = absolute(workspace, file);
        process
            .notify(
                "open",
                Some(json!({
                    "file": file_arg(&file),
                    "fileContent": text,
                    "scriptKindName": script_kind(&file),
                    "projectRootPath": file_arg(workspace.path())
                })),
            )
            .await?;
        Self::request_diagnostics(&process, &file).await
    }

    async fn did_change(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        changes: &[TextChange],
        _version: i32,
    ) -> Result<(), BackendError> {
        let process = self.running(workspace).await?;
        let file = absolute(workspace, file);
        for change in changes {
            process.notify("change", Some(change_args(&file, change))).await?;
        }
        Self::request_diagnostics(&process, &file).await
    }

    async fn did_close(&self, workspace: &WorkspaceFolder, file: &Path) -> Result<(), BackendError> {
        let process = self.running(workspace).await?;
        let file = absolute(workspace, file);
        process
            .notify("close", Some(json!({ "file": file_arg(&file) })))
            .await
    }
}
