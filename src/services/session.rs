//! JSON-RPC session
//!
//! Owns the workspace → process table for one language and runs the LSP
//! lifecycle on top of `LspProcess`: `initialize`/`initialized` on start,
//! `shutdown`/`exit` on stop, document sync and the feature requests.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};

use super::workspaces::WorkspaceTable;
use crate::error::BackendError;
use crate::events::{BridgeEvent, EventSink};
use crate::infra::jsonrpc::{
    ClientInfo, InitializeParams, JsonRpc, WorkspaceFolderParam, client_capabilities,
};
use crate::infra::{BackendCommand, Launcher, LspProcess};
use crate::models::lsp::{parse_completion, parse_definition, parse_hover};
use crate::models::workspace::path_to_uri;
use crate::models::{
    CompletionList, Hover, LanguageId, Location, Position, ProcessSettings, TextChange,
    WorkspaceFolder,
};

pub struct LspSession {
    language: LanguageId,
    settings: ProcessSettings,
    initialization_options: Option<Value>,
    sink: Arc<dyn EventSink>,
    launcher: Arc<dyn Launcher>,
    processes: Arc<WorkspaceTable<LspProcess>>,
}

impl LspSession {
    pub fn new(
        language: LanguageId,
        settings: ProcessSettings,
        sink: Arc<dyn EventSink>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            language,
            settings,
            initialization_options: None,
            sink,
            launcher,
            processes: Arc::new(WorkspaceTable::new()),
        }
    }

    pub fn with_initialization_options(mut self, options: Option<Value>) -> Self {
        self.initialization_options = options;
        self
    }

    pub fn language(&self) -> &LanguageId {
        &self.language
    }

    /// Start a backend for `workspace`; a no-op if one is already running
    pub async fn start(
        &self,
        command: &BackendCommand,
        workspace: &WorkspaceFolder,
    ) -> Result<(), BackendError> {
        let (_, fresh) = self
            .processes
            .get_or_start(workspace, || self.launch(command, workspace))
            .await?;

        if fresh {
            self.sink.emit(BridgeEvent::Ready {
                language: self.language.clone(),
                workspace: workspace.clone(),
            });
        } else {
            tracing::debug!("{} already running for {}", self.language, workspace);
        }
        Ok(())
    }

    async fn launch(
        &self,
        command: &BackendCommand,
        workspace: &WorkspaceFolder,
    ) -> Result<Arc<LspProcess>, BackendError> {
        let process = LspProcess::new(
            JsonRpc,
            self.language.clone(),
            workspace.clone(),
            self.settings,
            Arc::clone(&self.sink),
        );
        process.start(self.launcher.as_ref(), command).await?;

        if let Err(e) = self.handshake(&process).await {
            tracing::error!("{} handshake failed for {}: {}", self.language, workspace, e);
            process.shutdown().await;
            return Err(e);
        }

        self.processes.evict_on_exit(&process);
        tracing::info!("{} language server ready for {}", self.language, workspace);
        Ok(process)
    }

    async fn handshake(&self, process: &LspProcess) -> Result<(), BackendError> {
        let workspace = process.workspace();
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            client_info: ClientInfo {
                name: "langbridge".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            root_uri: Some(workspace.uri()),
            root_path: Some(workspace.path().to_string_lossy().into_owned()),
            workspace_folders: vec![WorkspaceFolderParam {
                uri: workspace.uri(),
                name: workspace.name(),
            }],
            capabilities: client_capabilities(),
            initialization_options: self.initialization_options.clone(),
        };

        tracing::debug!(
            "Initializing {} with options: {:?}",
            self.language,
            params.initialization_options.is_some()
        );

        process
            .request_with_timeout(
                "initialize",
                Some(serde_json::to_value(params)?),
                self.settings.initialize_timeout,
            )
            .await?;
        process.notify("initialized", Some(json!({}))).await
    }

    /// Stop the backend for `workspace`; a no-op if none is running
    pub async fn stop(&self, workspace: &WorkspaceFolder) -> Result<(), BackendError> {
        let Some(process) = self.processes.take(workspace).await else {
            tracing::debug!("{} not running for {}", self.language, workspace);
            return Ok(());
        };

        if let Err(e) = process
            .request_with_timeout("shutdown", None, self.settings.shutdown_grace)
            .await
        {
            tracing::debug!("{} shutdown request failed: {}", self.language, e);
        }
        // A backend that ignored `shutdown` may still honour `exit`
        let _ = process.notify("exit", None).await;

        process.shutdown().await;
        Ok(())
    }

    /// Stop every workspace, including ones still starting, reporting
    /// success per workspace
    pub async fn stop_all(&self) -> Vec<(WorkspaceFolder, bool)> {
        let mut results = Vec::new();
        for workspace in self.processes.keys().await {
            let stopped = match self.stop(&workspace).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Error stopping {} for {}: {}", self.language, workspace, e);
                    false
                }
            };
            results.push((workspace, stopped));
        }
        results
    }

    pub async fn is_running(&self, workspace: &WorkspaceFolder) -> bool {
        self.processes
            .get(workspace)
            .await
            .is_some_and(|p| p.is_started())
    }

    pub async fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.processes.folders().await
    }

    /// Mapped and started process, or NotRunning
    async fn running(&self, workspace: &WorkspaceFolder) -> Result<Arc<LspProcess>, BackendError> {
        match self.processes.get(workspace).await {
            Some(process) if process.is_started() => Ok(process),
            _ => Err(BackendError::NotRunning {
                language: self.language.clone(),
                workspace: workspace.clone(),
            }),
        }
    }

    // ========================================================================
    // Document sync
    // ========================================================================

    pub async fn did_open(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        text: &str,
        version: i32,
    ) -> Result<(), BackendError> {
        let process = self.running(workspace).await?;
        process
            .notify(
                "textDocument/didOpen",
                Some(json!({
                    "textDocument": {
                        "uri": document_uri(workspace, file),
                        "languageId": self.language.as_str(),
                        "version": version,
                        "text": text
                    }
                })),
            )
            .await
    }

    pub async fn did_change(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        changes: &[TextChange],
        version: i32,
    ) -> Result<(), BackendError> {
        let process = self.running(workspace).await?;
        process
            .notify(
                "textDocument/didChange",
                Some(json!({
                    "textDocument": { "uri": document_uri(workspace, file), "version": version },
                    "contentChanges": changes
                })),
            )
            .await
    }

    pub async fn did_close(&self, workspace: &WorkspaceFolder, file: &Path) -> Result<(), BackendError> {
        let process = self.running(workspace).await?;
        process
            .notify(
                "textDocument/didClose",
                Some(json!({ "textDocument": { "uri": document_uri(workspace, file) } })),
            )
            .await
    }

    // ========================================================================
    // Features
    // ========================================================================

    pub async fn hover(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Hover>, BackendError> {
        let process = self.running(workspace).await?;
        let result = process
            .request(
                "textDocument/hover",
                Some(position_params(workspace, file, position)),
            )
            .await?;
        Ok(parse_hover(result))
    }

    pub async fn completion(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<CompletionList>, BackendError> {
        let process = self.running(workspace).await?;
        let mut params = position_params(workspace, file, position);
        params["context"] = json!({ "triggerKind": 1 });
        let result = process.request("textDocument/completion", Some(params)).await?;
        Ok(parse_completion(result))
    }

    pub async fn definition(
        &self,
        workspace: &WorkspaceFolder,
        file: &Path,
        position: Position,
    ) -> Result<Option<Vec<Location>>, BackendError> {
        let process = self.running(workspace).await?;
        let result = process
            .request(
                "textDocument/definition",
                Some(position_params(workspace, file, position)),
            )
            .await?;
        Ok(parse_definition(result))
    }
}

fn document_uri(workspace: &WorkspaceFolder, file: &Path) -> String {
    path_to_uri(&workspace.resolve(file))
}

fn position_params(workspace: &WorkspaceFolder, file: &Path, position: Position) -> Value {
    json!({
        "textDocument": { "uri": document_uri(workspace, file) },
        "position": position
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{PipeLauncher, RecordingSink, lsp_replies};

    fn session(launcher: &Arc<PipeLauncher>, sink: &Arc<RecordingSink>) -> LspSession {
        session_with(launcher, sink, ProcessSettings::default())
    }

    fn session_with(
        launcher: &Arc<PipeLauncher>,
        sink: &Arc<RecordingSink>,
        settings: ProcessSettings,
    ) -> LspSession {
        LspSession::new(
            LanguageId::GO,
            settings,
            Arc::clone(sink) as Arc<dyn EventSink>,
            Arc::clone(launcher) as Arc<dyn Launcher>,
        )
    }

    fn gopls() -> BackendCommand {
        BackendCommand::new("gopls", Vec::<String>::new())
    }

    fn repo() -> WorkspaceFolder {
        WorkspaceFolder::new("/repo")
    }

    #[tokio::test]
    async fn test_start_completion_stop() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let sink = RecordingSink::new();
        let session = session(&launcher, &sink);

        session.start(&gopls(), &repo()).await.unwrap();
        assert!(session.is_running(&repo()).await);
        sink.wait_for("ready").await;

        let list = session
            .completion(&repo(), Path::new("/repo/main.go"), Position::new(9, 4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list.items[0]["label"], "Println");

        let received = launcher.received(0);
        let initialize = &received[0];
        assert_eq!(initialize["method"], "initialize");
        assert_eq!(initialize["params"]["rootUri"], "file:///repo");
        assert_eq!(initialize["params"]["clientInfo"]["name"], "langbridge");
        assert_eq!(received[1]["method"], "initialized");

        let completion = &received[2];
        assert_eq!(completion["params"]["textDocument"]["uri"], "file:///repo/main.go");
        assert_eq!(completion["params"]["position"], json!({ "line": 9, "character": 4 }));

        session.stop(&repo()).await.unwrap();
        assert!(!session.is_running(&repo()).await);
        assert!(session.workspace_folders().await.is_empty());

        launcher.wait_for_method(0, "exit").await;
        let methods = launcher.methods(0);
        assert_eq!(&methods[methods.len() - 2..], ["shutdown", "exit"]);
    }

    #[tokio::test]
    async fn test_start_twice_spawns_once() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let sink = RecordingSink::new();
        let session = session(&launcher, &sink);

        session.start(&gopls(), &repo()).await.unwrap();
        session.start(&gopls(), &repo()).await.unwrap();

        assert_eq!(launcher.launch_count(), 1);
        let ready = sink.channels().iter().filter(|c| *c == "ready").count();
        assert_eq!(ready, 1);
    }

    #[tokio::test]
    async fn test_concurrent_start_sends_one_handshake() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let sink = RecordingSink::new();
        let session = session(&launcher, &sink);

        let command = gopls();
        let workspace = repo();
        let (a, b) = tokio::join!(
            session.start(&command, &workspace),
            session.start(&command, &workspace)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(launcher.launch_count(), 1);
        let handshakes = launcher
            .methods(0)
            .iter()
            .filter(|m| *m == "initialize")
            .count();
        assert_eq!(handshakes, 1);
    }

    #[tokio::test]
    async fn test_workspaces_are_isolated() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let sink = RecordingSink::new();
        let session = session(&launcher, &sink);
        let other = WorkspaceFolder::new("/other");

        session.start(&gopls(), &repo()).await.unwrap();
        session.start(&gopls(), &other).await.unwrap();
        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(session.workspace_folders().await, vec![other.clone(), repo()]);

        session.stop(&other).await.unwrap();
        assert!(session.is_running(&repo()).await);
        assert!(!session.is_running(&other).await);
    }

    #[tokio::test]
    async fn test_stop_unknown_workspace_is_noop() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let session = session(&launcher, &RecordingSink::new());

        session.stop(&WorkspaceFolder::new("/never")).await.unwrap();
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_feature_on_stopped_workspace_fails_fast() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let session = session(&launcher, &RecordingSink::new());

        let err = session
            .hover(&repo(), Path::new("main.go"), Position::new(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotRunning { .. }));

        let err = session
            .did_open(&repo(), Path::new("main.go"), "package main", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn test_external_kill_rejects_and_self_heals() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(|message| {
            if message["method"] == "textDocument/hover" {
                None
            } else {
                lsp_replies(message)
            }
        }));
        let sink = RecordingSink::new();
        let session = Arc::new(session(&launcher, &sink));
        session.start(&gopls(), &repo()).await.unwrap();

        let hover = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .hover(&repo(), Path::new("main.go"), Position::new(2, 1))
                    .await
            })
        };
        launcher.wait_for_method(0, "textDocument/hover").await;
        launcher.kill(0);

        let err = hover.await.unwrap().unwrap_err();
        assert!(matches!(err, BackendError::ProcessExited { .. }));
        assert!(err.to_string().contains("exited"));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !session.workspace_folders().await.is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "entry never removed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!session.is_running(&repo()).await);

        session.start(&gopls(), &repo()).await.unwrap();
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_entry() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        launcher.set_failing(true);
        let session = session(&launcher, &RecordingSink::new());

        let err = session.start(&gopls(), &repo()).await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
        assert!(session.workspace_folders().await.is_empty());

        launcher.set_failing(false);
        session.start(&gopls(), &repo()).await.unwrap();
        assert!(session.is_running(&repo()).await);
    }

    #[tokio::test]
    async fn test_failed_handshake_tears_down() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(|message| {
            if message["method"] == "initialize" {
                None
            } else {
                lsp_replies(message)
            }
        }));
        let sink = RecordingSink::new();
        let settings = ProcessSettings {
            initialize_timeout: Duration::from_millis(50),
            ..ProcessSettings::default()
        };
        let session = session_with(&launcher, &sink, settings);

        let err = session.start(&gopls(), &repo()).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
        assert!(!session.is_running(&repo()).await);
        assert!(!sink.channels().iter().any(|c| c == "ready"));
    }

    #[tokio::test]
    async fn test_stop_all_reports_each_workspace() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let session = session(&launcher, &RecordingSink::new());
        session.start(&gopls(), &repo()).await.unwrap();
        session.start(&gopls(), &WorkspaceFolder::new("/lib")).await.unwrap();

        let results = session.stop_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, stopped)| *stopped));
        assert!(session.workspace_folders().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_stops_a_start_in_progress() {
        let launcher = Arc::new(PipeLauncher::json_rpc());
        let session = Arc::new(session(&launcher, &RecordingSink::new()));

        let start = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.start(&gopls(), &repo()).await })
        };
        let mut backend = launcher.next_backend().await;
        let initialize = backend.read_message().await.unwrap();
        assert_eq!(initialize["method"], "initialize");

        let stop_all = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.stop_all().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stop_all.is_finished());

        backend
            .send(&json!({ "jsonrpc": "2.0", "id": initialize["id"], "result": { "capabilities": {} } }))
            .await;
        start.await.unwrap().unwrap();
        assert_eq!(backend.read_message().await.unwrap()["method"], "initialized");

        let shutdown = backend.read_message().await.unwrap();
        assert_eq!(shutdown["method"], "shutdown");
        backend
            .send(&json!({ "jsonrpc": "2.0", "id": shutdown["id"], "result": null }))
            .await;
        assert_eq!(backend.read_message().await.unwrap()["method"], "exit");

        let results = stop_all.await.unwrap();
        assert_eq!(results, vec![(repo(), true)]);
        assert!(!session.is_running(&repo()).await);
        assert!(session.workspace_folders().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_sends_exit_when_shutdown_unanswered() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(|message| {
            if message["method"] == "shutdown" {
                None
            } else {
                lsp_replies(message)
            }
        }));
        let settings = ProcessSettings {
            shutdown_grace: Duration::from_millis(50),
            ..ProcessSettings::default()
        };
        let session = session_with(&launcher, &RecordingSink::new(), settings);
        session.start(&gopls(), &repo()).await.unwrap();

        session.stop(&repo()).await.unwrap();
        assert!(!session.is_running(&repo()).await);

        launcher.wait_for_method(0, "exit").await;
        let methods = launcher.methods(0);
        assert_eq!(&methods[methods.len() - 2..], ["shutdown", "exit"]);
    }

    #[tokio::test]
    async fn test_did_change_sends_ranged_edits() {
        let launcher = Arc::new(PipeLauncher::serving_json_rpc(lsp_replies));
        let session = session(&launcher, &RecordingSink::new());
        session.start(&gopls(), &repo()).await.unwrap();

        let change = TextChange::ranged(
            crate::models::Range::new(Position::new(1, 0), Position::new(1, 3)),
            "var",
        );
        session
            .did_change(&repo(), Path::new("main.go"), &[change], 2)
            .await
            .unwrap();

        launcher.wait_for_method(0, "textDocument/didChange").await;
        let received = launcher.received(0);
        let message = received.last().unwrap();
        assert_eq!(message["params"]["textDocument"]["version"], 2);
        assert_eq!(message["params"]["contentChanges"][0]["text"], "var");
        assert_eq!(
            message["params"]["contentChanges"][0]["range"]["end"],
            json!({ "line": 1, "character": 3 })
        );
    }
}
