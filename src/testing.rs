//! In-memory backends for tests
//!
//! `PipeLauncher` hands out `tokio::io::duplex` pipes instead of child
//! processes. The far end is a `FakeBackend` that tests drive by hand, or
//! that the launcher serves automatically with a reply handler.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::error::BackendError;
use crate::events::{BridgeEvent, EventSink};
use crate::infra::framing::{FrameDecoder, Framing};
use crate::infra::launcher::{BackendCommand, BackendIo, Launcher};
use crate::models::{LanguageId, WorkspaceFolder};

const PIPE_CAPACITY: usize = 64 * 1024;
const WAIT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    JsonRpc,
    TsServer,
}

/// Reply handler: `Some(result)` answers the request, `None` stays silent
pub(crate) type Handler = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

// ============================================================================
// Launcher
// ============================================================================

pub(crate) struct PipeLauncher {
    dialect: Dialect,
    handler: Option<Handler>,
    launches: AtomicUsize,
    failing: AtomicBool,
    backends_tx: mpsc::UnboundedSender<FakeBackend>,
    backends_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeBackend>>,
    served: Mutex<Vec<ServedBackend>>,
    commands: Mutex<Vec<BackendCommand>>,
}

impl PipeLauncher {
    fn with(dialect: Dialect, handler: Option<Handler>) -> Self {
        let (backends_tx, backends_rx) = mpsc::unbounded_channel();
        Self {
            dialect,
            handler,
            launches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            backends_tx,
            backends_rx: tokio::sync::Mutex::new(backends_rx),
            served: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Backends are handed to the test through `next_backend`
    pub fn json_rpc() -> Self {
        Self::with(Dialect::JsonRpc, None)
    }

    pub fn tsserver() -> Self {
        Self::with(Dialect::TsServer, None)
    }

    /// Backends answer every request with `handler`
    pub fn serving_json_rpc(handler: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self::with(Dialect::JsonRpc, Some(Arc::new(handler)))
    }

    pub fn serving_tsserver(handler: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self::with(Dialect::TsServer, Some(Arc::new(handler)))
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<BackendCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub async fn next_backend(&self) -> FakeBackend {
        let mut rx = self.backends_rx.lock().await;
        tokio::time::timeout(WAIT_LIMIT, rx.recv())
            .await
            .expect("no backend launched")
            .expect("launcher dropped")
    }

    /// Messages received so far by the `index`-th served backend
    pub fn received(&self, index: usize) -> Vec<Value> {
        self.served.lock().unwrap()[index].received.lock().unwrap().clone()
    }

    /// Method (or tsserver command) names received by a served backend
    pub fn methods(&self, index: usize) -> Vec<String> {
        self.received(index)
            .iter()
            .filter_map(|m| m.get("method").or_else(|| m.get("command")))
            .filter_map(|m| m.as_str().map(str::to_string))
            .collect()
    }

    /// Wait until a served backend has received `method`
    pub async fn wait_for_method(&self, index: usize, method: &str) {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while !self.methods(index).iter().any(|m| m == method) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "backend {} never received {}",
                index,
                method
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Simulate the `index`-th served backend dying
    pub fn kill(&self, index: usize) {
        self.served.lock().unwrap()[index].task.abort();
    }
}

impl Launcher for PipeLauncher {
    fn launch(
        &self,
        language: &LanguageId,
        command: &BackendCommand,
        _workspace: &WorkspaceFolder,
    ) -> Result<BackendIo, BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Spawn {
                language: language.clone(),
                message: format!("{}: No such file or directory", command.program.display()),
            });
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().unwrap().push(command.clone());

        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let (reader, writer) = tokio::io::split(client);
        let backend = FakeBackend::new(self.dialect, server);

        match &self.handler {
            Some(handler) => {
                let served = backend.serve(Arc::clone(handler));
                self.served.lock().unwrap().push(served);
            }
            None => {
                let _ = self.backends_tx.send(backend);
            }
        }

        Ok(BackendIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
            stderr: None,
            child: None,
        })
    }
}

// ============================================================================
// Fake backend
// ============================================================================

pub(crate) struct FakeBackend {
    dialect: Dialect,
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    decoder: FrameDecoder,
}

pub(crate) struct ServedBackend {
    received: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    fn new(dialect: Dialect, stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            dialect,
            reader: BufReader::new(reader),
            writer,
            decoder: FrameDecoder::new(Framing::ContentLength),
        }
    }

    /// Next message written by the bridge, `None` once it closed stdin
    pub async fn read_message(&mut self) -> Option<Value> {
        match self.dialect {
            Dialect::JsonRpc => loop {
                if let Some(frame) = self.decoder.next_frame() {
                    return frame.ok();
                }
                let mut chunk = [0u8; 4096];
                let n = self.reader.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                self.decoder.extend(&chunk[..n]);
            },
            Dialect::TsServer => loop {
                let mut line = String::new();
                let n = self.reader.read_line(&mut line).await.ok()?;
                if n == 0 {
                    return None;
                }
                if !line.trim().is_empty() {
                    return serde_json::from_str(line.trim()).ok();
                }
            },
        }
    }

    pub async fn send(&mut self, message: &Value) {
        let bytes = match self.dialect {
            Dialect::JsonRpc => Framing::encode(&message.to_string()),
            Dialect::TsServer => {
                let body = format!("{}\n", message);
                format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
            }
        };
        // The bridge may already be gone
        let _ = self.writer.write_all(&bytes).await;
        let _ = self.writer.flush().await;
    }

    fn serve(mut self, handler: Handler) -> ServedBackend {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        let task = tokio::spawn(async move {
            while let Some(message) = self.read_message().await {
                log.lock().unwrap().push(message.clone());
                let Some(result) = handler(&message) else {
                    continue;
                };
                let reply = match self.dialect {
                    Dialect::JsonRpc => match message.get("id") {
                        Some(id) if message.get("method").is_some() => {
                            json!({ "jsonrpc": "2.0", "id": id, "result": result })
                        }
                        _ => continue,
                    },
                    Dialect::TsServer => json!({
                        "seq": 0,
                        "type": "response",
                        "command": message["command"],
                        "request_seq": message["seq"],
                        "success": true,
                        "body": result,
                    }),
                };
                self.send(&reply).await;
            }
        });

        ServedBackend { received, task }
    }
}

/// Replies like a cooperative language server
pub(crate) fn lsp_replies(message: &Value) -> Option<Value> {
    message.get("id")?;
    let result = match message.get("method")?.as_str()? {
        "initialize" => json!({ "capabilities": { "hoverProvider": true } }),
        "textDocument/hover" => json!({ "contents": { "kind": "markdown", "value": "func main()" } }),
        "textDocument/completion" => json!({
            "isIncomplete": false,
            "items": [{ "label": "Println", "kind": 3 }]
        }),
        "textDocument/definition" => json!({
            "uri": "file:///repo/main.go",
            "range": {
                "start": { "line": 4, "character": 5 },
                "end": { "line": 4, "character": 9 }
            }
        }),
        _ => Value::Null,
    };
    Some(result)
}

/// Replies like tsserver; fire-and-forget commands get nothing
pub(crate) fn tsserver_replies(message: &Value) -> Option<Value> {
    match message.get("command")?.as_str()? {
        "configure" => Some(Value::Null),
        "quickinfo" => Some(json!({
            "kind": "const",
            "displayString": "const answer: 42",
            "documentation": "",
            "start": { "line": 1, "offset": 7 },
            "end": { "line": 1, "offset": 13 }
        })),
        "completionInfo" => Some(json!({
            "isIncomplete": false,
            "entries": [{ "name": "answer", "kind": "const", "sortText": "11" }]
        })),
        "definition" => Some(json!([{
            "file": "/repo/src/answer.ts",
            "start": { "line": 1, "offset": 14 },
            "end": { "line": 1, "offset": 20 }
        }])),
        _ => None,
    }
}

// ============================================================================
// Event sink
// ============================================================================

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<BridgeEvent>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.events().iter().map(BridgeEvent::channel).collect()
    }

    /// First event on `channel`, waiting for it to arrive
    pub async fn wait_for(&self, channel: &str) -> BridgeEvent {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.events().into_iter().find(|e| e.channel() == channel) {
                return event;
            }
            tokio::time::timeout_at(deadline, notified)
                .await
                .unwrap_or_else(|_| panic!("no '{}' event within {:?}", channel, WAIT_LIMIT));
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: BridgeEvent) {
        self.events.lock().unwrap().push(event);
        self.notify.notify_waiters();
    }
}
