//! Backend protocol process
//!
//! One `ProtocolProcess` owns one running backend: a supervisor task that
//! holds the child, the stdin writer, a reader task that drains stdout
//! through a `FrameDecoder`, and the table of requests awaiting a response. The wire dialect is
//! supplied by a `WireProtocol` (JSON-RPC or tsserver), so correlation,
//! timeouts and teardown are written once.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::timeout;

use super::framing::{FrameDecoder, Framing};
use super::launcher::{BackendCommand, BackendIo, Launcher};
use crate::error::BackendError;
use crate::events::{BridgeEvent, EventSink};
use crate::models::{LanguageId, ProcessSettings, WorkspaceFolder};

const READ_CHUNK: usize = 16 * 1024;
/// How long a dead child's stdout may keep draining before teardown
const EXIT_DRAIN: Duration = Duration::from_millis(100);

/// Wire dialect of a backend
pub trait WireProtocol: Send + Sync + 'static {
    fn framing(&self) -> Framing;

    /// Serialize an outbound message for the backend's stdin
    fn encode(&self, message: &Value) -> Vec<u8>;

    fn request(&self, id: u64, method: &str, params: Option<Value>) -> Value;

    /// Fire-and-forget message; `seq` is only used by dialects that number
    /// every message
    fn notification(&self, seq: u64, method: &str, params: Option<Value>) -> Value;

    fn classify(&self, message: &Value) -> Incoming;
}

/// Classified inbound message
#[derive(Debug)]
pub enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, BackendError>,
    },
    /// Backend-initiated traffic; `reply` is written back when present
    Notification {
        notices: Vec<Notice>,
        reply: Option<Value>,
    },
    Ignored,
}

/// One notification forwarded to the event sink
#[derive(Debug, Clone)]
pub struct Notice {
    pub method: String,
    /// Message in JSON-RPC notification shape
    pub message: Value,
    pub params: Value,
}

type PendingRequest = oneshot::Sender<Result<Value, BackendError>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;
/// Asks the supervisor to terminate the child; acknowledged once reaped
type StopSignal = oneshot::Sender<oneshot::Sender<()>>;

pub struct ProtocolProcess<P: WireProtocol> {
    protocol: P,
    language: LanguageId,
    workspace: WorkspaceFolder,
    settings: ProcessSettings,
    sink: Arc<dyn EventSink>,
    supervisor: Mutex<Option<StopSignal>>,
    writer: Mutex<Option<Writer>>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    started: AtomicBool,
    shutting_down: AtomicBool,
    closed: watch::Sender<bool>,
}

impl<P: WireProtocol> ProtocolProcess<P> {
    pub fn new(
        protocol: P,
        language: LanguageId,
        workspace: WorkspaceFolder,
        settings: ProcessSettings,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            language,
            workspace,
            settings,
            sink,
            supervisor: Mutex::new(None),
            writer: Mutex::new(None),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            closed: watch::Sender::new(false),
        })
    }

    /// Launch the backend; a second call on a started instance is a no-op
    pub async fn start(
        self: &Arc<Self>,
        launcher: &dyn Launcher,
        command: &BackendCommand,
    ) -> Result<(), BackendError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let io = match launcher.launch(&self.language, command, &self.workspace) {
            Ok(io) => io,
            Err(e) => {
                self.started.store(false, Ordering::Release);
                return Err(e);
            }
        };

        self.attach(io).await;
        Ok(())
    }

    async fn attach(self: &Arc<Self>, io: BackendIo) {
        let BackendIo {
            reader,
            writer,
            stderr,
            child,
        } = io;

        self.shutting_down.store(false, Ordering::Release);
        *self.writer.lock().await = Some(writer);
        self.closed.send_replace(false);

        if let Some(child) = child {
            let (stop, stopped) = oneshot::channel();
            *self.supervisor.lock().await = Some(stop);
            tokio::spawn(supervise(
                Arc::downgrade(self),
                child,
                stopped,
                self.language.clone(),
                self.settings.shutdown_grace,
            ));
        }

        let process = Arc::clone(self);
        tokio::spawn(async move {
            process.read_loop(reader).await;
        });

        if let Some(stderr) = stderr {
            tokio::spawn(relay_stderr(self.language.clone(), stderr));
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn language(&self) -> &LanguageId {
        &self.language
    }

    pub fn workspace(&self) -> &WorkspaceFolder {
        &self.workspace
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Resolves once the backend has exited or been shut down
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Send a request and wait for its response with the default timeout
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, BackendError> {
        self.request_with_timeout(method, params, self.settings.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<Value, BackendError> {
        if !self.is_started() {
            return Err(self.not_running());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        tracing::trace!("{} request {}: {}", self.language, id, method);

        let message = self.protocol.request(id, method, params);
        if let Err(e) = self.write(&message).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match timeout(limit, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.exited("request abandoned")),
            Err(_) => {
                // Whoever removes the entry first settles the request
                if self.pending.lock().await.remove(&id).is_some() {
                    tracing::debug!(
                        "{} '{}' (id {}) timed out after {}ms",
                        self.language,
                        method,
                        id,
                        limit.as_millis()
                    );
                    Err(BackendError::Timeout {
                        language: self.language.clone(),
                        method: method.to_string(),
                        after: limit,
                    })
                } else {
                    rx.await
                        .unwrap_or_else(|_| Err(self.exited("request abandoned")))
                }
            }
        }
    }

    /// Send a message that expects no response
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BackendError> {
        if !self.is_started() {
            return Err(self.not_running());
        }

        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = self.protocol.notification(seq, method, params);
        self.write(&message).await
    }

    async fn write(&self, message: &Value) -> Result<(), BackendError> {
        tracing::trace!("{} -> {}", self.language, message);
        let bytes = self.protocol.encode(message);

        let written = {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or_else(|| self.not_running())?;
            match writer.write_all(&bytes).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };

        // A broken stdin means the backend is gone even if stdout is
        // still held open
        if let Err(e) = written {
            let reason = format!("write failed: {}", e);
            self.handle_exit(&reason).await;
            return Err(self.exited(&reason));
        }
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut reader: Box<dyn AsyncRead + Send + Unpin>) {
        let mut decoder = FrameDecoder::new(self.protocol.framing());
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut closed = self.closed.subscribe();

        let reason = loop {
            let read = tokio::select! {
                read = reader.read(&mut chunk) => read,
                // Torn down elsewhere; stdout may belong to a stray descendant
                _ = closed.wait_for(|closed| *closed) => return,
            };
            match read {
                Ok(0) => break "stdout closed".to_string(),
                Ok(n) => {
                    decoder.extend(&chunk[..n]);
                    while let Some(frame) = decoder.next_frame() {
                        match frame {
                            Ok(message) => self.dispatch(message).await,
                            Err(e) => tracing::warn!("{} {}", self.language, e),
                        }
                    }
                }
                Err(e) => break format!("read error: {}", e),
            }
        };

        self.handle_exit(&reason).await;
    }

    async fn dispatch(self: &Arc<Self>, message: Value) {
        match self.protocol.classify(&message) {
            Incoming::Ignored => {
                tracing::trace!("{} ignored message", self.language);
            }
            Incoming::Response { id, outcome } => {
                let sender = self.pending.lock().await.remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => tracing::debug!(
                        "{} response for unknown request {} (may have timed out)",
                        self.language,
                        id
                    ),
                }
                self.emit_data(message);
            }
            Incoming::Notification { notices, reply } => {
                self.emit_data(message);

                for notice in notices {
                    self.sink.emit(BridgeEvent::Notification {
                        message: notice.message,
                        language: self.language.clone(),
                        workspace: self.workspace.clone(),
                    });
                    self.sink.emit(BridgeEvent::Method {
                        method: notice.method,
                        params: notice.params,
                        language: self.language.clone(),
                        workspace: self.workspace.clone(),
                    });
                }

                // Written off the reader task so a full stdin pipe cannot
                // stop stdout from draining
                if let Some(reply) = reply {
                    let process = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Err(e) = process.write(&reply).await {
                            tracing::debug!("{} reply failed: {}", process.language, e);
                        }
                    });
                }
            }
        }
    }

    fn emit_data(&self, message: Value) {
        self.sink.emit(BridgeEvent::Data {
            message,
            language: self.language.clone(),
            workspace: self.workspace.clone(),
        });
    }

    /// Tear down after the backend went away; only the first caller acts
    async fn handle_exit(&self, reason: &str) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.writer.lock().await.take();

        // Reaping happens on the supervisor; nothing to wait for here
        if let Some(stop) = self.supervisor.lock().await.take() {
            let (ack, _) = oneshot::channel();
            let _ = stop.send(ack);
        }

        if !self.shutting_down.load(Ordering::Acquire) {
            tracing::warn!(
                "{} backend for {} exited: {}",
                self.language,
                self.workspace,
                reason
            );
        }

        self.reject_pending(|| self.exited(reason)).await;
        self.closed.send_replace(true);
    }

    /// Kill the backend: graceful signal first, forced kill after the grace
    /// window. Outstanding requests are rejected with a shutdown error.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.started.store(false, Ordering::Release);

        self.reject_pending(|| BackendError::Shutdown {
            language: self.language.clone(),
        })
        .await;

        // Closing stdin is the first hint for well-behaved servers
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        let stop = self.supervisor.lock().await.take();
        if let Some(stop) = stop {
            let (ack, done) = oneshot::channel();
            if stop.send(ack).is_ok() {
                let _ = done.await;
            }
        }

        self.closed.send_replace(true);
        tracing::info!("{} backend for {} stopped", self.language, self.workspace);
    }

    async fn reject_pending(&self, error: impl Fn() -> BackendError) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!(
                "Rejecting {} pending {} requests",
                pending.len(),
                self.language
            );
        }
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(error()));
        }
    }

    fn not_running(&self) -> BackendError {
        BackendError::NotRunning {
            language: self.language.clone(),
            workspace: self.workspace.clone(),
        }
    }

    fn exited(&self, reason: &str) -> BackendError {
        BackendError::ProcessExited {
            language: self.language.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Owns the child: reports an exit nobody asked for, terminates on request.
/// Dropping the stop signal counts as a request.
async fn supervise<P: WireProtocol>(
    process: Weak<ProtocolProcess<P>>,
    mut child: Child,
    stop: oneshot::Receiver<oneshot::Sender<()>>,
    language: LanguageId,
    grace: Duration,
) {
    tokio::select! {
        status = child.wait() => {
            let reason = match status {
                Ok(status) => format!("process exited ({})", status),
                Err(e) => format!("wait error: {}", e),
            };
            if let Some(process) = process.upgrade() {
                // Let the reader pick up what was written before the exit
                let _ = timeout(EXIT_DRAIN, process.closed()).await;
                process.handle_exit(&reason).await;
            }
        }
        ack = stop => {
            terminate(&language, &mut child, grace).await;
            if let Ok(ack) = ack {
                let _ = ack.send(());
            }
        }
    }
}

/// SIGTERM first, forced kill after `grace`
async fn terminate(language: &LanguageId, child: &mut Child, grace: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        tracing::debug!("{} backend already exited: {}", language, status);
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid names our own child, which has not been reaped yet
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!("{} backend exited: {}", language, status);
        }
        Ok(Err(e)) => {
            tracing::warn!("{} backend wait error: {}", language, e);
        }
        Err(_) => {
            tracing::warn!("{} backend termination timed out, forcing kill", language);
            let _ = child.kill().await;
        }
    }
}

async fn relay_stderr(language: LanguageId, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("{} stderr: {}", language, line);
    }
}
