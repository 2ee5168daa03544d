//! Stdio JSON-lines server

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinSet;

use crate::events::BroadcastSink;
use crate::host::protocol::*;
use crate::services::Bridge;

pub struct HostServer {
    bridge: Arc<Bridge>,
    sink: Arc<BroadcastSink>,
    interrupt: Notify,
}

impl HostServer {
    pub fn new(bridge: Arc<Bridge>, sink: Arc<BroadcastSink>) -> Self {
        Self {
            bridge,
            sink,
            interrupt: Notify::new(),
        }
    }

    /// Stop reading input and wind down as if the input had closed
    pub fn interrupt(&self) {
        self.interrupt.notify_one();
    }

    /// Serve on the process's own stdin/stdout
    pub async fn run(&self) -> std::io::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Serve until the input closes, a `shutdown` request arrives or
    /// `interrupt` is called, then stop every backend
    ///
    /// Requests run concurrently; responses and events share one writer so
    /// lines never interleave. In-flight requests finish before backends
    /// are stopped, so a start that was still running is stopped too.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_lines(writer, rx));
        let events_task = tokio::spawn(forward_events(self.sink.subscribe(), tx.clone()));

        let mut requests = JoinSet::new();
        let mut lines = reader.lines();
        let mut shutdown_id = None;

        loop {
            let next = tokio::select! {
                next = lines.next_line() => next,
                _ = self.interrupt.notified() => {
                    tracing::info!("Interrupted; stopping backends");
                    break;
                }
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("Host input closed; stopping backends");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Host input failed: {}; stopping backends", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: Request = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Unparseable host message: {}", e);
                    send(&tx, &Response::error(RequestId::Null, RpcError::parse_error()));
                    continue;
                }
            };

            if request.method == methods::SHUTDOWN {
                shutdown_id = Some(request.id);
                break;
            }

            let bridge = Arc::clone(&self.bridge);
            let tx = tx.clone();
            requests.spawn(async move {
                let id = request.id.clone();
                let response = match dispatch(&bridge, &request).await {
                    Ok(v) => Response::success(id, v),
                    Err(e) => Response::error(id, e),
                };
                send(&tx, &response);
            });
        }

        while requests.join_next().await.is_some() {}
        let stopped = self.bridge.shutdown_all().await;

        if let Some(id) = shutdown_id {
            send(
                &tx,
                &Response::success(id, serde_json::json!({ "stopped": stopped.len() })),
            );
        }

        events_task.abort();
        drop(tx);
        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}

fn send<T: serde::Serialize>(tx: &mpsc::UnboundedSender<String>, message: &T) {
    match serde_json::to_string(message) {
        Ok(line) => {
            let _ = tx.send(line);
        }
        Err(e) => tracing::error!("Failed to serialize host message: {}", e),
    }
}

async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn forward_events(
    mut events: broadcast::Receiver<crate::events::BridgeEvent>,
    tx: mpsc::UnboundedSender<String>,
) {
    loop {
        match events.recv().await {
            Ok(event) => send(&tx, &EventMessage::from(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Host fell behind; dropped {} event(s)", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Request Dispatch
// ============================================================================

fn parse<T: DeserializeOwned>(request: &Request) -> Result<T, RpcError> {
    let params = request.params.clone().unwrap_or(serde_json::json!({}));
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

async fn dispatch(bridge: &Bridge, request: &Request) -> Result<Value, RpcError> {
    match request.method.as_str() {
        methods::PING => Ok(serde_json::json!({ "pong": true })),
        methods::LANGUAGES => {
            serde_json::to_value(bridge.registry().languages()).map_err(backend_json)
        }

        methods::START => {
            let p: LifecycleParams = parse(request)?;
            Ok(Value::Bool(bridge.start(&p.workspace, &p.language_id).await?))
        }
        methods::STOP => {
            let p: LifecycleParams = parse(request)?;
            Ok(Value::Bool(bridge.stop(&p.workspace, &p.language_id).await?))
        }
        methods::IS_RUNNING => {
            let p: LifecycleParams = parse(request)?;
            Ok(Value::Bool(bridge.is_running(&p.workspace, &p.language_id).await))
        }

        methods::HOVER => {
            let p: PositionParams = parse(request)?;
            let hover = bridge
                .hover(&p.workspace, &p.language_id, &p.file, p.position)
                .await?;
            Ok(serde_json::to_value(hover).map_err(backend_json)?)
        }
        methods::COMPLETION => {
            let p: PositionParams = parse(request)?;
            let list = bridge
                .completion(&p.workspace, &p.language_id, &p.file, p.position)
                .await?;
            Ok(serde_json::to_value(list).map_err(backend_json)?)
        }
        methods::DEFINITION => {
            let p: PositionParams = parse(request)?;
            let locations = bridge
                .definition(&p.workspace, &p.language_id, &p.file, p.position)
                .await?;
            Ok(serde_json::to_value(locations).map_err(backend_json)?)
        }

        methods::DID_OPEN => {
            let p: DidOpenParams = parse(request)?;
            bridge
                .did_open(&p.workspace, &p.language_id, &p.file, &p.text, p.version)
                .await;
            Ok(Value::Null)
        }
        methods::DID_CHANGE => {
            let p: DidChangeParams = parse(request)?;
            bridge
                .did_change(&p.workspace, &p.language_id, &p.file, &p.changes, p.version)
                .await;
            Ok(Value::Null)
        }
        methods::DID_CLOSE => {
            let p: DidCloseParams = parse(request)?;
            bridge.did_close(&p.workspace, &p.language_id, &p.file).await;
            Ok(Value::Null)
        }

        _ => Err(RpcError::method_not_found(&request.method)),
    }
}

fn backend_json(e: serde_json::Error) -> RpcError {
    RpcError::from(crate::error::BackendError::Json(e))
}
