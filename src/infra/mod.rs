//! Infrastructure layer for langbridge
//!
//! Process spawning, wire framing and the two backend dialects.

pub mod framing;
pub mod jsonrpc;
pub mod launcher;
pub mod process;
pub mod tsserver;

pub use launcher::{BackendCommand, Launcher, ProcessLauncher};
pub use process::ProtocolProcess;

/// Backend speaking JSON-RPC with `Content-Length` framing
pub type LspProcess = ProtocolProcess<jsonrpc::JsonRpc>;

/// Backend speaking the tsserver line protocol
pub type TsServerProcess = ProtocolProcess<tsserver::TsServer>;
