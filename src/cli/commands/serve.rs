//! Serve command - host protocol on stdio

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::config;
use crate::events::{BroadcastSink, EventSink};
use crate::host::HostServer;
use crate::infra::{Launcher, ProcessLauncher};
use crate::services::{Bridge, Registry};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Config file (default: ~/.config/langbridge/config.toml)
    #[arg(long, env = "LANGBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = config::load(args.config.as_deref()).await?;

    let sink = Arc::new(BroadcastSink::default());
    let registry = Registry::from_config(
        &config,
        Arc::clone(&sink) as Arc<dyn EventSink>,
        Arc::new(ProcessLauncher) as Arc<dyn Launcher>,
    );
    tracing::info!(
        "Serving languages: {}",
        registry
            .languages()
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let bridge = Arc::new(Bridge::new(registry));
    let server = Arc::new(HostServer::new(bridge, sink));

    // Ctrl-C winds the server down the same way a closed stdin does, so
    // starts still in flight are stopped as well
    let interrupted = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted.interrupt();
        }
    });

    server.run().await?;
    Ok(())
}
