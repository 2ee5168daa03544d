//! Doctor command - backend resolution check

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::config;
use crate::events::NullSink;
use crate::infra::ProcessLauncher;
use crate::models::WorkspaceFolder;
use crate::services::{BackendSpec, Registry};

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Config file (default: ~/.config/langbridge/config.toml)
    #[arg(long, env = "LANGBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also look for workspace-local installs (.venv, node_modules)
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    #[arg(long)]
    pub missing_only: bool,
}

#[derive(Serialize)]
struct DoctorResponse {
    summary: DoctorSummary,
    servers: Vec<ServerEntry>,
}

#[derive(Serialize)]
struct DoctorSummary {
    servers_installed: usize,
    servers_missing: usize,
}

#[derive(Serialize, Debug)]
struct ServerEntry {
    language: String,
    name: String,
    installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn check(spec: &BackendSpec, workspace: Option<&WorkspaceFolder>) -> ServerEntry {
    match spec.resolve(workspace) {
        Ok(command) => ServerEntry {
            language: spec.language.to_string(),
            name: spec.name.to_string(),
            installed: true,
            command: Some(command.to_string()),
            error: None,
        },
        Err(e) => ServerEntry {
            language: spec.language.to_string(),
            name: spec.name.to_string(),
            installed: false,
            command: None,
            error: Some(e.to_string()),
        },
    }
}

pub async fn execute(args: DoctorArgs) -> Result<()> {
    let config = config::load(args.config.as_deref()).await?;
    let registry = Registry::from_config(
        &config,
        std::sync::Arc::new(NullSink),
        std::sync::Arc::new(ProcessLauncher),
    );
    let workspace = args.workspace.map(WorkspaceFolder::new);

    let servers: Vec<ServerEntry> = registry
        .all()
        .iter()
        .map(|adapter| check(adapter.spec(), workspace.as_ref()))
        .collect();

    let installed = servers.iter().filter(|s| s.installed).count();
    let response = DoctorResponse {
        summary: DoctorSummary {
            servers_installed: installed,
            servers_missing: servers.len() - installed,
        },
        servers: servers
            .into_iter()
            .filter(|s| !args.missing_only || !s.installed)
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
