//! CLI module for langbridge
//!
//! Provides command-line interface using clap derive macros.

pub mod commands;

use clap::{Parser, Subcommand};

use commands::{doctor::DoctorArgs, serve::ServeArgs};

const LONG_ABOUT: &str = r#"
langbridge - multi-backend language server bridge

Runs gopls, pyright and tsserver (plus any configured JSON-RPC server) per
workspace and exposes them to an editor host as newline-delimited JSON on
stdin/stdout.

QUICK START:
  langbridge doctor                  # Which backends can be launched
  langbridge serve                   # Host protocol on stdio

CONFIGURATION:
  ~/.config/langbridge/config.toml   # or --config <path>
  LANGBRIDGE_REQUEST_TIMEOUT_MS      # overrides [requests].timeout_ms
  RUST_LOG=langbridge=debug          # logs go to stderr
"#;

/// langbridge - multi-backend language server bridge
#[derive(Parser, Debug)]
#[command(name = "langbridge")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the host protocol on stdin/stdout
    Serve(ServeArgs),

    /// Show which backend each language resolves to
    Doctor(DoctorArgs),
}
