//! langbridge - Multi-backend Language Server Bridge
//!
//! Spawns one language server per (language, workspace), speaks LSP
//! JSON-RPC or the tsserver protocol to it, and exposes a uniform
//! start/stop/hover/completion/definition/document-sync surface to an
//! editor host.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod infra;
pub mod models;
pub mod services;

#[cfg(test)]
mod testing;
