//! Host-side stdio server
//!
//! Exposes the `Bridge` command surface as newline-delimited JSON on
//! stdin/stdout and streams bridge events on the same channel.

pub mod protocol;
pub mod server;

pub use server::HostServer;
