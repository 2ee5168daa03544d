//! Service layer for langbridge

pub mod adapters;
pub mod bridge;
pub mod registry;
pub mod session;
pub mod workspaces;

pub use adapters::{BackendSpec, LanguageAdapter, LspAdapter, TsServerAdapter};
pub use bridge::Bridge;
pub use registry::Registry;
pub use session::LspSession;
pub use workspaces::WorkspaceTable;
