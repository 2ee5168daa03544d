//! Backend process launching
//!
//! `Launcher` is the seam between protocol handling and the operating
//! system: production code spawns child processes, tests hand back in-memory
//! pipes.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStderr, Command};

use crate::error::BackendError;
use crate::models::{LanguageId, WorkspaceFolder};

/// Executable plus arguments for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl BackendCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Streams of a launched backend
pub struct BackendIo {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Option<ChildStderr>,
    pub child: Option<Child>,
}

pub trait Launcher: Send + Sync {
    fn launch(
        &self,
        language: &LanguageId,
        command: &BackendCommand,
        workspace: &WorkspaceFolder,
    ) -> Result<BackendIo, BackendError>;
}

/// Spawns backends as child processes over stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(
        &self,
        language: &LanguageId,
        command: &BackendCommand,
        workspace: &WorkspaceFolder,
    ) -> Result<BackendIo, BackendError> {
        tracing::info!("Starting {} backend: {} (in {})", language, command, workspace);

        let spawn_error = |message: String| BackendError::Spawn {
            language: language.clone(),
            message,
        };

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(workspace.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(format!("{}: {}", command.program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("Failed to get stdout".to_string()))?;
        let stderr = child.stderr.take();

        Ok(BackendIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            stderr,
            child: Some(child),
        })
    }
}

/// Find an executable on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            ["exe", "cmd", "bat"]
                .iter()
                .map(|ext| candidate.with_extension(ext))
                .find(|c| c.is_file())
        } else {
            None
        }
    })
}

pub fn is_executable(path: &std::path::Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
