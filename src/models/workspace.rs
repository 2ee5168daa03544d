//! Workspace folders and file URIs

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Absolute, lexically normalized workspace root
///
/// Two folders naming the same directory through `.`/`..` segments or a
/// trailing separator compare equal, so they map to the same backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PathBuf", into = "PathBuf")]
pub struct WorkspaceFolder(PathBuf);

impl WorkspaceFolder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(normalize_path(path.as_ref()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn uri(&self) -> String {
        path_to_uri(&self.0)
    }

    /// Last path component, used as the LSP workspace folder name
    pub fn name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.to_string_lossy().into_owned())
    }

    /// Resolve a file against this workspace (absolute paths pass through)
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            normalize_path(file)
        } else {
            normalize_path(&self.0.join(file))
        }
    }
}

impl fmt::Display for WorkspaceFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for WorkspaceFolder {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&str> for WorkspaceFolder {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<WorkspaceFolder> for PathBuf {
    fn from(folder: WorkspaceFolder) -> Self {
        folder.0
    }
}

/// Make a path absolute and drop `.`/`..` segments without touching the
/// filesystem (symlinks are left alone)
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

pub fn path_to_uri(path: &Path) -> String {
    let abs_path = normalize_path(path);

    let path_str = abs_path.to_string_lossy().replace('\\', "/");
    let encoded: String = path_str
        .chars()
        .map(|c| match c {
            '/' | '.' | '-' | '_' | '~' => c.to_string(),
            c if c.is_ascii_alphanumeric() => c.to_string(),
            c => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect();

    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}
