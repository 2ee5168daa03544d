//! Python via pyright

use super::{BackendSpec, Candidate};
use crate::models::LanguageId;

pub fn pyright() -> BackendSpec {
    BackendSpec::new(LanguageId::PYTHON, "pyright", "pyright-langserver")
        .args(&["--stdio"])
        .candidates(vec![
            Candidate::Local(".venv/bin/pyright-langserver"),
            Candidate::Local("venv/bin/pyright-langserver"),
            Candidate::Local("node_modules/.bin/pyright-langserver"),
        ])
        .install_hint("npm install -g pyright")
}
