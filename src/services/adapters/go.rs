//! Go via gopls

use super::{BackendSpec, Candidate};
use crate::models::LanguageId;

pub fn gopls() -> BackendSpec {
    BackendSpec::new(LanguageId::GO, "gopls", "gopls")
        .candidates(vec![Candidate::Home("go/bin/gopls")])
        .install_hint("go install golang.org/x/tools/gopls@latest")
}
