//! Language identifiers
//!
//! The registry key for adapters and the tag carried by every event.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Host-extensible language identifier ("go", "python", "typescript", ...)
///
/// Identifiers are compared case-insensitively by normalizing to lowercase
/// on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageId(Cow<'static, str>);

impl LanguageId {
    pub const GO: LanguageId = LanguageId(Cow::Borrowed("go"));
    pub const PYTHON: LanguageId = LanguageId(Cow::Borrowed("python"));
    pub const TYPESCRIPT: LanguageId = LanguageId(Cow::Borrowed("typescript"));

    pub fn new(id: impl Into<String>) -> Self {
        let id: String = id.into();
        let normalized = id.trim().to_lowercase();
        match normalized.as_str() {
            "go" => Self::GO,
            "python" => Self::PYTHON,
            "typescript" => Self::TYPESCRIPT,
            _ => Self(Cow::Owned(normalized)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LanguageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for LanguageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<LanguageId> for String {
    fn from(id: LanguageId) -> Self {
        id.0.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case() {
        assert_eq!(LanguageId::new(" Go "), LanguageId::GO);
        assert_eq!(LanguageId::from("TypeScript"), LanguageId::TYPESCRIPT);
        assert_eq!(LanguageId::new("Rust").as_str(), "rust");
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&LanguageId::PYTHON).unwrap();
        assert_eq!(json, r#""python""#);

        let parsed: LanguageId = serde_json::from_str(r#""Python""#).unwrap();
        assert_eq!(parsed, LanguageId::PYTHON);
    }
}
