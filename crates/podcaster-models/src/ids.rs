//! Validated identifiers.
//!
//! Every identifier that ends up as a path component goes through
//! [`validate_component`]. Traversal sequences and absolute paths are
//! rejected, never normalized.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest identifier accepted as a single path component.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Rejection reasons for client-supplied identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier exceeds {max} bytes")]
    TooLong { max: usize },

    #[error("identifier contains a path traversal sequence: {0:?}")]
    Traversal(String),

    #[error("identifier is an absolute path: {0:?}")]
    Absolute(String),

    #[error("identifier contains invalid character {ch:?}: {value:?}")]
    InvalidCharacter { value: String, ch: char },

    #[error("unknown role: {0:?}")]
    UnknownRole(String),
}

/// Validate a single path component.
///
/// Accepts `[A-Za-z0-9._-]` only, rejects `.`, `..`, any embedded `..`
/// and anything that looks like an absolute path.
pub fn validate_component(value: &str) -> Result<&str, IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong {
            max: MAX_IDENTIFIER_LEN,
        });
    }
    if value.starts_with('/') || value.starts_with('\\') || value.get(1..2) == Some(":") {
        return Err(IdentifierError::Absolute(value.to_string()));
    }
    if value == "." || value.contains("..") {
        return Err(IdentifierError::Traversal(value.to_string()));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(IdentifierError::InvalidCharacter {
            value: value.to_string(),
            ch,
        });
    }
    Ok(value)
}

macro_rules! component_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate a client-supplied value.
            pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                validate_component(&value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

component_id!(
    /// Identifier of an upload session.
    SessionId
);

component_id!(
    /// Identifier of a processing job.
    JobId
);

component_id!(
    /// A flat file name inside a single directory.
    FileName
);

impl SessionId {
    /// Allocate a fresh session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl FileName {
    /// Reduce an arbitrary client file name to a safe flat name.
    ///
    /// Directory parts are dropped, unsupported characters become `_`,
    /// leading dots are stripped so the result never collides with
    /// hidden temp files.
    pub fn sanitize(raw: &str) -> Self {
        let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
        let mut cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        while cleaned.contains("..") {
            cleaned = cleaned.replace("..", ".");
        }
        let mut cleaned = cleaned.trim_start_matches('.').to_string();
        if cleaned.len() > MAX_IDENTIFIER_LEN {
            let tail_start = cleaned.len() - MAX_IDENTIFIER_LEN;
            cleaned = cleaned[tail_start..].trim_start_matches('.').to_string();
        }
        if cleaned.is_empty() {
            cleaned = "upload".to_string();
        }
        Self(cleaned)
    }
}

impl JobId {
    /// Mint a fresh job id. Only the job store calls this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        assert!(validate_component("a1b2-c3_d4.mp3").is_ok());
        assert!(SessionId::parse(Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(matches!(
            validate_component(".."),
            Err(IdentifierError::Traversal(_))
        ));
        assert!(matches!(
            validate_component("."),
            Err(IdentifierError::Traversal(_))
        ));
        assert!(matches!(
            validate_component("a..b"),
            Err(IdentifierError::Traversal(_))
        ));
        assert!(matches!(
            validate_component("../etc"),
            Err(IdentifierError::Traversal(_))
        ));
    }

    #[test]
    fn test_rejects_absolute_and_separators() {
        assert!(matches!(
            validate_component("/etc/passwd"),
            Err(IdentifierError::Absolute(_))
        ));
        assert!(matches!(
            validate_component("C:evil"),
            Err(IdentifierError::Absolute(_))
        ));
        assert!(matches!(
            validate_component("a/b"),
            Err(IdentifierError::InvalidCharacter { ch: '/', .. })
        ));
        assert!(matches!(
            validate_component("a\0b"),
            Err(IdentifierError::InvalidCharacter { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_and_long() {
        assert_eq!(validate_component(""), Err(IdentifierError::Empty));
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(matches!(
            validate_component(&long),
            Err(IdentifierError::TooLong { .. })
        ));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(FileName::sanitize("episode 1.mp3").as_str(), "episode_1.mp3");
        assert_eq!(FileName::sanitize("../../etc/passwd").as_str(), "passwd");
        assert_eq!(FileName::sanitize("C:\\music\\intro.wav").as_str(), "intro.wav");
        assert_eq!(FileName::sanitize("..hidden").as_str(), "hidden");
        assert_eq!(FileName::sanitize("a...b.mp3").as_str(), "a.b.mp3");
        assert_eq!(FileName::sanitize("").as_str(), "upload");
        assert_eq!(FileName::sanitize("/").as_str(), "upload");
        let long = format!("{}.mp3", "x".repeat(300));
        let name = FileName::sanitize(&long);
        assert!(name.as_str().len() <= MAX_IDENTIFIER_LEN);
        assert!(name.as_str().ends_with(".mp3"));
        assert!(validate_component(name.as_str()).is_ok());
    }

    #[test]
    fn test_serde_validates() {
        let ok: JobId = serde_json::from_str("\"job-1\"").unwrap();
        assert_eq!(ok.as_str(), "job-1");
        assert!(serde_json::from_str::<JobId>("\"../x\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"job-1\"");
    }
}
