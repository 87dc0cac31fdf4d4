//! Upload sessions and their role-keyed files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ids::{FileName, IdentifierError, SessionId};

/// Logical role of a file inside an upload session.
///
/// Declaration order is merge order: intro, main, outro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Intro,
    Main,
    Outro,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Intro, Role::Main, Role::Outro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Intro => "intro",
            Role::Main => "main",
            Role::Outro => "outro",
        }
    }

    /// Map a multipart field name to a role.
    ///
    /// `main_track` is accepted as an alias of `main`.
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "intro" => Some(Role::Intro),
            "main" | "main_track" => Some(Role::Main),
            "outro" => Some(Role::Outro),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intro" => Ok(Role::Intro),
            "main" => Ok(Role::Main),
            "outro" => Ok(Role::Outro),
            other => Err(IdentifierError::UnknownRole(other.to_string())),
        }
    }
}

/// A file committed into an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub session_id: SessionId,
    pub role: Role,
    pub file_name: FileName,
    pub size_bytes: u64,
}

/// An upload session as found on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: SessionId,
    pub files: BTreeMap<Role, StoredFile>,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    /// Files in merge order.
    pub fn ordered_files(&self) -> impl Iterator<Item = &StoredFile> {
        self.files.values()
    }

    pub fn file(&self, role: Role) -> Option<&StoredFile> {
        self.files.get(&role)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.size_bytes).sum()
    }
}
