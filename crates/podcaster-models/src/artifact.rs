//! Artifact categories and client-addressable keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{FileName, IdentifierError, JobId, SessionId};
use crate::session::Role;

/// Top-level storage category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Per-session originals
    Uploads,
    /// Per-job outputs
    Processed,
    /// Flat bucket of exported files
    Outputs,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Uploads => "uploads",
            Category::Processed => "processed",
            Category::Outputs => "outputs",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable or deletable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    /// A whole upload session
    Session(SessionId),
    /// One file of an upload session
    SessionFile { session_id: SessionId, role: Role },
    /// The output directory of a job
    Processed(JobId),
    /// A file in the flat outputs bucket
    Output(FileName),
}

impl ArtifactKey {
    /// Parse a client-supplied id within a category.
    ///
    /// Uploads accept `<session>` or `<session>/<role>`; the other
    /// categories accept a single component.
    pub fn parse(category: Category, raw: &str) -> Result<Self, IdentifierError> {
        match category {
            Category::Uploads => match raw.split_once('/') {
                Some((session, role)) => Ok(ArtifactKey::SessionFile {
                    session_id: SessionId::parse(session)?,
                    role: role.parse()?,
                }),
                None => Ok(ArtifactKey::Session(SessionId::parse(raw)?)),
            },
            Category::Processed => Ok(ArtifactKey::Processed(JobId::parse(raw)?)),
            Category::Outputs => Ok(ArtifactKey::Output(FileName::parse(raw)?)),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ArtifactKey::Session(_) | ArtifactKey::SessionFile { .. } => Category::Uploads,
            ArtifactKey::Processed(_) => Category::Processed,
            ArtifactKey::Output(_) => Category::Outputs,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKey::Session(id) => write!(f, "uploads/{id}"),
            ArtifactKey::SessionFile { session_id, role } => {
                write!(f, "uploads/{session_id}/{role}")
            }
            ArtifactKey::Processed(id) => write!(f, "processed/{id}"),
            ArtifactKey::Output(name) => write!(f, "outputs/{name}"),
        }
    }
}
