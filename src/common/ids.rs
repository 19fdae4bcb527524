//! Identifier types for sessions and stored tabular payloads.
//!
//! A `SessionId` names a directory on disk, so anything accepted from the
//! outside (URL parameters, CLI arguments) goes through `FromStr`, which only
//! lets path-safe strings through.

use core::fmt;
use core::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::errors::AgentError;

/// Longest session id accepted from the outside.
const MAX_SESSION_ID_LEN: usize = 128;

/// Identifier for one user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier: random hex plus the creation instant.
    #[must_use]
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        Self(format!("{}-{stamp}", Uuid::new_v4().simple()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > MAX_SESSION_ID_LEN || s == "." || s == ".." {
            return Err(AgentError::InvalidSessionId(s.to_string()));
        }
        let path_safe = s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !path_safe {
            return Err(AgentError::InvalidSessionId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// Reference to a tabular payload stored beside a session's turn log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadId(String);

impl PayloadId {
    /// Create a new random payload id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PayloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PayloadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_id_is_path_safe() {
        let id = SessionId::generate();
        let parsed: SessionId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
        assert!(id.as_str().len() > 32);
    }

    #[test]
    fn test_session_id_rejects_traversal() {
        assert!("..".parse::<SessionId>().is_err());
        assert!("../etc".parse::<SessionId>().is_err());
        assert!("a/b".parse::<SessionId>().is_err());
        assert!("".parse::<SessionId>().is_err());
        assert!("abc-123_x.y".parse::<SessionId>().is_ok());
    }

    #[test]
    fn test_payload_ids_are_unique() {
        assert_ne!(PayloadId::new(), PayloadId::new());
        assert_eq!(PayloadId::new().as_str().len(), 32);
    }
}
