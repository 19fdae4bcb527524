//! Turn model and its on-disk record shape.
//!
//! A stored turn looks like `{"type": "assistant", "data": {"kind": "tabular",
//! "content": "<payload id>"}}`. Tabular turns carry only the payload id; the
//! table itself lives in the session's payload map.

use serde::{Deserialize, Serialize};

use crate::common::ids::PayloadId;

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user.
    User,
    /// The assistant.
    Assistant,
}

/// Whether a turn holds text or a payload reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    /// Plain text.
    Text,
    /// Reference to a stored table.
    Tabular,
}

/// Turn content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnContent {
    /// Plain text.
    Text(String),
    /// Id of a table in the payload map.
    Tabular(PayloadId),
}

/// One exchange unit; never mutated after append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StoredTurn", from = "StoredTurn")]
pub struct Turn {
    /// Speaker.
    pub role: Role,
    /// Content.
    pub content: TurnContent,
}

impl Turn {
    /// Text turn from the user.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Text turn from the assistant.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Assistant turn referencing a stored table.
    #[must_use]
    pub const fn tabular(id: PayloadId) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Tabular(id),
        }
    }

    /// Kind of content held.
    #[must_use]
    pub const fn kind(&self) -> TurnKind {
        match self.content {
            TurnContent::Text(_) => TurnKind::Text,
            TurnContent::Tabular(_) => TurnKind::Tabular,
        }
    }

    /// Text content, if this is a text turn.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            TurnContent::Tabular(_) => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredTurn {
    #[serde(rename = "type")]
    role: Role,
    data: StoredData,
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredData {
    kind: TurnKind,
    content: String,
}

impl From<Turn> for StoredTurn {
    fn from(turn: Turn) -> Self {
        let kind = turn.kind();
        let content = match turn.content {
            TurnContent::Text(text) => text,
            TurnContent::Tabular(id) => id.as_str().to_string(),
        };
        Self {
            role: turn.role,
            data: StoredData { kind, content },
        }
    }
}

impl From<StoredTurn> for Turn {
    fn from(stored: StoredTurn) -> Self {
        let content = match stored.data.kind {
            TurnKind::Text => TurnContent::Text(stored.data.content),
            TurnKind::Tabular => TurnContent::Tabular(PayloadId::from(stored.data.content)),
        };
        Self {
            role: stored.role,
            content,
        }
    }
}
