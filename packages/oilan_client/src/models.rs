use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque identifier of a dialog, assigned by the history service.
///
/// The backend issues integer ids; they are kept as text so the client never
/// does arithmetic on them and embeds them in URLs verbatim.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DialogId(String);

impl DialogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for DialogId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DialogId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for DialogId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for DialogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

/// Author of a message. The backend calls the assistant `"ai"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single message within a dialog. Position in the log is the only ordering key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A persisted conversation thread as listed by the history service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: DialogId,
    #[serde(default)]
    pub title: String,
}

/// Body of `GET /api/v1/dialogs/{id}`. Other dialog fields are ignored.
/// An empty dialog comes back with `"messages": null`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DialogDetail {
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

impl DialogDetail {
    pub fn into_messages(self) -> Vec<Message> {
        self.messages.unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateDialogRequest<'a> {
    pub title: &'a str,
}

/// Error body written by the backend on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: String,
}

/// Lifecycle of the live channel bound to the active dialog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    /// True while a channel is held (or being acquired) for a dialog.
    pub fn is_bound(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Connecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        f.write_str(label)
    }
}
