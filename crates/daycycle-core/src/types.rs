//! Message and identity types shared by the scheduler and the transports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable participant identifier: the chat id on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub i64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ParticipantId)
    }
}

impl From<i64> for ParticipantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Display metadata about a participant, refreshed on every inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Identity {
    /// Name used in greetings; empty when unknown.
    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("")
    }
}

/// Media kinds a participant can attach to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Video,
    Document,
}

impl AttachmentKind {
    /// File extension used when the attachment is stored locally.
    /// Documents are not downloaded.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            AttachmentKind::Photo => Some("jpg"),
            AttachmentKind::Video => Some("mp4"),
            AttachmentKind::Document => None,
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentKind::Photo => write!(f, "photo"),
            AttachmentKind::Video => write!(f, "video"),
            AttachmentKind::Document => write!(f, "document"),
        }
    }
}

/// Opaque transport-side reference to an attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub kind: AttachmentKind,
    pub file_id: String,
}

/// A message received from a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Transport that produced the message ("telegram").
    pub channel: String,
    pub participant: ParticipantId,
    pub sender: Identity,
    /// Message text, or the caption of a media message.
    pub content: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl IncomingMessage {
    /// Trimmed text content, if any.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Bot command name and arguments (`/get_media 42` → `("get_media", ["42"])`).
    pub fn command(&self) -> Option<(String, Vec<String>)> {
        let text = self.text()?;
        let rest = text.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        // Strip "@botname" suffixes used in group chats.
        let name = parts.next()?.split('@').next()?.to_lowercase();
        if name.is_empty() {
            return None;
        }
        Some((name, parts.map(String::from).collect()))
    }
}

/// Reply keyboard attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyboard {
    /// One-time keyboard with a single row of choices.
    Choices(Vec<String>),
    /// Remove any keyboard currently shown.
    Remove,
}

/// A message for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// HTML-formatted text.
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}
