//! Chat record types.
//!
//! [`Session`], [`Message`] and [`Fact`] mirror the rows of the `sessions`,
//! `messages` and `facts` tables. [`Role`] and [`MessageKind`] are stored as
//! lowercase strings.

use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Payload kind of a message. Image messages carry a data URL as content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            _ => Err(format!("unknown message type: {s}")),
        }
    }
}

/// A chat session, matching the `sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// A stored message, matching the `messages` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub created_at: String,
}

/// Input for [`append_message`](super::messages::append_message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

impl NewMessage {
    pub fn text(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            kind: MessageKind::Text,
        }
    }
}

/// A long-term fact, matching the `facts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub fact: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Model] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("assistant".parse::<Role>().is_err());
    }

    #[test]
    fn new_message_defaults_to_text() {
        let msg: NewMessage =
            serde_json::from_str(r#"{"session_id":"s1","role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn message_serializes_kind_as_type() {
        let msg = Message {
            id: 1,
            session_id: "s1".into(),
            role: Role::Model,
            content: "hello".into(),
            kind: MessageKind::Image,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["role"], "model");
    }
}
