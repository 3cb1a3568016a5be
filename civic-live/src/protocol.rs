//! JSON event protocol for the push channel.
//!
//! Wire format (one WebSocket text frame per event):
//! ```text
//! {"event": "vote_update", "data": {"issue_id": 42, "vote_count": 4, ...}}
//! ```
//!
//! Server → client events are parsed into [`ServerEvent`]; client → server
//! room requests are built from [`ClientCommand`]. Event names match the
//! CivicFix backend emitters.

use civic_core::{IssueId, IssueRecord, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Server → client event names.
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const JOINED_ROOM: &str = "joined_room";
    pub const STATUS_UPDATE: &str = "status_update";
    pub const VOTE_UPDATE: &str = "vote_update";
    pub const NEW_ISSUE: &str = "new_issue";
    pub const ADMIN_UPDATE: &str = "admin_update";
}

/// Client → server event names.
pub mod commands {
    pub const JOIN_USER_ROOM: &str = "join_user_room";
    pub const JOIN_ADMIN_ROOM: &str = "join_admin_room";
    pub const LEAVE_USER_ROOM: &str = "leave_user_room";
    pub const LEAVE_ADMIN_ROOM: &str = "leave_admin_room";
}

/// A single named event with its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to the text wire format.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from the text wire format.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    fn payload<T: DeserializeOwned>(self) -> Result<T, ProtocolError> {
        let data = match self.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(data).map_err(|e| ProtocolError::MalformedPayload {
            event: self.event,
            reason: e.to_string(),
        })
    }
}

// ───────────────────────────────────────────────────────────────────
// Server → client payloads
// ───────────────────────────────────────────────────────────────────

/// `status_update`: an issue changed status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub issue_id: Option<IssueId>,
    #[serde(default)]
    pub new_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub issue: Option<IssueRecord>,
}

impl StatusUpdate {
    /// Subject issue: `issue_id`, else the embedded issue's id.
    pub fn subject(&self) -> Option<IssueId> {
        self.issue_id.or_else(|| self.issue.as_ref().map(|i| i.id))
    }

    /// New status: `new_status`, else the embedded issue's status.
    pub fn status(&self) -> Option<&str> {
        self.new_status
            .as_deref()
            .or_else(|| self.issue.as_ref().map(|i| i.status.as_str()))
            .filter(|s| !s.is_empty())
    }
}

/// `vote_update`: an issue's vote count changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteUpdate {
    pub issue_id: IssueId,
    pub vote_count: u32,
    #[serde(default)]
    pub issue_owner_id: Option<UserId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `new_issue`: somebody reported a new issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub issue: Option<IssueRecord>,
}

impl NewIssue {
    pub fn notice_text(&self) -> String {
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return message.to_string();
        }
        match &self.issue {
            Some(issue) => format!("New issue reported: {}", issue.title),
            None => "New issue reported".to_string(),
        }
    }
}

/// `admin_update`: dashboard notice for administrators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminUpdate {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub issue: Option<IssueRecord>,
}

/// `joined_room`: acknowledgement of a join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAck {
    pub room: String,
}

/// `connected`: server greeting after the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    #[serde(default)]
    pub message: Option<String>,
}

/// Typed server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    StatusChanged(StatusUpdate),
    VoteChanged(VoteUpdate),
    NewItem(NewIssue),
    AdminNotice(AdminUpdate),
    RoomJoined(RoomAck),
    Welcome(Welcome),
    /// An event name this client does not know.
    Unknown(String),
}

impl ServerEvent {
    /// Parse a frame into a typed event.
    ///
    /// Unknown names are not an error; a known name with a payload that
    /// does not fit is.
    pub fn from_frame(frame: EventFrame) -> Result<Self, ProtocolError> {
        let name = frame.event.clone();
        Ok(match name.as_str() {
            events::STATUS_UPDATE => ServerEvent::StatusChanged(frame.payload()?),
            events::VOTE_UPDATE => ServerEvent::VoteChanged(frame.payload()?),
            events::NEW_ISSUE => ServerEvent::NewItem(frame.payload()?),
            events::ADMIN_UPDATE => ServerEvent::AdminNotice(frame.payload()?),
            events::JOINED_ROOM => ServerEvent::RoomJoined(frame.payload()?),
            events::CONNECTED => ServerEvent::Welcome(frame.payload()?),
            _ => ServerEvent::Unknown(frame.event),
        })
    }

    /// Wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            ServerEvent::StatusChanged(_) => events::STATUS_UPDATE,
            ServerEvent::VoteChanged(_) => events::VOTE_UPDATE,
            ServerEvent::NewItem(_) => events::NEW_ISSUE,
            ServerEvent::AdminNotice(_) => events::ADMIN_UPDATE,
            ServerEvent::RoomJoined(_) => events::JOINED_ROOM,
            ServerEvent::Welcome(_) => events::CONNECTED,
            ServerEvent::Unknown(name) => name.as_str(),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Rooms and client → server commands
// ───────────────────────────────────────────────────────────────────

/// Logical server-side broadcast scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    /// Per-user notifications (`user_<id>`).
    User(UserId),
    /// Administrator broadcasts (`admins`).
    Admins,
}

impl Room {
    /// Server-side room name.
    pub fn name(&self) -> String {
        match self {
            Room::User(id) => format!("user_{id}"),
            Room::Admins => "admins".to_string(),
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Room membership request sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Join(Room),
    Leave(Room),
}

impl ClientCommand {
    pub fn room(&self) -> &Room {
        match self {
            ClientCommand::Join(room) | ClientCommand::Leave(room) => room,
        }
    }

    /// Build the wire frame for this command.
    pub fn to_frame(&self) -> EventFrame {
        match self {
            ClientCommand::Join(Room::User(id)) => EventFrame::new(
                commands::JOIN_USER_ROOM,
                serde_json::json!({ "user_id": id }),
            ),
            ClientCommand::Join(Room::Admins) => EventFrame::new(
                commands::JOIN_ADMIN_ROOM,
                serde_json::json!({ "is_admin": true }),
            ),
            ClientCommand::Leave(Room::User(id)) => EventFrame::new(
                commands::LEAVE_USER_ROOM,
                serde_json::json!({ "user_id": id }),
            ),
            ClientCommand::Leave(Room::Admins) => {
                EventFrame::new(commands::LEAVE_ADMIN_ROOM, serde_json::json!({}))
            }
        }
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    MalformedPayload { event: String, reason: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            Self::MalformedPayload { event, reason } => {
                write!(f, "Malformed '{event}' payload: {reason}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}
