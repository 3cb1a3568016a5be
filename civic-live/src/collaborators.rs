//! Seams to the rest of the client: REST API, display, and identity.

use std::fmt;

use async_trait::async_trait;
use civic_core::{
    FieldUpdate, IssueBoard, IssueId, ListingPage, ListingQuery, Notice, SessionIdentity,
    VoteState,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::connection::ConnectionStatus;

// ───────────────────────────────────────────────────────────────────
// REST
// ───────────────────────────────────────────────────────────────────

/// Whether a vote request added or removed the user's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Voted,
    Unvoted,
}

/// Server answer to a vote toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub action: VoteAction,
    pub vote_count: u32,
}

impl VoteReceipt {
    /// Authoritative vote state for the local user.
    pub fn into_state(self) -> VoteState {
        VoteState::new(self.vote_count, self.action == VoteAction::Voted)
    }
}

/// REST API failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Non-success HTTP status, with the server's `error` text if any.
    Status { code: u16, message: Option<String> },
    /// Request never completed.
    Network(String),
    /// Response body did not parse.
    Decode(String),
}

impl ApiError {
    /// Text suitable for a notice, if the server supplied one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref().filter(|m| !m.is_empty()),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status {
                code,
                message: Some(m),
            } => write!(f, "HTTP {code}: {m}"),
            Self::Status { code, message: None } => write!(f, "HTTP {code}"),
            Self::Network(e) => write!(f, "Network error: {e}"),
            Self::Decode(e) => write!(f, "Invalid response: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// The CivicFix REST endpoints this layer calls.
#[async_trait]
pub trait IssueApi: Send + Sync {
    /// One page of the issue listing.
    async fn fetch_listing(
        &self,
        query: &ListingQuery,
        identity: &SessionIdentity,
    ) -> Result<ListingPage, ApiError>;

    /// Toggle the caller's vote on an issue.
    async fn submit_vote(
        &self,
        issue: IssueId,
        identity: &SessionIdentity,
    ) -> Result<VoteReceipt, ApiError>;

    /// Number of unread notifications for the caller.
    async fn fetch_unread_count(&self, identity: &SessionIdentity) -> Result<u32, ApiError>;
}

// ───────────────────────────────────────────────────────────────────
// Display
// ───────────────────────────────────────────────────────────────────

/// Whatever renders issues for the user.
///
/// Calls arrive from the session task, one at a time.
pub trait DisplaySurface: Send + 'static {
    /// Redraw the whole listing.
    fn render_listing(&mut self, board: &IssueBoard);

    /// Change one field of a displayed issue.
    fn update_field(&mut self, issue: IssueId, update: &FieldUpdate);

    fn show_notice(&mut self, notice: &Notice);

    fn set_notification_badge(&mut self, unread: u32);

    fn connection_changed(&mut self, _status: ConnectionStatus) {}
}

// ───────────────────────────────────────────────────────────────────
// Identity
// ───────────────────────────────────────────────────────────────────

/// Write side of the identity channel, held by whoever does login/logout.
#[derive(Debug, Clone)]
pub struct IdentityPublisher {
    tx: watch::Sender<SessionIdentity>,
}

impl IdentityPublisher {
    /// Replace the identity. Observers are notified only on change.
    pub fn set(&self, identity: SessionIdentity) {
        self.tx.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }

    pub fn logout(&self) {
        self.set(SessionIdentity::anonymous());
    }

    pub fn current(&self) -> SessionIdentity {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionIdentity> {
        self.tx.subscribe()
    }
}

/// Create the identity channel.
pub fn identity_channel(
    initial: SessionIdentity,
) -> (IdentityPublisher, watch::Receiver<SessionIdentity>) {
    let (tx, rx) = watch::channel(initial);
    (IdentityPublisher { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_receipt_state() {
        let receipt: VoteReceipt =
            serde_json::from_str(r#"{"action": "voted", "vote_count": 4}"#).unwrap();
        assert_eq!(receipt.into_state(), VoteState::new(4, true));

        let receipt: VoteReceipt =
            serde_json::from_str(r#"{"action": "unvoted", "vote_count": 3}"#).unwrap();
        assert_eq!(receipt.into_state(), VoteState::new(3, false));
    }

    #[test]
    fn test_api_error_message() {
        let err = ApiError::Status {
            code: 400,
            message: Some("Cannot vote on your own issue".into()),
        };
        assert_eq!(err.server_message(), Some("Cannot vote on your own issue"));
        assert_eq!(err.to_string(), "HTTP 400: Cannot vote on your own issue");
        assert_eq!(ApiError::Network("refused".into()).server_message(), None);
    }

    #[tokio::test]
    async fn test_identity_publisher_notifies_on_change_only() {
        let (publisher, mut rx) = identity_channel(SessionIdentity::anonymous());

        publisher.set(SessionIdentity::anonymous());
        assert!(!rx.has_changed().unwrap());

        publisher.set(SessionIdentity::citizen("5", "tok"));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());

        publisher.logout();
        rx.changed().await.unwrap();
        assert!(!rx.borrow().is_authenticated());
    }
}
