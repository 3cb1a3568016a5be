//! Issues as the server reports them and as the client displays them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::UserId;

/// Server-assigned issue id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub u64);

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issue as serialized by the REST API and inside push payloads.
///
/// Only the fields the live client needs; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: IssueId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub vote_count: u32,
    /// Reporter of the issue.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Only present on listings fetched with credentials.
    #[serde(default)]
    pub user_has_voted: bool,
}

/// Vote count plus whether the local user is one of the voters.
///
/// This is the value an optimistic vote speculates on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteState {
    pub count: u32,
    pub user_has_voted: bool,
}

impl VoteState {
    pub fn new(count: u32, user_has_voted: bool) -> Self {
        Self { count, user_has_voted }
    }

    /// The state after the local user clicks the vote button.
    ///
    /// Voting adds one, un-voting removes one; the count never goes negative.
    pub fn toggled(self) -> Self {
        if self.user_has_voted {
            Self {
                count: self.count.saturating_sub(1),
                user_has_voted: false,
            }
        } else {
            Self {
                count: self.count.saturating_add(1),
                user_has_voted: true,
            }
        }
    }
}

/// Display projection of an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueView {
    pub id: IssueId,
    pub title: String,
    pub status: String,
    pub votes: VoteState,
    pub owner: Option<UserId>,
}

impl From<IssueRecord> for IssueView {
    fn from(record: IssueRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            status: record.status,
            votes: VoteState::new(record.vote_count, record.user_has_voted),
            owner: record.user_id,
        }
    }
}
