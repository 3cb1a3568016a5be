//! # civic-core: Domain model for the CivicFix live client
//!
//! Plain data types shared by the sync layer (`civic-live`) and the
//! applications built on it. Nothing in here touches the network.
//!
//! ## Modules
//!
//! - [`identity`]: who the local user is (user id, admin flag, token)
//! - [`issue`]: issue records from the server and their display projection
//! - [`listing`]: listing queries, pages and the current view
//! - [`notice`]: transient user-facing notices
//! - [`board`]: the set of issues currently on screen

pub mod board;
pub mod identity;
pub mod issue;
pub mod listing;
pub mod notice;

pub use board::{FieldUpdate, IssueBoard};
pub use identity::{SessionIdentity, UserId};
pub use issue::{IssueId, IssueRecord, IssueView, VoteState};
pub use listing::{ListingFilters, ListingPage, ListingQuery, View, DEFAULT_PER_PAGE};
pub use notice::{Notice, Severity};
