//! Push event dispatch.
//!
//! Events are applied to the [`IssueBoard`] in arrival order and turned
//! into [`Reaction`]s for the session to carry out (display updates,
//! notices, re-fetches). The dispatcher never touches the network.

use std::time::Duration;

use civic_core::{FieldUpdate, IssueBoard, IssueId, ListingQuery, Notice, SessionIdentity, View};

use crate::protocol::{
    AdminUpdate, EventFrame, NewIssue, Room, ServerEvent, StatusUpdate, VoteUpdate,
};
use crate::rooms::RoomMembership;

/// How long the owner's "received a vote" notice stays up.
pub const OWNER_VOTE_NOTICE: Duration = Duration::from_millis(4000);

/// Something the session must do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Push a changed field of a displayed issue to the display.
    Field(IssueId, FieldUpdate),
    /// Show a transient notice.
    Notice(Notice),
    /// Re-fetch the listing currently shown.
    Refetch(ListingQuery),
    /// Re-count unread notifications for the badge.
    RefreshNotificationCount,
    /// The server confirmed a room join.
    RoomAcknowledged(String),
}

/// What the dispatcher needs to know about the client.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub view: &'a View,
    pub membership: &'a RoomMembership,
    pub identity: &'a SessionIdentity,
}

/// Event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub dropped: u64,
}

/// Applies push events to the board.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    stats: DispatchStats,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and handle a raw frame. Malformed payloads are logged and
    /// dropped.
    pub fn dispatch_frame(
        &mut self,
        frame: EventFrame,
        board: &mut IssueBoard,
        ctx: DispatchContext<'_>,
    ) -> Vec<Reaction> {
        match ServerEvent::from_frame(frame) {
            Ok(event) => self.handle(event, board, ctx),
            Err(e) => {
                log::warn!("Dropping push event: {e}");
                self.stats.dropped += 1;
                Vec::new()
            }
        }
    }

    /// Handle one typed event.
    pub fn handle(
        &mut self,
        event: ServerEvent,
        board: &mut IssueBoard,
        ctx: DispatchContext<'_>,
    ) -> Vec<Reaction> {
        log::debug!("Push event received: {}", event.name());

        let reactions = match event {
            ServerEvent::StatusChanged(update) => status_changed(update, board, ctx),
            ServerEvent::VoteChanged(update) => vote_changed(update, board, ctx),
            ServerEvent::NewItem(item) => new_item(item, ctx),
            ServerEvent::AdminNotice(update) => {
                if !ctx.membership.holds(&Room::Admins) {
                    log::debug!("Ignoring admin update on a non-admin client");
                    self.stats.dropped += 1;
                    return Vec::new();
                }
                admin_notice(update, ctx)
            }
            ServerEvent::RoomJoined(ack) => vec![Reaction::RoomAcknowledged(ack.room)],
            ServerEvent::Welcome(welcome) => {
                log::info!(
                    "Connected to CivicFix real-time updates{}",
                    welcome
                        .message
                        .map(|m| format!(": {m}"))
                        .unwrap_or_default()
                );
                Vec::new()
            }
            ServerEvent::Unknown(name) => {
                log::warn!("Unknown push event '{name}' dropped");
                self.stats.dropped += 1;
                return Vec::new();
            }
        };

        self.stats.handled += 1;
        reactions
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}

fn refetch_current(view: &View) -> Option<Reaction> {
    view.query().cloned().map(Reaction::Refetch)
}

fn status_changed(
    update: StatusUpdate,
    board: &mut IssueBoard,
    ctx: DispatchContext<'_>,
) -> Vec<Reaction> {
    let mut reactions = Vec::new();

    match (update.subject(), update.status()) {
        (Some(id), Some(status)) => match board.set_status(id, status) {
            Some(field) => reactions.push(Reaction::Field(id, field)),
            None => log::debug!("Issue {id} not displayed, status update skipped"),
        },
        (Some(id), None) => log::debug!("Status update for issue {id} carries no status"),
        (None, _) => log::warn!("Status update without a subject issue"),
    }

    if let Some(message) = update.message.filter(|m| !m.is_empty()) {
        reactions.push(Reaction::Notice(Notice::success(message)));
    }

    if ctx.view.is_default_listing() {
        reactions.extend(refetch_current(ctx.view));
    }

    if ctx.identity.is_authenticated() {
        reactions.push(Reaction::RefreshNotificationCount);
    }
    reactions
}

fn vote_changed(
    update: VoteUpdate,
    board: &mut IssueBoard,
    ctx: DispatchContext<'_>,
) -> Vec<Reaction> {
    let mut reactions = Vec::new();
    let id = update.issue_id;

    if let Some(field) = board.set_vote_count(id, update.vote_count) {
        reactions.push(Reaction::Field(id, field));
    }

    // Only the owner hears about it, not the voter
    if let Some(owner) = &update.issue_owner_id {
        if ctx.identity.owns(owner) {
            reactions.push(Reaction::Notice(
                Notice::success(format!("Your issue {id} received a vote!"))
                    .with_duration(OWNER_VOTE_NOTICE),
            ));
        }
    }
    reactions
}

fn new_item(item: NewIssue, ctx: DispatchContext<'_>) -> Vec<Reaction> {
    let mut reactions = vec![Reaction::Notice(Notice::info(item.notice_text()))];

    if ctx.view.is_default_listing() {
        reactions.extend(refetch_current(ctx.view));
    }
    if ctx.view.is_admin_dashboard() && ctx.membership.holds(&Room::Admins) {
        reactions.extend(refetch_current(ctx.view));
    }
    reactions
}

fn admin_notice(update: AdminUpdate, ctx: DispatchContext<'_>) -> Vec<Reaction> {
    let mut reactions = Vec::new();

    match update.message.filter(|m| !m.is_empty()) {
        Some(message) => reactions.push(Reaction::Notice(Notice::info(message))),
        None => log::debug!("Admin update without message (type {:?})", update.kind),
    }

    if ctx.view.is_admin_dashboard() {
        reactions.extend(refetch_current(ctx.view));
    }
    reactions
}
