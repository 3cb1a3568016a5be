//! The live session: one task that owns all sync state.
//!
//! Commands from [`LiveHandle`], transport events, identity changes, REST
//! completions and the retry timer are processed one at a time by a single
//! `select!` loop. Network work (handshakes, REST calls) runs in spawned
//! tasks that report back through the session's inbox, so the loop never
//! waits on I/O.

use std::fmt;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use civic_core::{
    FieldUpdate, IssueBoard, IssueId, IssueView, ListingPage, ListingQuery, Notice,
    SessionIdentity, View, VoteState,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use uuid::Uuid;

use crate::collaborators::{ApiError, DisplaySurface, IssueApi, VoteReceipt};
use crate::connection::{
    AttemptId, ConnectionManager, ConnectionStatus, ReconnectPolicy, RetryDecision,
};
use crate::dispatcher::{DispatchContext, DispatchStats, EventDispatcher, Reaction};
use crate::optimistic::{MutationCoordinator, MutationKey, Resolution, Ticket};
use crate::protocol::{ClientCommand, Room};
use crate::rooms::RoomMembership;
use crate::transport::{Transport, TransportError, TransportEvent, TransportLink};

const LOGIN_TO_VOTE: &str = "Please login to vote on issues.";
const VOTE_REJECTED: &str = "Error voting on issue.";
const VOTE_FAILED: &str = "Error voting on issue. Please try again.";
const LOAD_FAILED: &str = "Error loading issues. Please try again.";

/// Session configuration.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Push channel endpoint.
    pub endpoint: String,
    pub reconnect: ReconnectPolicy,
    /// Per-client identifier sent as `tab_id`.
    pub client_id: Uuid,
    /// Capacity of the command and inbox queues.
    pub queue_capacity: usize,
}

impl LiveConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Endpoint with the client id appended.
    pub fn connect_url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{sep}tab_id={}", self.endpoint, self.client_id)
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:5000/live".to_string(),
            reconnect: ReconnectPolicy::default(),
            client_id: Uuid::new_v4(),
            queue_capacity: 64,
        }
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session task has exited.
    Stopped,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Live session stopped"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Point-in-time view of the session state.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub status: ConnectionStatus,
    pub view: View,
    pub issues: Vec<IssueView>,
    pub rooms: Vec<Room>,
    /// Joined rooms the server has confirmed.
    pub acknowledged_rooms: Vec<Room>,
    pub retry_count: u32,
    pub pending_mutations: usize,
    pub dispatch: DispatchStats,
}

impl BoardSnapshot {
    pub fn issue(&self, id: IssueId) -> Option<&IssueView> {
        self.issues.iter().find(|issue| issue.id == id)
    }
}

enum Command {
    Connect,
    Disconnect,
    Vote(IssueId),
    Navigate(View),
    Snapshot(oneshot::Sender<BoardSnapshot>),
    Shutdown,
}

/// Results of work done outside the session loop.
enum Completion {
    Opened {
        attempt: AttemptId,
        result: Result<TransportLink, TransportError>,
    },
    VoteResolved {
        issue: IssueId,
        ticket: Ticket,
        result: Result<VoteReceipt, ApiError>,
    },
    ListingFetched {
        request: u64,
        result: Result<ListingPage, ApiError>,
    },
    UnreadCounted(Result<u32, ApiError>),
}

/// Cloneable handle for driving a running session.
#[derive(Debug, Clone)]
pub struct LiveHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl LiveHandle {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Connect to the push channel. No-op when already connected.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.send(Command::Connect).await
    }

    /// Tear down the push channel and stop retrying.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.send(Command::Disconnect).await
    }

    /// Toggle the local user's vote on a displayed issue.
    pub async fn vote(&self, issue: IssueId) -> Result<(), SessionError> {
        self.send(Command::Vote(issue)).await
    }

    /// Switch to another view, loading its listing.
    pub async fn navigate(&self, view: View) -> Result<(), SessionError> {
        self.send(Command::Navigate(view)).await
    }

    pub async fn snapshot(&self) -> Result<BoardSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Stop the session task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Follow connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// Owner of the push link, the board and everything pending on them.
pub struct LiveSession<T: Transport> {
    config: LiveConfig,
    transport: Arc<T>,
    api: Arc<dyn IssueApi>,
    display: Box<dyn DisplaySurface>,

    identity_rx: watch::Receiver<SessionIdentity>,
    identity_open: bool,
    identity: SessionIdentity,

    commands: mpsc::Receiver<Command>,
    inbox_tx: mpsc::Sender<Completion>,
    inbox_rx: mpsc::Receiver<Completion>,
    status_tx: watch::Sender<ConnectionStatus>,

    connection: ConnectionManager,
    link: Option<TransportLink>,
    retry: Option<Pin<Box<Sleep>>>,
    membership: RoomMembership,
    dispatcher: EventDispatcher,
    mutations: MutationCoordinator<VoteState>,

    board: IssueBoard,
    view: View,
    listing_request: u64,
}

impl<T: Transport> LiveSession<T> {
    pub fn new(
        config: LiveConfig,
        transport: T,
        api: Arc<dyn IssueApi>,
        display: Box<dyn DisplaySurface>,
        mut identity_rx: watch::Receiver<SessionIdentity>,
    ) -> (Self, LiveHandle) {
        let capacity = config.queue_capacity.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let identity = identity_rx.borrow_and_update().clone();

        let session = Self {
            connection: ConnectionManager::new(config.reconnect),
            config,
            transport: Arc::new(transport),
            api,
            display,
            identity_rx,
            identity_open: true,
            identity,
            commands: command_rx,
            inbox_tx,
            inbox_rx,
            status_tx,
            link: None,
            retry: None,
            membership: RoomMembership::new(),
            dispatcher: EventDispatcher::new(),
            mutations: MutationCoordinator::new(),
            board: IssueBoard::new(),
            view: View::default(),
            listing_request: 0,
        };
        let handle = LiveHandle {
            commands: command_tx,
            status: status_rx,
        };
        (session, handle)
    }

    /// Run the session on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process inputs until shut down or every handle is dropped.
    pub async fn run(mut self) {
        log::info!("Live session started (client {})", self.config.client_id);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(done) = self.inbox_rx.recv() => self.handle_completion(done),
                event = next_link_event(&mut self.link) => self.handle_link_event(event),
                changed = self.identity_rx.changed(), if self.identity_open => match changed {
                    Ok(()) => self.handle_identity_change(),
                    Err(_) => {
                        log::debug!("Identity publisher dropped");
                        self.identity_open = false;
                    }
                },
                () = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    let attempt = self.connection.retry_due();
                    self.start_attempt(attempt);
                }
            }
        }

        self.disconnect();
        log::info!("Live session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                let attempt = self.connection.connect();
                self.start_attempt(attempt);
            }
            Command::Disconnect => self.disconnect(),
            Command::Vote(issue) => self.vote(issue),
            Command::Navigate(view) => self.navigate(view),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Opened { attempt, result } => self.link_opened(attempt, result),
            Completion::VoteResolved {
                issue,
                ticket,
                result,
            } => self.vote_resolved(issue, ticket, result),
            Completion::ListingFetched { request, result } => self.listing_fetched(request, result),
            Completion::UnreadCounted(Ok(unread)) => self.display.set_notification_badge(unread),
            Completion::UnreadCounted(Err(e)) => {
                log::warn!("Failed to refresh notification count: {e}");
            }
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Connection
    // ───────────────────────────────────────────────────────────────

    fn start_attempt(&mut self, attempt: Option<AttemptId>) {
        let Some(attempt) = attempt else {
            return;
        };
        self.retry = None;
        self.publish_status();

        let transport = Arc::clone(&self.transport);
        let url = self.config.connect_url();
        let inbox = self.inbox_tx.clone();
        log::debug!("Opening push channel {url}");
        tokio::spawn(async move {
            let result = transport.open(&url).await;
            let _ = inbox.send(Completion::Opened { attempt, result }).await;
        });
    }

    fn link_opened(&mut self, attempt: AttemptId, result: Result<TransportLink, TransportError>) {
        match result {
            Ok(link) => {
                if !self.connection.connected(attempt) {
                    log::debug!("Discarding link from a cancelled attempt");
                    link.close();
                    return;
                }
                log::info!("Connected to CivicFix real-time updates");
                self.link = Some(link);
                self.publish_status();

                let joins = self.membership.on_connected(&self.identity);
                self.send_commands(joins);
            }
            Err(e) => {
                let decision = self.connection.connect_failed(attempt);
                if decision != RetryDecision::Ignored {
                    log::error!("Connection error: {e}");
                }
                self.apply_retry(decision);
            }
        }
    }

    fn handle_link_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(frame)) => {
                let ctx = DispatchContext {
                    view: &self.view,
                    membership: &self.membership,
                    identity: &self.identity,
                };
                let reactions = self.dispatcher.dispatch_frame(frame, &mut self.board, ctx);
                for reaction in reactions {
                    self.react(reaction);
                }
            }
            Some(TransportEvent::Malformed(e)) => log::warn!("Dropping push frame: {e}"),
            Some(TransportEvent::Closed { reason }) => self.link_lost(reason),
            None => self.link_lost(None),
        }
    }

    fn link_lost(&mut self, reason: Option<String>) {
        self.link = None;
        self.membership.on_disconnected();
        match reason {
            Some(reason) => log::info!("Disconnected from real-time updates: {reason}"),
            None => log::info!("Disconnected from real-time updates"),
        }
        let decision = self.connection.link_lost();
        self.apply_retry(decision);
    }

    fn apply_retry(&mut self, decision: RetryDecision) {
        match decision {
            RetryDecision::Retry { delay, .. } => {
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            RetryDecision::Abandoned => self.retry = None,
            RetryDecision::Ignored => {}
        }
        self.publish_status();
    }

    fn disconnect(&mut self) {
        let changed = self.connection.disconnect();
        self.retry = None;
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.membership.on_disconnected();
        if changed {
            log::info!("Disconnected from push channel");
        }
        self.publish_status();
    }

    fn publish_status(&mut self) {
        let status = self.connection.status();
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            log::debug!("Connection status: {status:?}");
            self.display.connection_changed(status);
        }
    }

    fn send_commands(&mut self, commands: Vec<ClientCommand>) {
        let Some(link) = &self.link else {
            return;
        };
        for command in commands {
            let frame = command.to_frame();
            let name = frame.event.clone();
            if let Err(e) = link.emit(frame) {
                log::warn!("Failed to send '{name}': {e}");
            }
        }
    }

    fn handle_identity_change(&mut self) {
        let identity = self.identity_rx.borrow_and_update().clone();
        if identity == self.identity {
            return;
        }
        log::info!(
            "Session identity changed (authenticated: {}, admin: {})",
            identity.is_authenticated(),
            identity.is_admin
        );
        self.identity = identity;

        if self.connection.is_connected() {
            let commands = self.membership.on_identity_changed(&self.identity);
            self.send_commands(commands);
        }
        if self.identity.is_authenticated() {
            self.refresh_unread();
        } else {
            self.display.set_notification_badge(0);
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Events and listing
    // ───────────────────────────────────────────────────────────────

    fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::Field(issue, update) => {
                if let FieldUpdate::Votes(votes) = &update {
                    // The voter's own echo lands here too, so a later rollback keeps its count.
                    let count = votes.count;
                    self.mutations
                        .rebase_baseline(&MutationKey::vote(issue), |baseline| baseline.count = count);
                }
                self.display.update_field(issue, &update);
            }
            Reaction::Notice(notice) => self.display.show_notice(&notice),
            Reaction::Refetch(query) => self.refetch(query),
            Reaction::RefreshNotificationCount => self.refresh_unread(),
            Reaction::RoomAcknowledged(room) => self.membership.acknowledge(&room),
        }
    }

    fn navigate(&mut self, view: View) {
        log::debug!("Navigating to {view:?}");
        self.view = view;
        // Any listing still in flight belongs to the previous view
        self.listing_request += 1;

        match &self.view {
            View::Listing(query) | View::AdminDashboard(query) => {
                let query = query.clone();
                self.refetch(query);
            }
            View::Detail(id) => {
                match self.board.get(*id).cloned() {
                    Some(issue) => self.board.show_single(issue),
                    None => self.board.clear(),
                }
                self.display.render_listing(&self.board);
            }
        }
    }

    fn refetch(&mut self, query: ListingQuery) {
        self.listing_request += 1;
        let request = self.listing_request;
        let api = Arc::clone(&self.api);
        let identity = self.identity.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_listing(&query, &identity).await;
            let _ = inbox.send(Completion::ListingFetched { request, result }).await;
        });
    }

    fn listing_fetched(&mut self, request: u64, result: Result<ListingPage, ApiError>) {
        if request != self.listing_request {
            log::debug!("Discarding stale listing response {request}");
            return;
        }
        match result {
            Ok(page) => {
                self.board.replace(page);
                self.overlay_pending();
                self.display.render_listing(&self.board);
            }
            Err(e) => {
                log::error!("Error loading issues: {e}");
                self.display.show_notice(&Notice::error(LOAD_FAILED));
            }
        }
    }

    /// Keep pending votes visible over freshly fetched rows.
    ///
    /// The fetched row becomes the rollback baseline. If it does not yet
    /// carry the user's pending toggle, the toggle is applied on top.
    fn overlay_pending(&mut self) {
        let keys: Vec<MutationKey> = self.mutations.pending_keys().copied().collect();
        for key in keys {
            let Some(fetched) = self.board.votes(key.target) else {
                continue;
            };
            let Some(pending) = self.mutations.speculative(&key).copied() else {
                continue;
            };
            let overlay = if fetched.user_has_voted == pending.user_has_voted {
                fetched
            } else {
                fetched.toggled()
            };
            self.mutations.rebase(&key, fetched, overlay);
            self.board.set_votes(key.target, overlay);
        }
    }

    fn refresh_unread(&mut self) {
        if !self.identity.is_authenticated() {
            return;
        }
        let api = Arc::clone(&self.api);
        let identity = self.identity.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_unread_count(&identity).await;
            let _ = inbox.send(Completion::UnreadCounted(result)).await;
        });
    }

    // ───────────────────────────────────────────────────────────────
    // Votes
    // ───────────────────────────────────────────────────────────────

    fn vote(&mut self, issue: IssueId) {
        if !self.identity.is_authenticated() {
            self.display.show_notice(&Notice::warning(LOGIN_TO_VOTE));
            return;
        }
        let Some(current) = self.board.votes(issue) else {
            log::warn!("Vote on issue {issue} ignored: not displayed");
            return;
        };

        let key = MutationKey::vote(issue);
        let speculative = current.toggled();
        let ticket = self.mutations.apply_optimistic(key, current, speculative);
        if let Some(update) = self.board.set_votes(issue, speculative) {
            self.display.update_field(issue, &update);
        }
        let notice = if speculative.user_has_voted {
            Notice::success("Voted!")
        } else {
            Notice::info("Vote removed")
        };
        self.display.show_notice(&notice.quick());

        let api = Arc::clone(&self.api);
        let identity = self.identity.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = api.submit_vote(issue, &identity).await;
            let _ = inbox
                .send(Completion::VoteResolved {
                    issue,
                    ticket,
                    result,
                })
                .await;
        });
    }

    fn vote_resolved(
        &mut self,
        issue: IssueId,
        ticket: Ticket,
        result: Result<VoteReceipt, ApiError>,
    ) {
        let key = MutationKey::vote(issue);
        match self
            .mutations
            .resolve(key, ticket, result.map(VoteReceipt::into_state))
        {
            Resolution::Confirmed(votes) => {
                if let Some(update) = self.board.set_votes(issue, votes) {
                    self.display.update_field(issue, &update);
                }
            }
            Resolution::RolledBack { baseline, error } => {
                log::error!("Error voting on issue {issue}: {error}");
                if let Some(update) = self.board.set_votes(issue, baseline) {
                    self.display.update_field(issue, &update);
                }
                let text = match &error {
                    ApiError::Status { .. } => error.server_message().unwrap_or(VOTE_REJECTED),
                    _ => VOTE_FAILED,
                };
                self.display.show_notice(&Notice::error(text));
            }
            Resolution::Superseded | Resolution::Stale => {
                log::debug!("Vote response for issue {issue} superseded");
            }
        }
    }

    fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            status: self.connection.status(),
            view: self.view.clone(),
            issues: self.board.items().to_vec(),
            rooms: self.membership.joined().cloned().collect(),
            acknowledged_rooms: self
                .membership
                .joined()
                .filter(|room| self.membership.is_acknowledged(room))
                .cloned()
                .collect(),
            retry_count: self.connection.retry_count(),
            pending_mutations: self.mutations.pending_count(),
            dispatch: self.dispatcher.stats(),
        }
    }
}

async fn next_link_event(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.next_event().await,
        None => pending().await,
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_appends_client_id() {
        let mut config = LiveConfig::new("ws://example.test/live");
        config.client_id = Uuid::nil();
        assert_eq!(
            config.connect_url(),
            "ws://example.test/live?tab_id=00000000-0000-0000-0000-000000000000"
        );

        config.endpoint = "ws://example.test/live?v=2".into();
        assert!(config.connect_url().starts_with("ws://example.test/live?v=2&tab_id="));
    }

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::Stopped.to_string(), "Live session stopped");
    }
}
