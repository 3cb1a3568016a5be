//! Shared fixtures: a scripted transport, a recording display, a scripted
//! REST API and a real in-process WebSocket push server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use civic_core::{
    FieldUpdate, IssueBoard, IssueId, IssueRecord, IssueView, ListingPage, ListingQuery, Notice,
    SessionIdentity, UserId,
};
use civic_live::protocol::{commands, events};
use civic_live::{
    identity_channel, ApiError, BoardSnapshot, ConnectionStatus, DisplaySurface, EventFrame,
    IdentityPublisher, IssueApi, LiveConfig, LiveHandle, LiveSession, ReconnectPolicy, Transport,
    TransportError, TransportEvent, TransportLink, VoteAction, VoteReceipt,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

// ───────────────────────────────────────────────────────────────────
// Scripted transport
// ───────────────────────────────────────────────────────────────────

/// Server side of a mock link.
pub struct MockPeer {
    pub sent: mpsc::Receiver<EventFrame>,
    pub events: mpsc::Sender<TransportEvent>,
}

impl MockPeer {
    /// Next frame the client sent.
    pub async fn recv(&mut self) -> EventFrame {
        timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client link closed")
    }

    pub async fn push(&self, event: &str, data: serde_json::Value) {
        self.events
            .send(TransportEvent::Frame(EventFrame::new(event, data)))
            .await
            .expect("client link closed");
    }

    pub async fn close(&self) {
        let _ = self
            .events
            .send(TransportEvent::Closed {
                reason: Some("server going away".into()),
            })
            .await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
}

struct MockState {
    script: VecDeque<Outcome>,
    fallback: Outcome,
    opens: Vec<Instant>,
}

/// Transport whose handshakes succeed or fail on script.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockTransport {
    /// Returns the transport and the stream of accepted peers.
    pub fn new(fallback: Outcome) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fallback,
                opens: Vec::new(),
            })),
            peers,
        };
        (transport, peer_rx)
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    /// When each handshake started.
    pub fn opens(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }
}

impl Transport for MockTransport {
    async fn open(&self, _endpoint: &str) -> Result<TransportLink, TransportError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.opens.push(Instant::now());
            let fallback = state.fallback;
            state.script.pop_front().unwrap_or(fallback)
        };

        match outcome {
            Outcome::Refuse => Err(TransportError::Handshake("connection refused".into())),
            Outcome::Accept => {
                let (out_tx, out_rx) = mpsc::channel(64);
                let (evt_tx, evt_rx) = mpsc::channel(64);
                let _ = self.peers.send(MockPeer {
                    sent: out_rx,
                    events: evt_tx,
                });
                Ok(TransportLink::new(out_tx, evt_rx))
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Recording display
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub renders: Vec<Vec<IssueView>>,
    pub fields: Vec<(IssueId, FieldUpdate)>,
    pub notices: Vec<Notice>,
    pub badge: Option<u32>,
    pub statuses: Vec<ConnectionStatus>,
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn notices(&self) -> Vec<Notice> {
        self.log.lock().unwrap().notices.clone()
    }

    pub fn notice_texts(&self) -> Vec<String> {
        self.notices().into_iter().map(|n| n.text).collect()
    }

    pub fn fields(&self) -> Vec<(IssueId, FieldUpdate)> {
        self.log.lock().unwrap().fields.clone()
    }

    pub fn badge(&self) -> Option<u32> {
        self.log.lock().unwrap().badge
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.log.lock().unwrap().statuses.clone()
    }

    pub fn render_count(&self) -> usize {
        self.log.lock().unwrap().renders.len()
    }
}

impl DisplaySurface for RecordingSurface {
    fn render_listing(&mut self, board: &IssueBoard) {
        self.log.lock().unwrap().renders.push(board.items().to_vec());
    }

    fn update_field(&mut self, issue: IssueId, update: &FieldUpdate) {
        self.log.lock().unwrap().fields.push((issue, update.clone()));
    }

    fn show_notice(&mut self, notice: &Notice) {
        self.log.lock().unwrap().notices.push(notice.clone());
    }

    fn set_notification_badge(&mut self, unread: u32) {
        self.log.lock().unwrap().badge = Some(unread);
    }

    fn connection_changed(&mut self, status: ConnectionStatus) {
        self.log.lock().unwrap().statuses.push(status);
    }
}

// ───────────────────────────────────────────────────────────────────
// Scripted REST API
// ───────────────────────────────────────────────────────────────────

/// A vote request waiting for the test to answer it.
pub struct PendingVote {
    pub issue: IssueId,
    reply: oneshot::Sender<Result<VoteReceipt, ApiError>>,
}

impl PendingVote {
    pub fn confirm(self, action: VoteAction, vote_count: u32) {
        let _ = self.reply.send(Ok(VoteReceipt { action, vote_count }));
    }

    pub fn fail(self, error: ApiError) {
        let _ = self.reply.send(Err(error));
    }
}

struct ApiState {
    listing: ListingPage,
    listing_calls: Vec<ListingQuery>,
    unread: u32,
}

/// Listing and unread count answer immediately; votes wait for the test.
#[derive(Clone)]
pub struct ScriptedApi {
    state: Arc<Mutex<ApiState>>,
    votes: mpsc::UnboundedSender<PendingVote>,
}

impl ScriptedApi {
    pub fn new(listing: ListingPage) -> (Self, mpsc::UnboundedReceiver<PendingVote>) {
        let (votes, vote_rx) = mpsc::unbounded_channel();
        let api = Self {
            state: Arc::new(Mutex::new(ApiState {
                listing,
                listing_calls: Vec::new(),
                unread: 0,
            })),
            votes,
        };
        (api, vote_rx)
    }

    pub fn set_listing(&self, listing: ListingPage) {
        self.state.lock().unwrap().listing = listing;
    }

    pub fn set_unread(&self, unread: u32) {
        self.state.lock().unwrap().unread = unread;
    }

    pub fn listing_calls(&self) -> Vec<ListingQuery> {
        self.state.lock().unwrap().listing_calls.clone()
    }
}

#[async_trait]
impl IssueApi for ScriptedApi {
    async fn fetch_listing(
        &self,
        query: &ListingQuery,
        _identity: &SessionIdentity,
    ) -> Result<ListingPage, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.listing_calls.push(query.clone());
        Ok(state.listing.clone())
    }

    async fn submit_vote(
        &self,
        issue: IssueId,
        _identity: &SessionIdentity,
    ) -> Result<VoteReceipt, ApiError> {
        let (reply, answer) = oneshot::channel();
        self.votes
            .send(PendingVote { issue, reply })
            .map_err(|_| ApiError::Network("test finished".into()))?;
        answer
            .await
            .unwrap_or_else(|_| Err(ApiError::Network("no answer".into())))
    }

    async fn fetch_unread_count(&self, _identity: &SessionIdentity) -> Result<u32, ApiError> {
        Ok(self.state.lock().unwrap().unread)
    }
}

pub async fn next_vote(votes: &mut mpsc::UnboundedReceiver<PendingVote>) -> PendingVote {
    timeout(Duration::from_secs(5), votes.recv())
        .await
        .expect("timed out waiting for vote request")
        .expect("api dropped")
}

// ───────────────────────────────────────────────────────────────────
// Data and session harness
// ───────────────────────────────────────────────────────────────────

pub fn issue(id: u64, votes: u32, owner: Option<&str>) -> IssueRecord {
    IssueRecord {
        id: IssueId(id),
        title: format!("Issue {id}"),
        status: "Open".into(),
        category: Some("roads".into()),
        vote_count: votes,
        user_id: owner.map(UserId::new),
        user_has_voted: false,
    }
}

pub fn page(issues: Vec<IssueRecord>) -> ListingPage {
    ListingPage {
        total: issues.len() as u64,
        issues,
        pages: 1,
        current_page: 1,
    }
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
        max_attempts: 3,
    }
}

pub struct Harness {
    pub handle: LiveHandle,
    pub identity: IdentityPublisher,
    pub surface: RecordingSurface,
    pub api: ScriptedApi,
    pub votes: mpsc::UnboundedReceiver<PendingVote>,
}

pub fn start<T: Transport>(
    config: LiveConfig,
    transport: T,
    identity: SessionIdentity,
    listing: ListingPage,
) -> Harness {
    let (publisher, identity_rx) = identity_channel(identity);
    let surface = RecordingSurface::default();
    let (api, votes) = ScriptedApi::new(listing);
    let (session, handle) = LiveSession::new(
        config,
        transport,
        Arc::new(api.clone()),
        Box::new(surface.clone()),
        identity_rx,
    );
    session.spawn();
    Harness {
        handle,
        identity: publisher,
        surface,
        api,
        votes,
    }
}

/// Poll snapshots until `check` passes.
pub async fn eventually(
    handle: &LiveHandle,
    check: impl Fn(&BoardSnapshot) -> bool,
) -> BoardSnapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = handle.snapshot().await.expect("session stopped");
        if check(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "condition not reached, last snapshot: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll a shared-state condition until it holds.
pub async fn until(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting: {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_status(handle: &LiveHandle, status: ConnectionStatus) {
    let mut rx = handle.watch_status();
    timeout(Duration::from_secs(60), rx.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("status never became {status:?}"))
        .expect("session stopped");
}

// ───────────────────────────────────────────────────────────────────
// In-process WebSocket push server
// ───────────────────────────────────────────────────────────────────

enum ServerOp {
    Push(EventFrame),
    Drop,
}

/// Minimal push server speaking the JSON frame protocol.
///
/// Greets each connection with `connected`, acknowledges room joins with
/// `joined_room`, and records every frame it receives.
pub struct PushServer {
    pub port: u16,
    received: mpsc::UnboundedReceiver<(usize, EventFrame)>,
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<ServerOp>>>>,
}

impl PushServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (received_tx, received) = mpsc::unbounded_channel();
        let clients: Arc<Mutex<Vec<mpsc::UnboundedSender<ServerOp>>>> = Arc::default();

        let registry = clients.clone();
        tokio::spawn(async move {
            let mut next_id = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let id = next_id;
                next_id += 1;
                let (op_tx, op_rx) = mpsc::unbounded_channel();
                registry.lock().unwrap().push(op_tx);
                tokio::spawn(serve_client(id, ws, op_rx, received_tx.clone()));
            }
        });

        Self {
            port,
            received,
            clients,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/live", self.port)
    }

    /// Next frame from any client, with its connection number.
    pub async fn next_frame(&mut self) -> (usize, EventFrame) {
        timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server stopped")
    }

    /// Send an event to every connected client.
    pub fn push(&self, event: &str, data: serde_json::Value) {
        let frame = EventFrame::new(event, data);
        for client in self.clients.lock().unwrap().iter() {
            let _ = client.send(ServerOp::Push(frame.clone()));
        }
    }

    /// Close every client connection.
    pub fn drop_clients(&self) {
        for client in self.clients.lock().unwrap().drain(..) {
            let _ = client.send(ServerOp::Drop);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

async fn serve_client(
    id: usize,
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut ops: mpsc::UnboundedReceiver<ServerOp>,
    received: mpsc::UnboundedSender<(usize, EventFrame)>,
) {
    let (mut writer, mut reader) = ws.split();
    let send = |frame: EventFrame| Message::Text(frame.encode().unwrap().into());

    let welcome = EventFrame::new(events::CONNECTED, json!({"message": "Connected to CivicFix"}));
    if writer.send(send(welcome)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            op = ops.recv() => match op {
                Some(ServerOp::Push(frame)) => {
                    if writer.send(send(frame)).await.is_err() {
                        break;
                    }
                }
                Some(ServerOp::Drop) | None => {
                    let _ = writer.close().await;
                    break;
                }
            },
            msg = reader.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = EventFrame::decode(text.as_str()) else {
                        continue;
                    };
                    let ack = match frame.event.as_str() {
                        commands::JOIN_USER_ROOM => frame.data["user_id"]
                            .as_str()
                            .map(|user| format!("user_{user}")),
                        commands::JOIN_ADMIN_ROOM => Some("admins".to_string()),
                        _ => None,
                    };
                    let _ = received.send((id, frame));
                    if let Some(room) = ack {
                        let ack = EventFrame::new(events::JOINED_ROOM, json!({ "room": room }));
                        if writer.send(send(ack)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
