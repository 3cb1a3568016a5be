//! Push-channel transport.
//!
//! A [`Transport`] opens a [`TransportLink`] to an endpoint. The link is a
//! pair of channels: frames to `emit` go out, [`TransportEvent`]s come in.
//! A successful `open` is the transport's `connect`, a failed one its
//! `connect_error`, and [`TransportEvent::Closed`] its `disconnect`.
//!
//! ```text
//!              emit(frame)                       ┌──────────────┐
//!  session ──────────────► outgoing mpsc ──────► │ writer task  │ ──► WebSocket
//!                                                └──────────────┘
//!                                                ┌──────────────┐
//!  session ◄────────────── events mpsc ◄──────── │ reader task  │ ◄── WebSocket
//!          next_event()                          └──────────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{EventFrame, ProtocolError};

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A well-formed frame from the server.
    Frame(EventFrame),
    /// A frame that could not be decoded.
    Malformed(ProtocolError),
    /// The link is gone. No further events follow.
    Closed { reason: Option<String> },
}

/// An open connection.
///
/// Dropping the link tears it down; [`TransportLink::close`] does so
/// gracefully.
pub struct TransportLink {
    outgoing: mpsc::Sender<EventFrame>,
    events: mpsc::Receiver<TransportEvent>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl TransportLink {
    /// Build a link from raw channels (custom transports, tests).
    pub fn new(outgoing: mpsc::Sender<EventFrame>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            outgoing,
            events,
            reader: None,
            writer: None,
        }
    }

    fn with_tasks(mut self, reader: JoinHandle<()>, writer: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self.writer = Some(writer);
        self
    }

    /// Queue a frame for sending without waiting.
    pub fn emit(&self, frame: EventFrame) -> Result<(), TransportError> {
        self.outgoing.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::LinkClosed,
        })
    }

    /// Next event from the link; `None` once the link is fully drained.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Close gracefully: flush queued frames, then send a close frame.
    pub fn close(mut self) {
        // Letting the writer run to completion sends the close handshake.
        self.writer.take();
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLink")
            .field("closed", &self.outgoing.is_closed())
            .finish()
    }
}

/// Opens links to a push endpoint.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<TransportLink, TransportError>> + Send;
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The handshake was refused or failed.
    Handshake(String),
    /// The handshake did not finish in time.
    Timeout,
    /// The link is already closed.
    LinkClosed,
    /// Outgoing buffer full.
    Backpressure,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(e) => write!(f, "Handshake failed: {e}"),
            Self::Timeout => write!(f, "Handshake timed out"),
            Self::LinkClosed => write!(f, "Link closed"),
            Self::Backpressure => write!(f, "Outgoing buffer full"),
        }
    }
}

impl std::error::Error for TransportError {}

// ───────────────────────────────────────────────────────────────────
// WebSocket transport
// ───────────────────────────────────────────────────────────────────

/// JSON-over-WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsTransport {
    handshake_timeout: Duration,
    buffer: usize,
}

impl WsTransport {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            buffer: 256,
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

impl Transport for WsTransport {
    async fn open(&self, endpoint: &str) -> Result<TransportLink, TransportError> {
        let (ws_stream, _) =
            tokio::time::timeout(self.handshake_timeout, tokio_tungstenite::connect_async(endpoint))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<EventFrame>(self.buffer);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.buffer);

        // Writer task: forward outgoing frames, close when the sender drops
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("Dropping unencodable '{}' frame: {e}", frame.event);
                        continue;
                    }
                };
                log::trace!("→ {text}");
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: decode incoming frames until the socket goes away
        let reader = tokio::spawn(async move {
            let reason = loop {
                match ws_reader.next().await {
                    Some(Ok(Message::Text(text))) => {
                        log::trace!("← {}", text.as_str());
                        let event = match EventFrame::decode(text.as_str()) {
                            Ok(frame) => TransportEvent::Frame(frame),
                            Err(e) => TransportEvent::Malformed(e),
                        };
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.as_str().to_string()).filter(|r| !r.is_empty());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            };
            let _ = event_tx.send(TransportEvent::Closed { reason }).await;
        });

        Ok(TransportLink::new(out_tx, event_rx).with_tasks(reader, writer))
    }
}
