//! # civic-live: Real-time sync layer for the CivicFix client
//!
//! Keeps a client's view of issues current while the server pushes status
//! changes, vote counts and new reports, and applies the user's own votes
//! optimistically.
//!
//! ## Architecture
//!
//! ```text
//!  LiveHandle ──commands──►┌──────────────────────────────┐
//!  identity watch ────────►│         LiveSession          │──► DisplaySurface
//!                          │ ConnectionManager (backoff)  │
//!  Transport ◄──frames────►│ RoomMembership               │
//!  (WebSocket, JSON)       │ EventDispatcher → IssueBoard │
//!                          │ MutationCoordinator          │
//!  IssueApi (REST) ◄──────►└──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON event frames, typed server events, room commands
//! - [`transport`]: push-channel transport trait and WebSocket implementation
//! - [`connection`]: connection lifecycle with exponential backoff
//! - [`rooms`]: room membership derived from the session identity
//! - [`dispatcher`]: applies pushed events to the displayed board
//! - [`optimistic`]: optimistic mutations with rollback
//! - [`collaborators`]: REST, display and identity seams
//! - [`session`]: the single-owner session task tying it together

pub mod protocol;
pub mod transport;
pub mod connection;
pub mod rooms;
pub mod dispatcher;
pub mod optimistic;
pub mod collaborators;
pub mod session;

// Re-exports for convenience
pub use protocol::{ClientCommand, EventFrame, ProtocolError, Room, ServerEvent};
pub use transport::{Transport, TransportError, TransportEvent, TransportLink, WsTransport};
pub use connection::{ConnectionManager, ConnectionStatus, ReconnectPolicy, RetryDecision};
pub use rooms::RoomMembership;
pub use dispatcher::{DispatchContext, DispatchStats, EventDispatcher, Reaction};
pub use optimistic::{MutationCoordinator, MutationKey, Resolution, Ticket};
pub use collaborators::{
    identity_channel, ApiError, DisplaySurface, IdentityPublisher, IssueApi, VoteAction,
    VoteReceipt,
};
pub use session::{BoardSnapshot, LiveConfig, LiveHandle, LiveSession, SessionError};
