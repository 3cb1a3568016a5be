//! Room membership.
//!
//! Tracks which server-side rooms this client has asked to join and turns
//! connection and identity changes into join/leave commands. Membership
//! does not survive a transport disconnect, so every (re)connect starts
//! from an empty set.

use std::collections::BTreeSet;

use civic_core::SessionIdentity;

use crate::protocol::{ClientCommand, Room};

/// Rooms joined on the current link.
#[derive(Debug, Clone, Default)]
pub struct RoomMembership {
    joined: BTreeSet<Room>,
    acknowledged: BTreeSet<String>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooms an identity should be in.
    pub fn desired(identity: &SessionIdentity) -> BTreeSet<Room> {
        let mut rooms = BTreeSet::new();
        if let Some(user_id) = &identity.user_id {
            rooms.insert(Room::User(user_id.clone()));
        }
        if identity.is_admin {
            rooms.insert(Room::Admins);
        }
        rooms
    }

    /// A link was established: join every applicable room.
    pub fn on_connected(&mut self, identity: &SessionIdentity) -> Vec<ClientCommand> {
        self.joined.clear();
        self.acknowledged.clear();
        self.reconcile(identity)
    }

    /// Identity changed while connected: join new rooms, leave stale ones.
    pub fn on_identity_changed(&mut self, identity: &SessionIdentity) -> Vec<ClientCommand> {
        self.reconcile(identity)
    }

    /// The link is gone; the server forgot us.
    pub fn on_disconnected(&mut self) {
        self.joined.clear();
        self.acknowledged.clear();
    }

    fn reconcile(&mut self, identity: &SessionIdentity) -> Vec<ClientCommand> {
        let desired = Self::desired(identity);

        let mut commands: Vec<ClientCommand> = self
            .joined
            .difference(&desired)
            .cloned()
            .map(ClientCommand::Leave)
            .collect();
        commands.extend(
            desired
                .difference(&self.joined)
                .cloned()
                .map(ClientCommand::Join),
        );

        for command in &commands {
            match command {
                ClientCommand::Join(room) => {
                    log::debug!("Joining room {room}");
                    self.joined.insert(room.clone());
                }
                ClientCommand::Leave(room) => {
                    log::debug!("Leaving room {room}");
                    self.joined.remove(room);
                    self.acknowledged.remove(&room.name());
                }
            }
        }
        commands
    }

    /// Record a `joined_room` acknowledgement.
    pub fn acknowledge(&mut self, room: &str) {
        if self.joined.iter().any(|r| r.name() == room) {
            log::info!("Joined room: {room}");
            self.acknowledged.insert(room.to_string());
        } else {
            log::debug!("Acknowledgement for room not requested: {room}");
        }
    }

    /// Whether a join for `room` has been issued on this link.
    pub fn holds(&self, room: &Room) -> bool {
        self.joined.contains(room)
    }

    pub fn is_acknowledged(&self, room: &Room) -> bool {
        self.acknowledged.contains(&room.name())
    }

    pub fn joined(&self) -> impl Iterator<Item = &Room> {
        self.joined.iter()
    }
}
