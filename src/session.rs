//! Role slots and the routing rules between them.
//!
//! A [`RelaySession`] holds at most one sender and one receiver. It never
//! looks inside negotiation payloads; the message tag and the identity of
//! the connection that sent it decide where a frame goes.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{ForwardFrame, SignalingMessage};

pub type ConnId = Uuid;

/// Handle for writing frames to one peer's socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnId,
    outbox: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(outbox: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbox,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queues a frame for the socket writer. Returns false once the writer
    /// has gone away.
    pub fn send(&self, frame: String) -> bool {
        self.outbox.send(frame).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// One role slot: `Empty → Occupied(conn)`.
///
/// Occupying an already occupied slot replaces the holder. The displaced
/// connection keeps its socket; it just stops being addressable by role.
#[derive(Debug, Default)]
pub enum Slot {
    #[default]
    Empty,
    Occupied(Connection),
}

impl Slot {
    pub fn occupy(&mut self, conn: Connection) -> Option<Connection> {
        match std::mem::replace(self, Slot::Occupied(conn)) {
            Slot::Occupied(previous) => Some(previous),
            Slot::Empty => None,
        }
    }

    /// Empties the slot if `id` holds it.
    pub fn vacate(&mut self, id: ConnId) -> bool {
        if self.holds(id) {
            *self = Slot::Empty;
            true
        } else {
            false
        }
    }

    pub fn holds(&self, id: ConnId) -> bool {
        matches!(self, Slot::Occupied(conn) if conn.id == id)
    }

    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Slot::Occupied(conn) => Some(conn),
            Slot::Empty => None,
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    Identified {
        role: Role,
        replaced: Option<ConnId>,
    },
    Forwarded {
        to: Role,
    },
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Nobody holds the slot the message is addressed to.
    NoPeer(Role),
    /// A candidate from a connection that holds neither slot.
    Unidentified,
    /// The target's socket writer is already gone.
    PeerGone(Role),
    /// The outbound frame could not be encoded.
    Encode,
}

/// Which connections currently hold a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub sender: Option<ConnId>,
    pub receiver: Option<ConnId>,
}

#[derive(Debug, Default)]
pub struct RelaySession {
    sender: Slot,
    receiver: Slot,
}

impl RelaySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: Role) -> &Slot {
        match role {
            Role::Sender => &self.sender,
            Role::Receiver => &self.receiver,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Slot {
        match role {
            Role::Sender => &mut self.sender,
            Role::Receiver => &mut self.receiver,
        }
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            sender: self.sender.connection().map(Connection::id),
            receiver: self.receiver.connection().map(Connection::id),
        }
    }

    /// Role currently held by `id`, sender checked first.
    pub fn role_of(&self, id: ConnId) -> Option<Role> {
        if self.sender.holds(id) {
            Some(Role::Sender)
        } else if self.receiver.holds(id) {
            Some(Role::Receiver)
        } else {
            None
        }
    }

    pub fn handle(&mut self, from: &Connection, msg: SignalingMessage) -> Routing {
        match msg {
            SignalingMessage::IdentifyAsSender => self.identify(Role::Sender, from),
            SignalingMessage::IdentifyAsReceiver => self.identify(Role::Receiver, from),
            SignalingMessage::Offer { sdp } => {
                self.forward(Role::Receiver, ForwardFrame::offer(&sdp))
            }
            SignalingMessage::Answer { sdp } => {
                self.forward(Role::Sender, ForwardFrame::answer(&sdp))
            }
            SignalingMessage::IceCandidate { candidate } => match self.role_of(from.id()) {
                Some(role) => {
                    self.forward(role.opposite(), ForwardFrame::ice_candidate(&candidate))
                }
                None => Routing::Dropped(DropReason::Unidentified),
            },
        }
    }

    fn identify(&mut self, role: Role, conn: &Connection) -> Routing {
        let replaced = self
            .slot_mut(role)
            .occupy(conn.clone())
            .map(|previous| previous.id());
        Routing::Identified { role, replaced }
    }

    fn forward(&self, to: Role, frame: ForwardFrame<'_>) -> Routing {
        let Some(target) = self.slot(to).connection() else {
            return Routing::Dropped(DropReason::NoPeer(to));
        };
        let Ok(text) = frame.to_json() else {
            return Routing::Dropped(DropReason::Encode);
        };
        if target.send(text) {
            Routing::Forwarded { to }
        } else {
            Routing::Dropped(DropReason::PeerGone(to))
        }
    }

    /// Releases every slot held by `id` and returns the roles it lost.
    pub fn disconnect(&mut self, id: ConnId) -> Vec<Role> {
        [Role::Sender, Role::Receiver]
            .into_iter()
            .filter(|role| self.slot_mut(*role).vacate(id))
            .collect()
    }
}
