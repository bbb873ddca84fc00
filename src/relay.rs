//! Relay instance: owns one [`RelaySession`] and applies the drop/log policy
//! to every inbound frame.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::protocol::SignalingMessage;
use crate::session::{Connection, DropReason, Occupancy, RelaySession, Role, Routing};

/// Cloneable handle to one relay's state. Separate instances share nothing.
#[derive(Clone, Default)]
pub struct Relay {
    session: Arc<Mutex<RelaySession>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh, unidentified connection.
    pub fn connect(&self, outbox: mpsc::UnboundedSender<String>) -> Connection {
        let conn = Connection::new(outbox);
        info!("peer {} connected", conn.id());
        conn
    }

    /// Parses one text frame and routes it. Each call runs to completion
    /// under the session lock before the next frame is looked at.
    pub async fn dispatch(&self, conn: &Connection, text: &str) -> Result<Routing, ProtocolError> {
        let msg = match SignalingMessage::parse(text) {
            Ok(msg) => msg,
            Err(ProtocolError::UnknownType(kind)) => {
                debug!("peer {}: ignoring frame of type `{}`", conn.id(), kind);
                return Err(ProtocolError::UnknownType(kind));
            }
            Err(err) => {
                warn!("peer {}: dropping malformed frame: {}", conn.id(), err);
                return Err(err);
            }
        };

        let kind = msg.kind();
        let routing = self.session.lock().await.handle(conn, msg);
        log_routing(conn, kind, &routing);
        Ok(routing)
    }

    pub async fn disconnect(&self, conn: &Connection) -> Vec<Role> {
        let released = self.session.lock().await.disconnect(conn.id());
        if released.is_empty() {
            info!("peer {} disconnected", conn.id());
        }
        for role in &released {
            info!("{} {} disconnected", role, conn.id());
        }
        released
    }

    pub async fn occupancy(&self) -> Occupancy {
        self.session.lock().await.occupancy()
    }
}

fn log_routing(conn: &Connection, kind: &str, routing: &Routing) {
    match routing {
        Routing::Identified {
            role,
            replaced: Some(previous),
        } => info!("{} identified as {} (replacing {})", conn.id(), role, previous),
        Routing::Identified { role, replaced: None } => {
            info!("{} identified as {}", conn.id(), role)
        }
        Routing::Forwarded { to } => debug!("forwarding {} from {} to {}", kind, conn.id(), to),
        Routing::Dropped(DropReason::NoPeer(role)) => {
            debug!("dropping {} from {}: no {} connected", kind, conn.id(), role)
        }
        Routing::Dropped(DropReason::Unidentified) => debug!(
            "dropping {} from {}: connection holds no role",
            kind,
            conn.id()
        ),
        Routing::Dropped(DropReason::PeerGone(role)) => {
            warn!("dropping {} from {}: {} socket closed", kind, conn.id(), role)
        }
        Routing::Dropped(DropReason::Encode) => {
            warn!("dropping {} from {}: could not encode frame", kind, conn.id())
        }
    }
}
