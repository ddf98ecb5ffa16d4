//! Connection registry and event fan-out: broadcast to every live
//! connection, or reply privately to one.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::events::ServerEvent;

pub type ConnId = String;

/// Registry of live connections and the fan-out primitive the router uses
/// to emit broadcasts (to all) and private replies (to one).
#[derive(Default)]
pub struct Broadcaster {
    connections: DashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn_id: ConnId, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.connections.insert(conn_id, sender);
    }

    pub fn unregister(&self, conn_id: &str) {
        self.connections.remove(conn_id);
    }

    /// Emits to every live connection. A disconnected peer's send simply
    /// fails silently here; its teardown is driven by its own socket loop.
    pub fn broadcast(&self, event: ServerEvent) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    /// Emits to every connection except one — used for presence fan-out,
    /// where the excluded connection already has the current list from its
    /// own snapshot/disconnect path.
    pub fn broadcast_except(&self, exclude: &str, event: ServerEvent) {
        for entry in self.connections.iter() {
            if entry.key() != exclude {
                let _ = entry.value().send(event.clone());
            }
        }
    }

    pub fn send_private(&self, conn_id: &str, event: ServerEvent) {
        if let Some(sender) = self.connections.get(conn_id) {
            let _ = sender.send(event);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
