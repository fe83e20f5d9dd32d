use std::{net::SocketAddr, time::Duration};

use rolenet_core::{
    event::{ErrorNotification, EventKind, NetworkEvent},
    transport::{Connection, ConnectionId, EventSink},
};

/// Connection state kept by the bundled transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    id: ConnectionId,
    address: SocketAddr,
    max_delay: Duration,
}

impl PeerConnection {
    /// Creates a connection with no send-coalescing delay.
    pub fn new(id: ConnectionId, address: SocketAddr) -> Self {
        Self { id, address, max_delay: Duration::ZERO }
    }
}

impl Connection for PeerConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn max_delay(&self) -> Duration {
        self.max_delay
    }

    fn set_max_delay(&mut self, delay: Duration) {
        self.max_delay = delay;
    }
}

/// An event waiting to be reported on the next `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection was established.
    Connect,
    /// The connection was closed.
    Disconnect,
    /// The connection hit an error with the given code.
    Error(i32),
}

impl LinkEvent {
    /// Returns the session-level kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Connect => EventKind::Connect,
            LinkEvent::Disconnect => EventKind::Disconnect,
            LinkEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Reports `event` for `connection` to `sink`, encoding the error payload if needed.
pub(crate) fn emit(sink: &mut dyn EventSink, connection: &mut PeerConnection, event: LinkEvent) {
    let payload = match event {
        LinkEvent::Error(code) => ErrorNotification::new(code).encode(),
        LinkEvent::Connect | LinkEvent::Disconnect => Vec::new(),
    };
    sink.deliver(NetworkEvent { kind: event.kind(), connection, payload: &payload });
}
