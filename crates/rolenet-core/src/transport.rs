//! Transport abstraction for pluggable I/O.
//!
//! The session layer drives a [`Listener`] for its server role and a [`Connector`] for
//! its client role. Both are polled explicitly through `update`, which reports every
//! pending event to an [`EventSink`] synchronously, on the caller's thread.

use std::{net::SocketAddr, time::Duration};

use crate::{config::ConnectionConfig, event::NetworkEvent};

/// Identifies a connection within the transport that owns it.
pub type ConnectionId = u32;

/// One peer link. Owned by the transport; the session layer only ever borrows it.
pub trait Connection {
    /// Returns the transport-local id of this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the address of the remote end.
    fn address(&self) -> SocketAddr;

    /// Returns the current send-coalescing delay.
    fn max_delay(&self) -> Duration;

    /// Sets the send-coalescing delay.
    fn set_max_delay(&mut self, delay: Duration);
}

/// Receiver of transport events.
pub trait EventSink {
    /// Delivers a single event.
    fn deliver(&mut self, event: NetworkEvent<'_>);
}

impl<F> EventSink for F
where
    F: FnMut(NetworkEvent<'_>),
{
    fn deliver(&mut self, event: NetworkEvent<'_>) {
        self(event)
    }
}

/// Accepts inbound connections.
pub trait Listener {
    /// Selects the transport's alternate wire format, if it has one.
    fn set_use_alternate_transport(&mut self, enabled: bool);

    /// Applies transport tuning. Returns false when the configuration was rejected.
    fn configure(&mut self, config: &ConnectionConfig, max_connections: usize) -> bool;

    /// Binds to `(address, port)`, or the wildcard address when `address` is `None`.
    ///
    /// Returns whether the bind succeeded.
    fn listen(&mut self, address: Option<&str>, port: u16) -> bool;

    /// Returns the bound address, once listening.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Accepts pending connections and reports every pending event to `sink`.
    fn update(&mut self, sink: &mut dyn EventSink);

    /// Closes every accepted connection and releases the bound socket.
    fn stop(&mut self);
}

/// Initiates one outbound connection.
pub trait Connector {
    /// Applies transport tuning. Returns false when the configuration was rejected.
    fn configure(&mut self, config: &ConnectionConfig, max_connections: usize) -> bool;

    /// Starts connecting to `(address, port)`.
    ///
    /// Never blocks. The outcome is reported later through `update`, as a connect event
    /// on success or an error followed by a disconnect on failure.
    fn connect(&mut self, address: &str, port: u16);

    /// Progresses the connection and reports every pending event to `sink`.
    fn update(&mut self, sink: &mut dyn EventSink);

    /// Severs this connector's connection without affecting any other connector.
    fn disconnect(&mut self);

    /// Releases every resource held by the connector.
    fn shutdown(&mut self);
}

/// Creates fresh transport objects for each role activation.
pub trait TransportFactory {
    /// Listener type used by server roles.
    type Listener: Listener;
    /// Connector type used by client roles.
    type Connector: Connector;

    /// Creates an unbound listener.
    fn create_listener(&mut self) -> Self::Listener;

    /// Creates an unconnected connector.
    fn create_connector(&mut self) -> Self::Connector;
}
