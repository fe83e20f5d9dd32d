#![warn(missing_docs)]

//! rolenet-core: foundational types shared by the session layer and its transports.
//!
//! This crate provides:
//! - Configuration types
//! - Error handling
//! - Session-level event types and the error payload codec
//! - The listener/connector capability traits

/// Constants shared across layers.
pub mod constants {
    use std::time::Duration;

    /// Address a host's local client connects to.
    pub const LOCAL_ADDRESS: &str = "localhost";
    /// Default bind/target port.
    pub const DEFAULT_NETWORK_PORT: u16 = 7770;
    /// Default upper bound on simultaneously accepted connections.
    pub const DEFAULT_MAX_CONNECTIONS: usize = 4;
    /// Default send-coalescing delay applied on connect.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10);
    /// Default listen backlog for stream transports.
    pub const DEFAULT_LISTEN_BACKLOG: i32 = 128;
}

/// Configuration options for sessions and transports.
pub mod config;
/// Error types and results.
pub mod error;
/// Session-level events and payloads.
pub mod event;
/// Transport abstraction for pluggable I/O.
pub mod transport;

pub use config::{ConnectionConfig, SessionConfig};
pub use error::{ErrorKind, Result};
pub use event::{ErrorNotification, EventKind, NetworkEvent};
pub use transport::{Connection, ConnectionId, Connector, EventSink, Listener, TransportFactory};
