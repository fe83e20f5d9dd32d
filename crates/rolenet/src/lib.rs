#![warn(missing_docs)]

//! rolenet: a small public API facade for the workspace.
//!
//! This crate re-exports the most commonly used types to run a server, a client or a
//! host (server plus a local client) over a pluggable transport:
//!
//! - Session manager and hooks (`SessionManager`, `SessionHooks`, `SessionAction`)
//! - Configuration (`SessionConfig`, `ConnectionConfig`)
//! - Transports (`TcpTransport`, `LoopbackNetwork`)
//!
//! Example
//! ```
//! use rolenet::{LoopbackNetwork, SessionConfig, SessionManager};
//!
//! let mut manager = SessionManager::new(LoopbackNetwork::new(), SessionConfig::default());
//! let local_client = manager.start_host().expect("port is free");
//! assert_eq!(local_client.address(), "localhost");
//!
//! // Poll once: the server accepts, then the local client sees its connect.
//! manager.update();
//! assert_eq!(manager.server().unwrap().connected_count(), 1);
//!
//! manager.stop_host();
//! assert!(!manager.is_network_active());
//! ```

// Core config, errors and events
pub use rolenet_core::{
    config::{ConnectionConfig, SessionConfig},
    constants,
    error::{ErrorKind, Result},
    event::{ErrorNotification, EventKind, NetworkEvent},
    transport::{Connection, ConnectionId, Connector, EventSink, Listener, TransportFactory},
};
// Session manager and hooks
pub use rolenet_host::{
    ClientHandle, ClientRole, NoHooks, ServerRole, SessionAction, SessionHooks, SessionManager,
};
// Bundled transports
pub use rolenet_transport::{
    LinkEvent, LoopbackConnector, LoopbackListener, LoopbackNetwork, PeerConnection,
    TcpConnector, TcpListener, TcpTransport,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        ClientHandle, Connection, LoopbackNetwork, NoHooks, SessionAction, SessionConfig,
        SessionHooks, SessionManager, TcpTransport,
    };
}
