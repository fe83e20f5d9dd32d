#![warn(missing_docs)]

//! Transports for the rolenet session manager.
//!
//! - [`LoopbackNetwork`]: in-process listeners and connectors joined by channels. Useful
//!   for hosting a game locally and for tests that need deterministic event order.
//! - [`TcpTransport`]: non-blocking TCP sockets created through `socket2`.
//!
//! Both report `Connect`, `Disconnect` and `Error` events through
//! [`EventSink`](rolenet_core::transport::EventSink) when updated.

/// Connection state shared by the transports.
pub mod connection;
/// In-process transport.
pub mod loopback;
/// TCP transport.
pub mod tcp;

pub use connection::{LinkEvent, PeerConnection};
pub use loopback::{LoopbackConnector, LoopbackListener, LoopbackNetwork};
pub use tcp::{TcpConnector, TcpListener, TcpTransport};
