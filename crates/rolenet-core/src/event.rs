//! Session-level events reported by transports.
//!
//! A transport reports every event through an [`EventSink`](crate::transport::EventSink)
//! as a [`NetworkEvent`]: the kind, a transient borrow of the connection it concerns and
//! the raw payload. Only error events carry a payload, an encoded [`ErrorNotification`].

use std::{fmt, io::Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{error::{ErrorKind, Result}, transport::Connection};

/// The kinds of session-level event a transport can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A connection has been established.
    Connect,
    /// A connection has been closed by either side.
    Disconnect,
    /// The transport hit an error on a connection. Payload is an [`ErrorNotification`].
    Error,
}

impl EventKind {
    /// All kinds, in registration order.
    pub const ALL: [EventKind; 3] = [EventKind::Connect, EventKind::Disconnect, EventKind::Error];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Connect => write!(f, "connect"),
            EventKind::Disconnect => write!(f, "disconnect"),
            EventKind::Error => write!(f, "error"),
        }
    }
}

/// A raw event as handed from a transport to the session layer.
///
/// The connection is borrowed only for the duration of the delivery.
pub struct NetworkEvent<'a> {
    /// What happened.
    pub kind: EventKind,
    /// The connection the event concerns.
    pub connection: &'a mut dyn Connection,
    /// Kind-specific payload; empty for connect and disconnect.
    pub payload: &'a [u8],
}

impl fmt::Debug for NetworkEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkEvent")
            .field("kind", &self.kind)
            .field("connection", &self.connection.id())
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Decoded payload of an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorNotification {
    /// Transport specific error code.
    pub error_code: i32,
}

impl ErrorNotification {
    /// Size of the encoded notification in bytes.
    pub const ENCODED_SIZE: usize = 4;

    /// Creates a notification for the given code.
    pub fn new(error_code: i32) -> Self {
        Self { error_code }
    }

    /// Decodes a notification from an error event payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::ENCODED_SIZE {
            return Err(ErrorKind::ErrorPayloadTooShort {
                expected: Self::ENCODED_SIZE,
                actual: payload.len(),
            });
        }
        let mut cursor = Cursor::new(payload);
        let error_code = cursor.read_i32::<BigEndian>()?;
        Ok(Self { error_code })
    }

    /// Encodes the notification into an error event payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(Self::ENCODED_SIZE);
        // Writing into a Vec cannot fail.
        let _ = buffer.write_i32::<BigEndian>(self.error_code);
        buffer
    }
}
