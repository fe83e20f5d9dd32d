//! Non-blocking TCP transport.
//!
//! Sockets are created through `socket2` so the backlog and buffer sizes from
//! [`ConnectionConfig`] can be applied before binding or connecting. Every call is
//! non-blocking: `update` accepts, checks connect progress and drains readable streams,
//! then returns. Stream payloads are read and discarded; message framing lives above
//! this layer.

use std::{
    io::{self, ErrorKind as IoErrorKind, Read},
    net::{
        IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener as StdTcpListener, TcpStream,
        ToSocketAddrs,
    },
};

use rolenet_core::{
    config::ConnectionConfig,
    error::{ErrorKind, Result},
    transport::{ConnectionId, Connector, EventSink, Listener, TransportFactory},
};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, trace, warn};

use crate::connection::{emit, LinkEvent, PeerConnection};

/// Returns whether a non-blocking connect is still in flight.
#[cfg(unix)]
fn connect_in_progress(err: &io::Error) -> bool {
    err.kind() == IoErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EINPROGRESS)
}

/// Returns whether a non-blocking connect is still in flight.
#[cfg(not(unix))]
fn connect_in_progress(err: &io::Error) -> bool {
    err.kind() == IoErrorKind::WouldBlock
}

/// Factory for TCP listeners and connectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl TransportFactory for TcpTransport {
    type Listener = TcpListener;
    type Connector = TcpConnector;

    fn create_listener(&mut self) -> TcpListener {
        TcpListener::new()
    }

    fn create_connector(&mut self) -> TcpConnector {
        TcpConnector::new()
    }
}

/// Applies socket options from configuration to a socket before bind/connect.
fn apply_socket_options(socket: &Socket, config: &ConnectionConfig) -> io::Result<()> {
    // Apply receive buffer size
    if let Some(size) = config.socket_recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }

    // Apply send buffer size
    if let Some(size) = config.socket_send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }

    // Apply TTL
    if let Some(ttl) = config.socket_ttl {
        socket.set_ttl(ttl)?;
    }

    Ok(())
}

/// Applies per-stream options to an accepted or connected stream.
fn apply_stream_options(stream: &TcpStream, config: &ConnectionConfig) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(config.nodelay)?;
    Ok(())
}

/// Resolves `address:port`, preferring IPv4 results.
fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    let candidates: Vec<SocketAddr> = (address, port)
        .to_socket_addrs()
        .map_err(|_| ErrorKind::InvalidAddress(address.to_string()))?
        .collect();
    candidates
        .iter()
        .find(|candidate| candidate.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| ErrorKind::InvalidAddress(address.to_string()))
}

/// What draining a stream found.
enum StreamStatus {
    Open,
    Closed,
    Failed(io::Error),
}

/// Reads everything currently available from `stream`.
fn drain_stream(stream: &mut TcpStream, buffer: &mut [u8]) -> StreamStatus {
    loop {
        match stream.read(buffer) {
            Ok(0) => return StreamStatus::Closed,
            Ok(len) => trace!("Discarding {} bytes of stream payload", len),
            Err(e) if e.kind() == IoErrorKind::WouldBlock => return StreamStatus::Open,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return StreamStatus::Failed(e),
        }
    }
}

#[derive(Debug)]
struct StreamLink {
    connection: PeerConnection,
    stream: TcpStream,
}

/// TCP server socket accepting up to `max_connections` streams.
#[derive(Debug)]
pub struct TcpListener {
    config: ConnectionConfig,
    max_connections: usize,
    use_alternate_transport: bool,
    socket: Option<StdTcpListener>,
    links: Vec<StreamLink>,
    next_connection_id: ConnectionId,
    receive_buffer: Vec<u8>,
}

impl TcpListener {
    /// Creates an unbound listener.
    pub fn new() -> Self {
        let config = ConnectionConfig::default();
        Self {
            receive_buffer: vec![0; config.receive_buffer_size],
            config,
            max_connections: usize::MAX,
            use_alternate_transport: false,
            socket: None,
            links: Vec::new(),
            next_connection_id: 0,
        }
    }

    /// Returns the number of accepted streams.
    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    /// Returns whether the alternate transport was requested.
    pub fn uses_alternate_transport(&self) -> bool {
        self.use_alternate_transport
    }

    fn bind(&mut self, address: Option<&str>, port: u16) -> Result<SocketAddr> {
        if self.socket.is_some() {
            return Err(ErrorKind::AlreadyListening);
        }
        let address = match address {
            Some(address) => resolve(address, port)?,
            None => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        };

        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        apply_socket_options(&socket, &self.config)?;
        socket.bind(&address.into())?;
        socket.listen(self.config.backlog)?;
        socket.set_nonblocking(true)?;

        let listener: StdTcpListener = socket.into();
        let local_addr = listener.local_addr()?;
        self.socket = Some(listener);
        Ok(local_addr)
    }

    fn accept_pending(&mut self, sink: &mut dyn EventSink) {
        let Some(socket) = &self.socket else {
            return;
        };
        loop {
            match socket.accept() {
                Ok((stream, address)) => {
                    if self.links.len() >= self.max_connections {
                        debug!(
                            "Refusing {}: {} connections already accepted",
                            address, self.max_connections
                        );
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }
                    if let Err(e) = apply_stream_options(&stream, &self.config) {
                        warn!("Dropping stream from {}: {}", address, e);
                        continue;
                    }
                    self.next_connection_id = self.next_connection_id.wrapping_add(1);
                    let mut link = StreamLink {
                        connection: PeerConnection::new(self.next_connection_id, address),
                        stream,
                    };
                    emit(sink, &mut link.connection, LinkEvent::Connect);
                    self.links.push(link);
                }
                Err(e) if e.kind() == IoErrorKind::WouldBlock => break,
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Encountered an error accepting a stream: {:?}", e);
                    break;
                }
            }
        }
    }

    fn drain_links(&mut self, sink: &mut dyn EventSink) {
        let mut index = 0;
        while index < self.links.len() {
            let link = &mut self.links[index];
            match drain_stream(&mut link.stream, &mut self.receive_buffer) {
                StreamStatus::Open => index += 1,
                StreamStatus::Closed => {
                    let mut link = self.links.remove(index);
                    emit(sink, &mut link.connection, LinkEvent::Disconnect);
                }
                StreamStatus::Failed(e) => {
                    let mut link = self.links.remove(index);
                    let code = ErrorKind::from(e).error_code();
                    emit(sink, &mut link.connection, LinkEvent::Error(code));
                    emit(sink, &mut link.connection, LinkEvent::Disconnect);
                }
            }
        }
    }
}

impl Default for TcpListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for TcpListener {
    fn set_use_alternate_transport(&mut self, enabled: bool) {
        if enabled {
            warn!("TCP listener has no alternate transport; using plain streams");
        }
        self.use_alternate_transport = enabled;
    }

    fn configure(&mut self, config: &ConnectionConfig, max_connections: usize) -> bool {
        if max_connections == 0 || config.receive_buffer_size == 0 {
            return false;
        }
        self.config = config.clone();
        self.max_connections = max_connections;
        self.receive_buffer = vec![0; config.receive_buffer_size];
        true
    }

    fn listen(&mut self, address: Option<&str>, port: u16) -> bool {
        match self.bind(address, port) {
            Ok(local_addr) => {
                debug!("TCP listener bound to {}", local_addr);
                true
            }
            Err(err) => {
                warn!("TCP listener failed to bind port {}: {}", port, err);
                false
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    fn update(&mut self, sink: &mut dyn EventSink) {
        self.accept_pending(sink);
        self.drain_links(sink);
    }

    fn stop(&mut self) {
        for link in self.links.drain(..) {
            let _ = link.stream.shutdown(Shutdown::Both);
        }
        self.socket = None;
    }
}

#[derive(Debug)]
enum ClientState {
    Idle,
    Connecting(Socket),
    Connected(TcpStream),
    Closed,
}

/// TCP client stream.
#[derive(Debug)]
pub struct TcpConnector {
    config: ConnectionConfig,
    state: ClientState,
    connection: Option<PeerConnection>,
    pending: Vec<LinkEvent>,
    receive_buffer: Vec<u8>,
}

impl TcpConnector {
    /// Creates an unconnected connector.
    pub fn new() -> Self {
        let config = ConnectionConfig::default();
        Self {
            receive_buffer: vec![0; config.receive_buffer_size],
            config,
            state: ClientState::Idle,
            connection: None,
            pending: Vec::new(),
        }
    }

    /// Returns whether the stream is established.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected(_))
    }

    fn open(&self, target: SocketAddr) -> Result<ClientState> {
        let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))?;
        apply_socket_options(&socket, &self.config)?;
        socket.set_nonblocking(true)?;
        match socket.connect(&target.into()) {
            Ok(()) => {
                let stream: TcpStream = socket.into();
                apply_stream_options(&stream, &self.config)?;
                Ok(ClientState::Connected(stream))
            }
            Err(e) if connect_in_progress(&e) => Ok(ClientState::Connecting(socket)),
            Err(e) => Err(e.into()),
        }
    }

    fn fail(&mut self, err: ErrorKind) {
        debug!("TCP connector failed: {}", err);
        self.pending.push(LinkEvent::Error(err.error_code()));
        self.pending.push(LinkEvent::Disconnect);
        self.state = ClientState::Closed;
    }

    /// Moves a connecting socket forward. Returns the next state.
    fn poll_connecting(&mut self, socket: Socket) -> ClientState {
        match socket.take_error() {
            Ok(Some(e)) | Err(e) => {
                self.fail(e.into());
                return ClientState::Closed;
            }
            Ok(None) => {}
        }
        match socket.peer_addr() {
            Ok(_) => {
                let stream: TcpStream = socket.into();
                if let Err(e) = apply_stream_options(&stream, &self.config) {
                    self.fail(e.into());
                    return ClientState::Closed;
                }
                self.pending.push(LinkEvent::Connect);
                ClientState::Connected(stream)
            }
            Err(e) if e.kind() == IoErrorKind::NotConnected => ClientState::Connecting(socket),
            Err(e) => {
                self.fail(e.into());
                ClientState::Closed
            }
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    fn configure(&mut self, config: &ConnectionConfig, _max_connections: usize) -> bool {
        if config.receive_buffer_size == 0 {
            return false;
        }
        self.config = config.clone();
        self.receive_buffer = vec![0; config.receive_buffer_size];
        true
    }

    fn connect(&mut self, address: &str, port: u16) {
        let target = match resolve(address, port) {
            Ok(target) => target,
            Err(err) => {
                let unresolved = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
                self.connection = Some(PeerConnection::new(1, unresolved));
                self.fail(err);
                return;
            }
        };
        self.connection = Some(PeerConnection::new(1, target));
        match self.open(target) {
            Ok(state) => {
                if matches!(state, ClientState::Connected(_)) {
                    self.pending.push(LinkEvent::Connect);
                }
                self.state = state;
            }
            Err(err) => self.fail(err),
        }
    }

    fn update(&mut self, sink: &mut dyn EventSink) {
        self.state = match std::mem::replace(&mut self.state, ClientState::Idle) {
            ClientState::Connecting(socket) => self.poll_connecting(socket),
            state => state,
        };

        if let ClientState::Connected(stream) = &mut self.state {
            match drain_stream(stream, &mut self.receive_buffer) {
                StreamStatus::Open => {}
                StreamStatus::Closed => {
                    self.pending.push(LinkEvent::Disconnect);
                    self.state = ClientState::Closed;
                }
                StreamStatus::Failed(e) => self.fail(e.into()),
            }
        }

        let Some(connection) = self.connection.as_mut() else {
            self.pending.clear();
            return;
        };
        for event in self.pending.drain(..) {
            emit(sink, connection, event);
        }
    }

    fn disconnect(&mut self) {
        if let ClientState::Connected(stream) = &self.state {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = ClientState::Closed;
    }

    fn shutdown(&mut self) {
        self.disconnect();
        self.state = ClientState::Idle;
        self.connection = None;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread::sleep,
        time::{Duration, Instant},
    };

    use rolenet_core::event::{EventKind, NetworkEvent};

    use super::*;

    fn poll_until(
        mut step: impl FnMut(&mut Vec<EventKind>),
        done: impl Fn(&[EventKind]) -> bool,
    ) -> Vec<EventKind> {
        let mut events = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(&events) && Instant::now() < deadline {
            step(&mut events);
            sleep(Duration::from_millis(1));
        }
        events
    }

    #[test]
    fn test_listen_on_ephemeral_port() {
        let mut listener = TcpListener::new();
        assert!(listener.listen(Some("127.0.0.1"), 0));
        let local = listener.local_addr().unwrap();
        assert_ne!(local.port(), 0);

        listener.stop();
        assert!(listener.local_addr().is_none());
    }

    #[test]
    fn test_listen_twice_fails() {
        let mut listener = TcpListener::new();
        assert!(listener.listen(Some("127.0.0.1"), 0));
        assert!(!listener.listen(Some("127.0.0.1"), 0));
    }

    #[test]
    fn test_configure_rejects_zero_connections() {
        let mut listener = TcpListener::new();
        assert!(!listener.configure(&ConnectionConfig::default(), 0));
        assert!(listener.configure(&ConnectionConfig::default(), 2));
    }

    #[test]
    fn test_connect_accept_and_disconnect() {
        let mut listener = TcpListener::new();
        assert!(listener.listen(Some("127.0.0.1"), 0));
        let port = listener.local_addr().unwrap().port();

        let mut connector = TcpConnector::new();
        connector.connect("127.0.0.1", port);

        let client_events = poll_until(
            |events| {
                connector.update(&mut |event: NetworkEvent<'_>| events.push(event.kind));
            },
            |events| !events.is_empty(),
        );
        assert_eq!(client_events, vec![EventKind::Connect]);
        assert!(connector.is_connected());

        let server_events = poll_until(
            |events| {
                listener.update(&mut |event: NetworkEvent<'_>| events.push(event.kind));
            },
            |events| !events.is_empty(),
        );
        assert_eq!(server_events, vec![EventKind::Connect]);
        assert_eq!(listener.connection_count(), 1);

        connector.disconnect();
        let server_events = poll_until(
            |events| {
                listener.update(&mut |event: NetworkEvent<'_>| events.push(event.kind));
            },
            |events| events.contains(&EventKind::Disconnect),
        );
        assert_eq!(server_events, vec![EventKind::Disconnect]);
        assert_eq!(listener.connection_count(), 0);
    }

    #[test]
    fn test_connect_to_unresolvable_host_reports_error() {
        let mut connector = TcpConnector::new();
        connector.connect("this-hostname-should-not-exist-12345.invalid", 7770);

        let mut events = Vec::new();
        connector.update(&mut |event: NetworkEvent<'_>| events.push(event.kind));
        assert_eq!(events, vec![EventKind::Error, EventKind::Disconnect]);
    }

    #[test]
    fn test_connect_in_progress_classification() {
        assert!(connect_in_progress(&io::Error::from(IoErrorKind::WouldBlock)));
        assert!(!connect_in_progress(&io::Error::from(IoErrorKind::ConnectionRefused)));
        #[cfg(unix)]
        assert!(connect_in_progress(&io::Error::from_raw_os_error(libc::EINPROGRESS)));
    }

    #[test]
    fn test_shutdown_drops_pending_events() {
        let mut connector = TcpConnector::new();
        connector.connect("this-hostname-should-not-exist-12345.invalid", 7770);
        connector.shutdown();

        let mut events = Vec::new();
        connector.update(&mut |event: NetworkEvent<'_>| events.push(event.kind));
        assert!(events.is_empty());
    }
}
