//! Loopback transport for in-process server/client communication.
//!
//! Listeners and connectors created from the same [`LoopbackNetwork`] find each other
//! by port without touching the network stack. Useful for hosts whose only client is
//! local, and for tests, where [`LoopbackListener::inject`] and
//! [`LoopbackConnector::inject`] simulate transports that redeliver or fabricate events.

use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use rolenet_core::{
    config::ConnectionConfig,
    error::{ErrorKind, Result},
    transport::{Connection, ConnectionId, Connector, EventSink, Listener, TransportFactory},
};
use tracing::{debug, trace, warn};

use crate::connection::{emit, LinkEvent, PeerConnection};

/// First port handed out when a listener asks for port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

/// Signals exchanged between the two ends of a loopback link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkSignal {
    /// Server accepted the link.
    Accepted,
    /// The sending end closed the link.
    Closed,
    /// The sending end reports an error to its peer.
    Error(i32),
}

/// A connect request sent from a connector to a listener.
#[derive(Debug)]
struct Handshake {
    client_address: SocketAddr,
    to_client: Sender<LinkSignal>,
    from_client: Receiver<LinkSignal>,
}

#[derive(Debug)]
struct NetworkState {
    listeners: HashMap<u16, Sender<Handshake>>,
    next_connection_id: ConnectionId,
    next_client_port: u16,
}

impl NetworkState {
    fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_connection_id: 0,
            next_client_port: EPHEMERAL_PORT_START,
        }
    }

    fn allocate_connection_id(&mut self) -> ConnectionId {
        self.next_connection_id = self.next_connection_id.wrapping_add(1);
        self.next_connection_id
    }

    fn allocate_listen_port(&self) -> Option<u16> {
        (EPHEMERAL_PORT_START..=u16::MAX).find(|port| !self.listeners.contains_key(port))
    }

    fn allocate_client_port(&mut self) -> u16 {
        let port = self.next_client_port;
        self.next_client_port = self.next_client_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
        port
    }
}

/// Shared registry connecting loopback listeners and connectors.
///
/// Cloning yields another handle to the same network.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(NetworkState::new())) }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether a listener is bound to `port`.
    pub fn is_listening(&self, port: u16) -> bool {
        self.lock().listeners.contains_key(&port)
    }

    /// Returns the number of bound listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Creates an unbound listener on this network.
    pub fn listener(&self) -> LoopbackListener {
        LoopbackListener::new(self.clone())
    }

    /// Creates an unconnected connector on this network.
    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector::new(self.clone())
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for LoopbackNetwork {
    type Listener = LoopbackListener;
    type Connector = LoopbackConnector;

    fn create_listener(&mut self) -> LoopbackListener {
        self.listener()
    }

    fn create_connector(&mut self) -> LoopbackConnector {
        self.connector()
    }
}

/// Resolves the textual addresses the loopback network understands.
fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    let ip = match address {
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        "*" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        other => other.parse().map_err(|_| ErrorKind::InvalidAddress(other.to_string()))?,
    };
    Ok(SocketAddr::new(ip, port))
}

#[derive(Debug)]
struct ServerLink {
    connection: PeerConnection,
    to_client: Sender<LinkSignal>,
    from_client: Receiver<LinkSignal>,
}

/// Server half of the loopback transport.
#[derive(Debug)]
pub struct LoopbackListener {
    network: LoopbackNetwork,
    use_alternate_transport: bool,
    max_connections: usize,
    local_addr: Option<SocketAddr>,
    inbox: Option<Receiver<Handshake>>,
    links: Vec<ServerLink>,
    injected: VecDeque<(ConnectionId, LinkEvent)>,
}

impl LoopbackListener {
    fn new(network: LoopbackNetwork) -> Self {
        Self {
            network,
            use_alternate_transport: false,
            max_connections: usize::MAX,
            local_addr: None,
            inbox: None,
            links: Vec::new(),
            injected: VecDeque::new(),
        }
    }

    /// Queues `event` for the accepted connection `id`, reported on the next update.
    ///
    /// Events for unknown connections are dropped when the queue is drained.
    pub fn inject(&mut self, id: ConnectionId, event: LinkEvent) {
        self.injected.push_back((id, event));
    }

    /// Returns the ids of the accepted connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.links.iter().map(|link| link.connection.id()).collect()
    }

    /// Returns the number of accepted connections.
    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    /// Returns whether the alternate transport was requested.
    pub fn uses_alternate_transport(&self) -> bool {
        self.use_alternate_transport
    }

    /// Returns the configured connection limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    fn bind(&mut self, address: Option<&str>, port: u16) -> Result<SocketAddr> {
        if self.inbox.is_some() {
            return Err(ErrorKind::AlreadyListening);
        }
        let mut state = self.network.lock();
        let port = match port {
            0 => state.allocate_listen_port().ok_or(ErrorKind::AddressInUse(0))?,
            port if state.listeners.contains_key(&port) => return Err(ErrorKind::AddressInUse(port)),
            port => port,
        };
        let local_addr = resolve(address.unwrap_or("*"), port)?;

        let (sender, receiver) = unbounded();
        state.listeners.insert(port, sender);
        self.inbox = Some(receiver);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    fn accept_pending(&mut self, sink: &mut dyn EventSink) {
        let Some(inbox) = &self.inbox else {
            return;
        };
        let handshakes: Vec<Handshake> = inbox.try_iter().collect();
        for handshake in handshakes {
            if self.links.len() >= self.max_connections {
                debug!(
                    "Refusing loopback connection from {}: {} connections already accepted",
                    handshake.client_address, self.max_connections
                );
                let _ = handshake.to_client.send(LinkSignal::Closed);
                continue;
            }
            let id = self.network.lock().allocate_connection_id();
            let _ = handshake.to_client.send(LinkSignal::Accepted);
            let mut link = ServerLink {
                connection: PeerConnection::new(id, handshake.client_address),
                to_client: handshake.to_client,
                from_client: handshake.from_client,
            };
            emit(sink, &mut link.connection, LinkEvent::Connect);
            self.links.push(link);
        }
    }

    fn drain_links(&mut self, sink: &mut dyn EventSink) {
        let mut index = 0;
        while index < self.links.len() {
            let link = &mut self.links[index];
            let mut closed = false;
            loop {
                match link.from_client.try_recv() {
                    Ok(LinkSignal::Error(code)) => {
                        emit(sink, &mut link.connection, LinkEvent::Error(code))
                    }
                    Ok(LinkSignal::Closed) | Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                    Ok(LinkSignal::Accepted) => trace!("Ignoring accept signal from a client"),
                    Err(TryRecvError::Empty) => break,
                }
            }
            if closed {
                let mut link = self.links.remove(index);
                emit(sink, &mut link.connection, LinkEvent::Disconnect);
            } else {
                index += 1;
            }
        }
    }

    fn drain_injected(&mut self, sink: &mut dyn EventSink) {
        while let Some((id, event)) = self.injected.pop_front() {
            match self.links.iter_mut().find(|link| link.connection.id() == id) {
                Some(link) => emit(sink, &mut link.connection, event),
                None => trace!("Dropping injected {:?} for unknown connection {}", event, id),
            }
        }
    }
}

impl Listener for LoopbackListener {
    fn set_use_alternate_transport(&mut self, enabled: bool) {
        self.use_alternate_transport = enabled;
    }

    fn configure(&mut self, _config: &ConnectionConfig, max_connections: usize) -> bool {
        if max_connections == 0 {
            return false;
        }
        self.max_connections = max_connections;
        true
    }

    fn listen(&mut self, address: Option<&str>, port: u16) -> bool {
        match self.bind(address, port) {
            Ok(local_addr) => {
                debug!("Loopback listener bound to {}", local_addr);
                true
            }
            Err(err) => {
                warn!("Loopback listener failed to bind: {}", err);
                false
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn update(&mut self, sink: &mut dyn EventSink) {
        self.accept_pending(sink);
        self.drain_links(sink);
        self.drain_injected(sink);
    }

    fn stop(&mut self) {
        for link in self.links.drain(..) {
            let _ = link.to_client.send(LinkSignal::Closed);
        }
        if let Some(local_addr) = self.local_addr.take() {
            self.network.lock().listeners.remove(&local_addr.port());
        }
        self.inbox = None;
        self.injected.clear();
    }
}

impl Drop for LoopbackListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug)]
enum ClientState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

/// Client half of the loopback transport.
#[derive(Debug)]
pub struct LoopbackConnector {
    network: LoopbackNetwork,
    state: ClientState,
    connection: Option<PeerConnection>,
    to_server: Option<Sender<LinkSignal>>,
    from_server: Option<Receiver<LinkSignal>>,
    pending: VecDeque<LinkEvent>,
}

impl LoopbackConnector {
    fn new(network: LoopbackNetwork) -> Self {
        Self {
            network,
            state: ClientState::Idle,
            connection: None,
            to_server: None,
            from_server: None,
            pending: VecDeque::new(),
        }
    }

    /// Queues `event` for this connector's connection, reported on the next update.
    pub fn inject(&mut self, event: LinkEvent) {
        self.pending.push_back(event);
    }

    /// Returns whether the server has accepted the connection.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected)
    }

    /// Returns the connection, once `connect` has been called.
    pub fn connection(&self) -> Option<&PeerConnection> {
        self.connection.as_ref()
    }

    /// Sends an error notification to the server side of the link.
    pub fn report_error(&self, error_code: i32) -> Result<()> {
        let to_server = self.to_server.as_ref().ok_or(ErrorKind::NotActive)?;
        to_server.send(LinkSignal::Error(error_code)).map_err(|_| ErrorKind::NotActive)
    }

    fn open(&mut self, address: &str, port: u16) -> Result<()> {
        let target = resolve(address, port)?;
        if !(target.ip().is_loopback() || target.ip().is_unspecified()) {
            return Err(ErrorKind::ConnectionRefused(target.to_string()));
        }
        let mut state = self.network.lock();
        let inbox = state
            .listeners
            .get(&port)
            .cloned()
            .ok_or_else(|| ErrorKind::ConnectionRefused(target.to_string()))?;
        let client_address =
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), state.allocate_client_port());
        drop(state);

        let (to_client, from_server) = unbounded();
        let (to_server, from_client) = unbounded();
        inbox
            .send(Handshake { client_address, to_client, from_client })
            .map_err(|_| ErrorKind::ConnectionRefused(target.to_string()))?;
        self.to_server = Some(to_server);
        self.from_server = Some(from_server);
        Ok(())
    }

    fn close(&mut self) {
        self.state = ClientState::Closed;
        self.to_server = None;
        self.from_server = None;
    }
}

impl Connector for LoopbackConnector {
    fn configure(&mut self, _config: &ConnectionConfig, _max_connections: usize) -> bool {
        true
    }

    fn connect(&mut self, address: &str, port: u16) {
        let id = self.network.lock().allocate_connection_id();
        let target = resolve(address, port)
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        self.connection = Some(PeerConnection::new(id, target));
        self.state = ClientState::Connecting;

        if let Err(err) = self.open(address, port) {
            debug!("Loopback connect to {}:{} failed: {}", address, port, err);
            self.pending.push_back(LinkEvent::Error(err.error_code()));
            self.pending.push_back(LinkEvent::Disconnect);
            self.close();
        }
    }

    fn update(&mut self, sink: &mut dyn EventSink) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        let mut closed = false;
        if let Some(from_server) = &self.from_server {
            loop {
                match from_server.try_recv() {
                    Ok(LinkSignal::Accepted) => {
                        self.state = ClientState::Connected;
                        self.pending.push_back(LinkEvent::Connect);
                    }
                    Ok(LinkSignal::Error(code)) => self.pending.push_back(LinkEvent::Error(code)),
                    Ok(LinkSignal::Closed) | Err(TryRecvError::Disconnected) => {
                        self.pending.push_back(LinkEvent::Disconnect);
                        closed = true;
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }
        }
        if closed {
            self.state = ClientState::Closed;
            self.to_server = None;
            self.from_server = None;
        }

        while let Some(event) = self.pending.pop_front() {
            emit(sink, connection, event);
        }
    }

    fn disconnect(&mut self) {
        if let Some(to_server) = &self.to_server {
            let _ = to_server.send(LinkSignal::Closed);
        }
        self.close();
    }

    fn shutdown(&mut self) {
        self.disconnect();
        self.connection = None;
        self.pending.clear();
        self.state = ClientState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use rolenet_core::event::{ErrorNotification, EventKind, NetworkEvent};

    use super::*;

    /// Collects (kind, connection id, decoded error code) triples.
    fn collect(update: impl FnOnce(&mut dyn EventSink)) -> Vec<(EventKind, ConnectionId, Option<i32>)> {
        let mut events = Vec::new();
        update(&mut |event: NetworkEvent<'_>| {
            let code = match event.kind {
                EventKind::Error => ErrorNotification::decode(event.payload).ok().map(|n| n.error_code),
                _ => None,
            };
            events.push((event.kind, event.connection.id(), code));
        });
        events
    }

    #[test]
    fn test_listen_registers_port() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 7000));
        assert!(network.is_listening(7000));
        assert_eq!(listener.local_addr(), Some("0.0.0.0:7000".parse().unwrap()));

        listener.stop();
        assert!(!network.is_listening(7000));
        assert_eq!(listener.local_addr(), None);
    }

    #[test]
    fn test_listen_on_taken_port_fails() {
        let network = LoopbackNetwork::new();
        let mut first = network.listener();
        let mut second = network.listener();
        assert!(first.listen(Some("127.0.0.1"), 7001));
        assert!(!second.listen(None, 7001));
    }

    #[test]
    fn test_listen_on_invalid_address_fails() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(!listener.listen(Some("not an address"), 7002));
        assert_eq!(network.listener_count(), 0);
    }

    #[test]
    fn test_port_zero_allocates_ephemeral_port() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 0));
        assert_eq!(listener.local_addr().unwrap().port(), EPHEMERAL_PORT_START);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 7003));

        let mut connector = network.connector();
        connector.connect("localhost", 7003);

        let server_events = collect(|sink| listener.update(sink));
        assert_eq!(server_events.len(), 1);
        assert_eq!(server_events[0].0, EventKind::Connect);
        assert_eq!(listener.connection_count(), 1);

        let client_events = collect(|sink| connector.update(sink));
        assert_eq!(client_events.len(), 1);
        assert_eq!(client_events[0].0, EventKind::Connect);
        assert!(connector.is_connected());

        connector.disconnect();
        let server_events = collect(|sink| listener.update(sink));
        assert_eq!(server_events.len(), 1);
        assert_eq!(server_events[0].0, EventKind::Disconnect);
        assert_eq!(listener.connection_count(), 0);
    }

    #[test]
    fn test_connect_to_missing_listener_reports_error_then_disconnect() {
        let network = LoopbackNetwork::new();
        let mut connector = network.connector();
        connector.connect("localhost", 7004);

        let events = collect(|sink| connector.update(sink));
        let kinds: Vec<EventKind> = events.iter().map(|event| event.0).collect();
        assert_eq!(kinds, vec![EventKind::Error, EventKind::Disconnect]);
        assert_eq!(events[0].2, Some(ErrorKind::ConnectionRefused(String::new()).error_code()));
    }

    #[test]
    fn test_connect_to_remote_address_is_refused() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 7005));

        let mut connector = network.connector();
        connector.connect("10.0.0.1", 7005);
        let kinds: Vec<EventKind> =
            collect(|sink| connector.update(sink)).into_iter().map(|event| event.0).collect();
        assert_eq!(kinds, vec![EventKind::Error, EventKind::Disconnect]);
        assert_eq!(listener.connection_count(), 0);
    }

    #[test]
    fn test_max_connections_refuses_extra_clients() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.configure(&ConnectionConfig::default(), 1));
        assert!(listener.listen(None, 7006));

        let mut first = network.connector();
        let mut second = network.connector();
        first.connect("localhost", 7006);
        second.connect("localhost", 7006);

        let server_events = collect(|sink| listener.update(sink));
        assert_eq!(server_events.len(), 1);

        let second_events = collect(|sink| second.update(sink));
        assert_eq!(second_events.len(), 1);
        assert_eq!(second_events[0].0, EventKind::Disconnect);
    }

    #[test]
    fn test_stop_disconnects_clients() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 7007));
        let mut connector = network.connector();
        connector.connect("localhost", 7007);
        collect(|sink| listener.update(sink));
        collect(|sink| connector.update(sink));

        listener.stop();
        let kinds: Vec<EventKind> =
            collect(|sink| connector.update(sink)).into_iter().map(|event| event.0).collect();
        assert_eq!(kinds, vec![EventKind::Disconnect]);
        assert!(!connector.is_connected());
    }

    #[test]
    fn test_client_error_reaches_server() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 7008));
        let mut connector = network.connector();
        connector.connect("localhost", 7008);
        collect(|sink| listener.update(sink));

        connector.report_error(42).unwrap();
        let events = collect(|sink| listener.update(sink));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, EventKind::Error);
        assert_eq!(events[0].2, Some(42));
    }

    #[test]
    fn test_injected_events_are_delivered_in_order() {
        let network = LoopbackNetwork::new();
        let mut listener = network.listener();
        assert!(listener.listen(None, 7009));
        let mut connector = network.connector();
        connector.connect("localhost", 7009);
        collect(|sink| listener.update(sink));

        let id = listener.connection_ids()[0];
        listener.inject(id, LinkEvent::Connect);
        listener.inject(id, LinkEvent::Error(7));
        listener.inject(id + 100, LinkEvent::Connect);

        let events = collect(|sink| listener.update(sink));
        assert_eq!(events, vec![(EventKind::Connect, id, None), (EventKind::Error, id, Some(7))]);
    }

    #[test]
    fn test_shutdown_clears_connection() {
        let network = LoopbackNetwork::new();
        let mut connector = network.connector();
        connector.connect("localhost", 7010);
        connector.shutdown();
        assert!(connector.connection().is_none());
        assert!(collect(|sink| connector.update(sink)).is_empty());
    }
}
