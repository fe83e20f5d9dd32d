//! Event dispatch tables.
//!
//! Each role activation installs a table mapping the three session-level event kinds
//! to internal callbacks. The callbacks apply the session's bookkeeping (duplicate
//! suppression, delay tuning, error decoding) before forwarding to [`SessionHooks`].

use std::{collections::{HashMap, HashSet}, fmt};

use rolenet_core::{
    config::SessionConfig,
    event::{ErrorNotification, EventKind, NetworkEvent},
    transport::ConnectionId,
};
use tracing::{debug, error, trace};

use crate::hooks::{SessionAction, SessionHooks};

/// State a server callback may touch while handling one event.
pub(crate) struct ServerContext<'a, H> {
    pub(crate) config: &'a SessionConfig,
    pub(crate) hooks: &'a mut H,
    pub(crate) connected: &'a mut HashSet<ConnectionId>,
    pub(crate) actions: &'a mut Vec<SessionAction>,
}

/// State a client callback may touch while handling one event.
pub(crate) struct ClientContext<'a, H> {
    pub(crate) config: &'a SessionConfig,
    pub(crate) hooks: &'a mut H,
    pub(crate) actions: &'a mut Vec<SessionAction>,
}

/// Internal server-side event callback.
pub(crate) type ServerCallback<H> = fn(&mut ServerContext<'_, H>, NetworkEvent<'_>);
/// Internal client-side event callback.
pub(crate) type ClientCallback<H> = fn(&mut ClientContext<'_, H>, NetworkEvent<'_>);

/// Mapping from event kind to callback, installed once per role activation.
pub(crate) struct DispatchTable<F> {
    handlers: HashMap<EventKind, F>,
}

/// Dispatch table of a server role.
pub(crate) type ServerDispatchTable<H> = DispatchTable<ServerCallback<H>>;
/// Dispatch table of a client role.
pub(crate) type ClientDispatchTable<H> = DispatchTable<ClientCallback<H>>;

impl<F: Copy> DispatchTable<F> {
    /// Creates an empty table.
    pub(crate) fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Registers `callback` for `kind`, replacing any previous registration.
    pub(crate) fn register(&mut self, kind: EventKind, callback: F) {
        self.handlers.insert(kind, callback);
    }

    /// Returns the callback registered for `kind`.
    pub(crate) fn handler(&self, kind: EventKind) -> Option<F> {
        self.handlers.get(&kind).copied()
    }

    /// Returns whether a callback is registered for `kind`.
    #[cfg(test)]
    pub(crate) fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Returns the number of registered kinds.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<F: Copy> Default for DispatchTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for DispatchTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.handlers.keys().map(|kind| kind.to_string()).collect();
        kinds.sort();
        f.debug_struct("DispatchTable").field("kinds", &kinds).finish()
    }
}

impl<H: SessionHooks> ServerDispatchTable<H> {
    /// Builds the table every server role installs.
    pub(crate) fn server() -> Self {
        let mut table = Self::new();
        table.register(EventKind::Connect, on_server_connect::<H>);
        table.register(EventKind::Disconnect, on_server_disconnect::<H>);
        table.register(EventKind::Error, on_server_error::<H>);
        table
    }

    /// Routes `event` to its callback. Returns false when no callback is registered.
    pub(crate) fn dispatch(&self, context: &mut ServerContext<'_, H>, event: NetworkEvent<'_>) -> bool {
        match self.handler(event.kind) {
            Some(callback) => {
                callback(context, event);
                true
            }
            None => {
                trace!("No server handler registered for {} event", event.kind);
                false
            }
        }
    }
}

impl<H: SessionHooks> ClientDispatchTable<H> {
    /// Builds the table every client role installs.
    pub(crate) fn client() -> Self {
        let mut table = Self::new();
        table.register(EventKind::Connect, on_client_connect::<H>);
        table.register(EventKind::Disconnect, on_client_disconnect::<H>);
        table.register(EventKind::Error, on_client_error::<H>);
        table
    }

    /// Routes `event` to its callback. Returns false when no callback is registered.
    pub(crate) fn dispatch(&self, context: &mut ClientContext<'_, H>, event: NetworkEvent<'_>) -> bool {
        match self.handler(event.kind) {
            Some(callback) => {
                callback(context, event);
                true
            }
            None => {
                trace!("No client handler registered for {} event", event.kind);
                false
            }
        }
    }
}

// ============================================================================
// Server callbacks
// ============================================================================

fn on_server_connect<H: SessionHooks>(context: &mut ServerContext<'_, H>, event: NetworkEvent<'_>) {
    if context.config.write_log {
        debug!("Server connect callback (connection {})", event.connection.id());
    }
    // A transport may redeliver connection-state events; only the first one counts.
    if !context.connected.insert(event.connection.id()) {
        return;
    }
    event.connection.set_max_delay(context.config.max_delay);
    context.hooks.on_server_connect(event.connection, context.actions);
}

fn on_server_disconnect<H: SessionHooks>(
    context: &mut ServerContext<'_, H>,
    event: NetworkEvent<'_>,
) {
    if context.config.write_log {
        debug!("Server disconnect callback (connection {})", event.connection.id());
    }
    if !context.connected.remove(&event.connection.id()) {
        return;
    }
    context.hooks.on_server_disconnect(event.connection, context.actions);
}

fn on_server_error<H: SessionHooks>(context: &mut ServerContext<'_, H>, event: NetworkEvent<'_>) {
    if context.config.write_log {
        debug!("Server error callback (connection {})", event.connection.id());
    }
    match ErrorNotification::decode(event.payload) {
        Ok(notification) => {
            context.hooks.on_server_error(event.connection, notification.error_code, context.actions)
        }
        Err(err) => error!("Dropping malformed server error event: {}", err),
    }
}

// ============================================================================
// Client callbacks
// ============================================================================

fn on_client_connect<H: SessionHooks>(context: &mut ClientContext<'_, H>, event: NetworkEvent<'_>) {
    if context.config.write_log {
        debug!("Client connect callback (connection {})", event.connection.id());
    }
    event.connection.set_max_delay(context.config.max_delay);
    context.hooks.on_client_connect(event.connection, context.actions);
}

fn on_client_disconnect<H: SessionHooks>(
    context: &mut ClientContext<'_, H>,
    event: NetworkEvent<'_>,
) {
    if context.config.write_log {
        debug!("Client disconnect callback (connection {})", event.connection.id());
    }
    context.hooks.on_client_disconnect(event.connection, context.actions);
}

fn on_client_error<H: SessionHooks>(context: &mut ClientContext<'_, H>, event: NetworkEvent<'_>) {
    if context.config.write_log {
        debug!("Client error callback (connection {})", event.connection.id());
    }
    match ErrorNotification::decode(event.payload) {
        Ok(notification) => {
            context.hooks.on_client_error(event.connection, notification.error_code, context.actions)
        }
        Err(err) => error!("Dropping malformed client error event: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use rolenet_core::transport::Connection;

    use super::*;
    use crate::hooks::NoHooks;

    #[derive(Debug)]
    struct FakeConnection {
        id: ConnectionId,
        max_delay: Duration,
    }

    impl FakeConnection {
        fn new(id: ConnectionId) -> Self {
            Self { id, max_delay: Duration::ZERO }
        }
    }

    impl Connection for FakeConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn address(&self) -> SocketAddr {
            "127.0.0.1:9000".parse().unwrap()
        }

        fn max_delay(&self) -> Duration {
            self.max_delay
        }

        fn set_max_delay(&mut self, delay: Duration) {
            self.max_delay = delay;
        }
    }

    #[derive(Debug, Default)]
    struct Recorder {
        server_connects: Vec<ConnectionId>,
        server_disconnects: Vec<ConnectionId>,
        server_errors: Vec<(ConnectionId, i32)>,
        client_connects: usize,
        client_errors: Vec<i32>,
    }

    impl SessionHooks for Recorder {
        fn on_server_connect(&mut self, connection: &mut dyn Connection, _: &mut Vec<SessionAction>) {
            self.server_connects.push(connection.id());
        }

        fn on_server_disconnect(
            &mut self,
            connection: &mut dyn Connection,
            _: &mut Vec<SessionAction>,
        ) {
            self.server_disconnects.push(connection.id());
        }

        fn on_server_error(
            &mut self,
            connection: &mut dyn Connection,
            error_code: i32,
            _: &mut Vec<SessionAction>,
        ) {
            self.server_errors.push((connection.id(), error_code));
        }

        fn on_client_connect(&mut self, _: &mut dyn Connection, _: &mut Vec<SessionAction>) {
            self.client_connects += 1;
        }

        fn on_client_error(
            &mut self,
            _: &mut dyn Connection,
            error_code: i32,
            _: &mut Vec<SessionAction>,
        ) {
            self.client_errors.push(error_code);
        }
    }

    fn event<'a>(
        kind: EventKind,
        connection: &'a mut FakeConnection,
        payload: &'a [u8],
    ) -> NetworkEvent<'a> {
        NetworkEvent { kind, connection, payload }
    }

    #[test]
    fn test_tables_register_three_kinds() {
        let server = ServerDispatchTable::<NoHooks>::server();
        let client = ClientDispatchTable::<NoHooks>::client();
        for kind in EventKind::ALL {
            assert!(server.is_registered(kind));
            assert!(client.is_registered(kind));
        }
        assert_eq!(server.len(), 3);
        assert_eq!(client.len(), 3);
    }

    #[test]
    fn test_unregistered_kind_is_not_dispatched() {
        let table = ServerDispatchTable::<Recorder>::new();
        assert!(table.is_empty());

        let config = SessionConfig::default();
        let mut hooks = Recorder::default();
        let mut connected = HashSet::new();
        let mut actions = Vec::new();
        let mut context = ServerContext {
            config: &config,
            hooks: &mut hooks,
            connected: &mut connected,
            actions: &mut actions,
        };
        let mut connection = FakeConnection::new(1);
        assert!(!table.dispatch(&mut context, event(EventKind::Connect, &mut connection, &[])));
        assert!(hooks.server_connects.is_empty());
    }

    #[test]
    fn test_server_connect_is_suppressed_until_disconnect() {
        let table = ServerDispatchTable::<Recorder>::server();
        let config = SessionConfig::default();
        let mut hooks = Recorder::default();
        let mut connected = HashSet::new();
        let mut actions = Vec::new();
        let mut connection = FakeConnection::new(7);

        {
            let mut context = ServerContext {
                config: &config,
                hooks: &mut hooks,
                connected: &mut connected,
                actions: &mut actions,
            };
            table.dispatch(&mut context, event(EventKind::Connect, &mut connection, &[]));
            table.dispatch(&mut context, event(EventKind::Connect, &mut connection, &[]));
            table.dispatch(&mut context, event(EventKind::Disconnect, &mut connection, &[]));
            table.dispatch(&mut context, event(EventKind::Disconnect, &mut connection, &[]));
            table.dispatch(&mut context, event(EventKind::Connect, &mut connection, &[]));
        }

        assert_eq!(hooks.server_connects, vec![7, 7]);
        assert_eq!(hooks.server_disconnects, vec![7]);
        assert!(connected.contains(&7));
    }

    #[test]
    fn test_connect_applies_max_delay() {
        let server = ServerDispatchTable::<Recorder>::server();
        let client = ClientDispatchTable::<Recorder>::client();
        let mut config = SessionConfig::default();
        config.max_delay = Duration::from_millis(25);
        let mut hooks = Recorder::default();
        let mut connected = HashSet::new();
        let mut actions = Vec::new();

        let mut server_side = FakeConnection::new(1);
        let mut context = ServerContext {
            config: &config,
            hooks: &mut hooks,
            connected: &mut connected,
            actions: &mut actions,
        };
        server.dispatch(&mut context, event(EventKind::Connect, &mut server_side, &[]));
        assert_eq!(server_side.max_delay(), Duration::from_millis(25));

        let mut client_side = FakeConnection::new(2);
        let mut context = ClientContext { config: &config, hooks: &mut hooks, actions: &mut actions };
        client.dispatch(&mut context, event(EventKind::Connect, &mut client_side, &[]));
        assert_eq!(client_side.max_delay(), Duration::from_millis(25));
        assert_eq!(hooks.client_connects, 1);
    }

    #[test]
    fn test_error_code_is_forwarded() {
        let server = ServerDispatchTable::<Recorder>::server();
        let client = ClientDispatchTable::<Recorder>::client();
        let config = SessionConfig::default();
        let mut hooks = Recorder::default();
        let mut connected = HashSet::new();
        let mut actions = Vec::new();
        let payload = ErrorNotification::new(42).encode();

        let mut connection = FakeConnection::new(5);
        let mut context = ServerContext {
            config: &config,
            hooks: &mut hooks,
            connected: &mut connected,
            actions: &mut actions,
        };
        server.dispatch(&mut context, event(EventKind::Error, &mut connection, &payload));

        let mut context = ClientContext { config: &config, hooks: &mut hooks, actions: &mut actions };
        client.dispatch(&mut context, event(EventKind::Error, &mut connection, &payload));

        assert_eq!(hooks.server_errors, vec![(5, 42)]);
        assert_eq!(hooks.client_errors, vec![42]);
    }

    #[test]
    fn test_malformed_error_payload_is_dropped() {
        let server = ServerDispatchTable::<Recorder>::server();
        let config = SessionConfig::default();
        let mut hooks = Recorder::default();
        let mut connected = HashSet::new();
        let mut actions = Vec::new();
        let mut connection = FakeConnection::new(5);
        let mut context = ServerContext {
            config: &config,
            hooks: &mut hooks,
            connected: &mut connected,
            actions: &mut actions,
        };
        assert!(server.dispatch(&mut context, event(EventKind::Error, &mut connection, &[1])));
        assert!(hooks.server_errors.is_empty());
    }

    #[test]
    fn test_default_client_disconnect_requests_stop() {
        let client = ClientDispatchTable::<NoHooks>::client();
        let config = SessionConfig::default();
        let mut hooks = NoHooks;
        let mut actions = Vec::new();
        let mut connection = FakeConnection::new(1);
        let mut context = ClientContext { config: &config, hooks: &mut hooks, actions: &mut actions };
        client.dispatch(&mut context, event(EventKind::Disconnect, &mut connection, &[]));
        assert_eq!(actions, vec![SessionAction::StopClient]);
    }
}
