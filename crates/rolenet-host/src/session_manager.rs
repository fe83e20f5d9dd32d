use std::{
    thread::{sleep, yield_now},
    time::Duration,
};

use rolenet_core::{
    config::SessionConfig,
    constants::LOCAL_ADDRESS,
    event::NetworkEvent,
    transport::{Connector, Listener, TransportFactory},
};
use tracing::{debug, warn};

use crate::{
    dispatch::{ClientContext, ServerContext},
    hooks::{NoHooks, SessionAction, SessionHooks},
    role::{ClientHandle, ClientRole, ServerRole},
};

/// Owns the server and client roles of one process-level session.
///
/// At most one server role and one client role exist at a time. A host is a server
/// plus a client targeting [`LOCAL_ADDRESS`] on the server's port.
///
/// Nothing here blocks or raises: a failed bind is reported by [`start_server`]'s
/// return value, connection outcomes arrive as events on later [`update`] calls.
///
/// [`start_server`]: SessionManager::start_server
/// [`update`]: SessionManager::update
pub struct SessionManager<T: TransportFactory, H: SessionHooks = NoHooks> {
    config: SessionConfig,
    transport: T,
    hooks: H,
    server: Option<ServerRole<T::Listener, H>>,
    client: Option<ClientRole<T::Connector, H>>,
    active: bool,
    next_client_id: u64,
}

impl<T: TransportFactory> SessionManager<T, NoHooks> {
    /// Creates a session manager with the default hooks.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_hooks(transport, config, NoHooks)
    }
}

impl<T: TransportFactory, H: SessionHooks> SessionManager<T, H> {
    /// Creates a session manager with custom hooks.
    pub fn with_hooks(transport: T, config: SessionConfig, hooks: H) -> Self {
        Self {
            config,
            transport,
            hooks,
            server: None,
            client: None,
            active: false,
            next_client_id: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Server lifecycle
    // ------------------------------------------------------------------------

    /// Starts the server role and binds its listener.
    ///
    /// Returns true immediately, without hooks or a second bind, if a server role
    /// already exists. Otherwise returns the bind outcome, which also becomes the
    /// network-active flag.
    pub fn start_server(&mut self) -> bool {
        if self.server.is_some() {
            return true;
        }

        self.hooks.on_start_server();

        let mut role = ServerRole::new(self.transport.create_listener());
        role.listener.set_use_alternate_transport(self.config.use_alternate_transport);
        if !role.listener.configure(&self.config.connection_config, self.config.max_connections) {
            warn!("Listener rejected the connection configuration");
        }

        let port = self.config.network_port;
        role.bound = match self.config.bind_address() {
            Some(address) => role.listener.listen(Some(address), port),
            None => role.listener.listen(None, port),
        };
        if !role.bound {
            warn!("Server failed to bind port {}", port);
        } else if self.config.write_log {
            debug!("Server listening on {:?}", role.listener.local_addr());
        }

        self.active = role.bound;
        self.server = Some(role);
        self.active
    }

    /// Stops the server role. Safe to call in any state.
    pub fn stop_server(&mut self) {
        self.active = false;

        if self.server.is_none() {
            return;
        }

        self.hooks.on_stop_server();

        if self.config.write_log {
            debug!("Stopping server");
        }
        if let Some(mut role) = self.server.take() {
            role.listener.stop();
        }
    }

    // ------------------------------------------------------------------------
    // Client lifecycle
    // ------------------------------------------------------------------------

    /// Starts the client role and begins connecting to the configured address.
    ///
    /// Returns the existing handle if a client role already exists. The connect hook
    /// fires on a later [`update`](Self::update), once the transport reports it.
    pub fn start_client(&mut self) -> ClientHandle {
        let address = self.config.network_address.clone();
        self.start_client_to(address, self.config.network_port)
    }

    fn start_client_to(&mut self, address: String, port: u16) -> ClientHandle {
        if let Some(role) = &self.client {
            return role.handle.clone();
        }

        self.next_client_id += 1;
        let handle = ClientHandle::new(self.next_client_id, address, port);

        let mut role = ClientRole::new(self.transport.create_connector(), handle.clone());
        if !role.connector.configure(&self.config.connection_config, self.config.max_connections)
        {
            warn!("Connector rejected the connection configuration");
        }
        role.connector.connect(handle.address(), handle.port());
        self.client = Some(role);
        self.active = true;

        self.hooks.on_start_client(&handle);
        handle
    }

    /// Stops the client role. Safe to call in any state.
    ///
    /// Only this manager's connection is severed; other connectors sharing the same
    /// transport are unaffected.
    pub fn stop_client(&mut self) {
        self.active = false;

        if self.client.is_none() {
            return;
        }

        self.hooks.on_stop_client();

        if self.config.write_log {
            debug!("Stopping client");
        }
        if let Some(mut role) = self.client.take() {
            role.connector.disconnect();
            role.connector.shutdown();
        }
    }

    // ------------------------------------------------------------------------
    // Host composition
    // ------------------------------------------------------------------------

    /// Starts a server and a local client connected to it.
    ///
    /// On a successful bind, `network_address` is rewritten to [`LOCAL_ADDRESS`] before
    /// the client starts; this is the only place the manager mutates its configuration.
    /// The local client targets the port the server actually bound, which differs from
    /// `network_port` when that is 0. Returns `None` when the server failed to bind.
    pub fn start_host(&mut self) -> Option<ClientHandle> {
        self.hooks.on_start_host();
        if !self.start_server() {
            return None;
        }

        let local_client = self.connect_local_client();
        self.hooks.on_start_client(&local_client);
        Some(local_client)
    }

    fn connect_local_client(&mut self) -> ClientHandle {
        let port = self
            .server
            .as_ref()
            .and_then(|server| server.local_addr())
            .map_or(self.config.network_port, |address| address.port());
        if self.config.write_log {
            debug!("Starting host on port {}", port);
        }
        self.config.network_address = LOCAL_ADDRESS.to_string();
        self.start_client_to(LOCAL_ADDRESS.to_string(), port)
    }

    /// Stops the server and the client, each independently of the other.
    pub fn stop_host(&mut self) {
        self.hooks.on_stop_host();

        self.stop_server();
        self.stop_client();
    }

    // ------------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------------

    /// Drains pending transport events and dispatches them to the hooks.
    ///
    /// The server is drained first, then the client. Actions requested by hooks are
    /// applied after the role that produced them has been drained, so a role stopped by
    /// its own hook never reports events on a later `update`. Events already drained in
    /// the same batch are still delivered.
    pub fn update(&mut self) {
        let mut actions = Vec::new();
        if let Some(role) = self.server.as_mut() {
            let ServerRole { listener, dispatch, connected, .. } = role;
            let mut context = ServerContext {
                config: &self.config,
                hooks: &mut self.hooks,
                connected,
                actions: &mut actions,
            };
            listener.update(&mut |event: NetworkEvent<'_>| {
                dispatch.dispatch(&mut context, event);
            });
        }
        self.apply_actions(actions);

        let mut actions = Vec::new();
        if let Some(role) = self.client.as_mut() {
            let ClientRole { connector, dispatch, .. } = role;
            let mut context =
                ClientContext { config: &self.config, hooks: &mut self.hooks, actions: &mut actions };
            connector.update(&mut |event: NetworkEvent<'_>| {
                dispatch.dispatch(&mut context, event);
            });
        }
        self.apply_actions(actions);
    }

    /// Polls in a loop with 1ms intervals until both roles have stopped (blocking call).
    pub fn start_polling(&mut self) {
        self.start_polling_with_duration(Some(Duration::from_millis(1)))
    }

    /// Polls with a custom sleep between polls until both roles have stopped.
    pub fn start_polling_with_duration(&mut self, sleep_duration: Option<Duration>) {
        while self.is_server_active() || self.is_client_active() {
            self.update();
            match sleep_duration {
                None => yield_now(),
                Some(duration) => sleep(duration),
            };
        }
    }

    fn apply_actions(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::StartServer => {
                    self.start_server();
                }
                SessionAction::StartClient => {
                    self.start_client();
                }
                SessionAction::StartHost => {
                    self.start_host();
                }
                SessionAction::StopServer => self.stop_server(),
                SessionAction::StopClient => self.stop_client(),
                SessionAction::StopHost => self.stop_host(),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Returns whether the last start succeeded and no stop has happened since.
    pub fn is_network_active(&self) -> bool {
        self.active
    }

    /// Returns whether a server role exists.
    pub fn is_server_active(&self) -> bool {
        self.server.is_some()
    }

    /// Returns whether a client role exists.
    pub fn is_client_active(&self) -> bool {
        self.client.is_some()
    }

    /// Returns the server role, if any.
    pub fn server(&self) -> Option<&ServerRole<T::Listener, H>> {
        self.server.as_ref()
    }

    /// Returns the client role, if any.
    pub fn client(&self) -> Option<&ClientRole<T::Connector, H>> {
        self.client.as_ref()
    }

    /// Returns the server role mutably, if any.
    pub fn server_mut(&mut self) -> Option<&mut ServerRole<T::Listener, H>> {
        self.server.as_mut()
    }

    /// Returns the client role mutably, if any.
    pub fn client_mut(&mut self) -> Option<&mut ClientRole<T::Connector, H>> {
        self.client.as_mut()
    }

    /// Returns the handle of the current client role, if any.
    pub fn client_handle(&self) -> Option<&ClientHandle> {
        self.client.as_ref().map(|role| &role.handle)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the configuration for changes that apply to the next start.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Returns the hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Returns the hooks mutably.
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Returns the transport factory.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T, H> std::fmt::Debug for SessionManager<T, H>
where
    T: TransportFactory + std::fmt::Debug,
    T::Listener: std::fmt::Debug,
    T::Connector: std::fmt::Debug,
    H: SessionHooks + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("hooks", &self.hooks)
            .field("server", &self.server)
            .field("client", &self.client)
            .field("active", &self.active)
            .finish()
    }
}
