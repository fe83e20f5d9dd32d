use std::{collections::HashSet, net::SocketAddr};

use rolenet_core::transport::{ConnectionId, Connector, Listener};

use crate::{
    dispatch::{ClientDispatchTable, ServerDispatchTable},
    hooks::SessionHooks,
};

/// Identity of a client role and the endpoint its connector targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientHandle {
    id: u64,
    address: String,
    port: u16,
}

impl ClientHandle {
    pub(crate) fn new(id: u64, address: impl Into<String>, port: u16) -> Self {
        Self { id, address: address.into(), port }
    }

    /// Returns the id, unique per client role started by one session manager.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the address the client connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the port the client connects to.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// An active server role: a listener plus its dispatch table.
pub struct ServerRole<L: Listener, H> {
    pub(crate) listener: L,
    pub(crate) dispatch: ServerDispatchTable<H>,
    /// Connections whose connect hook has fired and whose disconnect hook has not.
    pub(crate) connected: HashSet<ConnectionId>,
    pub(crate) bound: bool,
}

impl<L: Listener, H: SessionHooks> ServerRole<L, H> {
    pub(crate) fn new(listener: L) -> Self {
        Self {
            listener,
            dispatch: ServerDispatchTable::server(),
            connected: HashSet::new(),
            bound: false,
        }
    }

    /// Returns the listener.
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Returns the listener mutably.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Returns whether the listener bound successfully.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Returns the bound address, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns whether any connection is currently marked connected.
    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    /// Returns whether the given connection is currently marked connected.
    pub fn is_connection_connected(&self, id: ConnectionId) -> bool {
        self.connected.contains(&id)
    }

    /// Returns the number of connections currently marked connected.
    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }
}

impl<L: Listener + std::fmt::Debug, H> std::fmt::Debug for ServerRole<L, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRole")
            .field("listener", &self.listener)
            .field("dispatch", &self.dispatch)
            .field("connected", &self.connected)
            .field("bound", &self.bound)
            .finish()
    }
}

/// An active client role: a connector plus its dispatch table.
pub struct ClientRole<C: Connector, H> {
    pub(crate) connector: C,
    pub(crate) dispatch: ClientDispatchTable<H>,
    pub(crate) handle: ClientHandle,
}

impl<C: Connector, H: SessionHooks> ClientRole<C, H> {
    pub(crate) fn new(connector: C, handle: ClientHandle) -> Self {
        Self { connector, dispatch: ClientDispatchTable::client(), handle }
    }

    /// Returns the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the connector mutably.
    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Returns the handle identifying this role.
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }
}

impl<C: Connector + std::fmt::Debug, H> std::fmt::Debug for ClientRole<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRole")
            .field("connector", &self.connector)
            .field("dispatch", &self.dispatch)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_handle_accessors() {
        let handle = ClientHandle::new(3, "localhost", 7770);
        assert_eq!(handle.id(), 3);
        assert_eq!(handle.address(), "localhost");
        assert_eq!(handle.port(), 7770);
        assert_eq!(handle.clone(), handle);
        assert_ne!(handle, ClientHandle::new(4, "localhost", 7770));
    }
}
