//! User customization points for the session lifecycle.
//!
//! Every method has a default body. All are empty except
//! [`SessionHooks::on_client_disconnect`], which stops the client so that losing the
//! remote server tears the local client role down unless overridden.

use rolenet_core::transport::Connection;

use crate::role::ClientHandle;

/// Lifecycle changes a hook can request from the session manager.
///
/// Requests are queued while the transport is being drained and applied in order
/// once the role that produced them has finished its update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Call `start_server`.
    StartServer,
    /// Call `start_client`.
    StartClient,
    /// Call `start_host`.
    StartHost,
    /// Call `stop_server`.
    StopServer,
    /// Call `stop_client`.
    StopClient,
    /// Call `stop_host`.
    StopHost,
}

/// Hooks invoked by the session manager.
#[allow(unused_variables)]
pub trait SessionHooks {
    /// Invoked at the start of `start_host`, before the server starts.
    fn on_start_host(&mut self) {}

    /// Invoked before a new server role binds. Also invoked when a host starts.
    fn on_start_server(&mut self) {}

    /// Invoked after a new client role has started connecting.
    ///
    /// A host invokes it a second time with its local client.
    fn on_start_client(&mut self, client: &ClientHandle) {}

    /// Invoked before a server role is torn down. Also invoked when a host stops.
    fn on_stop_server(&mut self) {}

    /// Invoked before a client role is torn down.
    fn on_stop_client(&mut self) {}

    /// Invoked at the start of `stop_host`.
    fn on_stop_host(&mut self) {}

    /// A peer connected to the server.
    fn on_server_connect(
        &mut self,
        connection: &mut dyn Connection,
        actions: &mut Vec<SessionAction>,
    ) {
    }

    /// A peer disconnected from the server.
    fn on_server_disconnect(
        &mut self,
        connection: &mut dyn Connection,
        actions: &mut Vec<SessionAction>,
    ) {
    }

    /// The server's transport reported an error on a connection.
    fn on_server_error(
        &mut self,
        connection: &mut dyn Connection,
        error_code: i32,
        actions: &mut Vec<SessionAction>,
    ) {
    }

    /// The client connected to its server.
    fn on_client_connect(
        &mut self,
        connection: &mut dyn Connection,
        actions: &mut Vec<SessionAction>,
    ) {
    }

    /// The client lost its server. Stops the client by default.
    fn on_client_disconnect(
        &mut self,
        connection: &mut dyn Connection,
        actions: &mut Vec<SessionAction>,
    ) {
        actions.push(SessionAction::StopClient);
    }

    /// The client's transport reported an error.
    fn on_client_error(
        &mut self,
        connection: &mut dyn Connection,
        error_code: i32,
        actions: &mut Vec<SessionAction>,
    ) {
    }
}

/// Hooks with every default behavior and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SessionHooks for NoHooks {}
