use std::{default::Default, time::Duration};

use crate::constants::{
    DEFAULT_LISTEN_BACKLOG, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_DELAY, DEFAULT_NETWORK_PORT,
    LOCAL_ADDRESS,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Transport tuning handed through to listeners and connectors.
///
/// The session manager never reads these values itself; it only passes them to
/// `Listener::configure` / `Connector::configure`.
pub struct ConnectionConfig {
    /// Backlog passed to `listen(2)` for stream transports.
    pub backlog: i32,
    /// Disable Nagle's algorithm on accepted and outgoing streams.
    pub nodelay: bool,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing packets (None = use system default).
    pub socket_ttl: Option<u32>,
    /// Size of the scratch buffer used when draining a stream.
    pub receive_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_LISTEN_BACKLOG,
            nodelay: true,
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
            socket_ttl: None,              // Use system default
            receive_buffer_size: 4096,
        }
    }
}

#[derive(Clone, Debug)]
/// Options a caller sets before starting a server, client or host.
pub struct SessionConfig {
    /// Selects the listener's alternate wire transport when it has one.
    pub use_alternate_transport: bool,
    /// Target address for clients. Overwritten with [`LOCAL_ADDRESS`] when a host starts.
    pub network_address: String,
    /// Bind port for servers, target port for clients.
    pub network_port: u16,
    /// Bind the server to `server_bind_address` instead of the wildcard address.
    pub server_bind_to_ip: bool,
    /// Address used when `server_bind_to_ip` is set. Ignored when empty.
    pub server_bind_address: String,
    /// Opaque transport tuning passed to listeners and connectors.
    pub connection_config: ConnectionConfig,
    /// Upper bound on simultaneously accepted connections.
    pub max_connections: usize,
    /// Send-coalescing delay applied to every connection on its first connect event.
    pub max_delay: Duration,
    /// Emit session-level debug logs.
    pub write_log: bool,
}

impl SessionConfig {
    /// Returns the explicit server bind address, if one is configured and enabled.
    pub fn bind_address(&self) -> Option<&str> {
        if self.server_bind_to_ip && !self.server_bind_address.is_empty() {
            Some(self.server_bind_address.as_str())
        } else {
            None
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_alternate_transport: false,
            network_address: LOCAL_ADDRESS.to_string(),
            network_port: DEFAULT_NETWORK_PORT,
            server_bind_to_ip: false,
            server_bind_address: String::new(),
            connection_config: ConnectionConfig::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_delay: DEFAULT_MAX_DELAY,
            write_log: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.network_address, "localhost");
        assert_eq!(config.network_port, 7770);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.max_delay, Duration::from_millis(10));
        assert!(!config.use_alternate_transport);
        assert!(!config.write_log);
    }

    #[test]
    fn test_bind_address_requires_flag_and_value() {
        let mut config = SessionConfig::default();
        assert_eq!(config.bind_address(), None);

        config.server_bind_address = "192.168.1.10".to_string();
        assert_eq!(config.bind_address(), None, "flag is off");

        config.server_bind_to_ip = true;
        assert_eq!(config.bind_address(), Some("192.168.1.10"));

        config.server_bind_address.clear();
        assert_eq!(config.bind_address(), None, "empty address falls back to wildcard");
    }
}
