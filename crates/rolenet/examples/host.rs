//! Listen-server over TCP: a server plus a local client in one process.
//!
//! Run:
//! - cargo run -p rolenet --example host
//! - cargo run -p rolenet --example host -- 7777
//!
//! The host stops itself once its local client has connected.

use std::{env, time::Duration};

use rolenet::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct HostHooks {
    peers: usize,
}

impl SessionHooks for HostHooks {
    fn on_start_host(&mut self) {
        tracing::info!("Host starting");
    }

    fn on_server_connect(&mut self, connection: &mut dyn Connection, _: &mut Vec<SessionAction>) {
        self.peers += 1;
        tracing::info!("[server] peer {} joined, {} connected", connection.address(), self.peers);
    }

    fn on_server_disconnect(
        &mut self,
        connection: &mut dyn Connection,
        _: &mut Vec<SessionAction>,
    ) {
        self.peers = self.peers.saturating_sub(1);
        tracing::info!("[server] peer {} left, {} connected", connection.address(), self.peers);
    }

    fn on_client_connect(
        &mut self,
        connection: &mut dyn Connection,
        actions: &mut Vec<SessionAction>,
    ) {
        tracing::info!("[client] local client connected to {}", connection.address());
        actions.push(SessionAction::StopHost);
    }

    fn on_stop_host(&mut self) {
        tracing::info!("Host stopping");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = SessionConfig { write_log: true, ..SessionConfig::default() };
    if let Some(port) = env::args().nth(1) {
        config.network_port = port.parse()?;
    }

    let mut manager = SessionManager::with_hooks(TcpTransport, config, HostHooks::default());
    let local_client = manager.start_host().ok_or("host failed to bind")?;
    tracing::info!("Local client {} targets port {}", local_client.id(), local_client.port());

    manager.start_polling_with_duration(Some(Duration::from_millis(10)));
    Ok(())
}
