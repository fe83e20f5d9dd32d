//! TCP client that connects to a server and exits when the connection ends.
//!
//! Run the server first:
//! - cargo run -p rolenet --example server -- 7777
//!
//! Then run the client:
//! - cargo run -p rolenet --example client -- 127.0.0.1 7777

use std::{env, time::Duration};

use rolenet::prelude::*;
use tracing_subscriber::EnvFilter;

struct LoggingClient;

impl SessionHooks for LoggingClient {
    fn on_start_client(&mut self, client: &ClientHandle) {
        tracing::info!("Connecting to {}:{}", client.address(), client.port());
    }

    fn on_client_connect(&mut self, connection: &mut dyn Connection, _: &mut Vec<SessionAction>) {
        tracing::info!(
            "[connect] {} (max delay {:?})",
            connection.address(),
            connection.max_delay()
        );
    }

    fn on_client_disconnect(&mut self, _: &mut dyn Connection, actions: &mut Vec<SessionAction>) {
        tracing::info!("[disconnect] server closed the connection");
        actions.push(SessionAction::StopClient);
    }

    fn on_client_error(
        &mut self,
        _: &mut dyn Connection,
        error_code: i32,
        _: &mut Vec<SessionAction>,
    ) {
        tracing::warn!("[error] code={}", error_code);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Args: [address] [port]
    let mut args = env::args().skip(1);
    let mut config = SessionConfig::default();
    if let Some(address) = args.next() {
        config.network_address = address;
    }
    if let Some(port) = args.next() {
        config.network_port = port.parse()?;
    }

    let mut manager = SessionManager::with_hooks(TcpTransport, config, LoggingClient);
    manager.start_client();
    manager.start_polling_with_duration(Some(Duration::from_millis(10)));
    Ok(())
}
