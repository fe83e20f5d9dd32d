//! Dedicated TCP server that logs peers as they come and go.
//!
//! Run:
//! - cargo run -p rolenet --example server
//! - cargo run -p rolenet --example server -- 7777
//!
//! Set `RUST_LOG=debug` to see the session-level logs.

use std::{env, time::Duration};

use rolenet::prelude::*;
use tracing_subscriber::EnvFilter;

struct LoggingServer;

impl SessionHooks for LoggingServer {
    fn on_start_server(&mut self) {
        tracing::info!("Server starting");
    }

    fn on_server_connect(&mut self, connection: &mut dyn Connection, _: &mut Vec<SessionAction>) {
        tracing::info!("[connect] {} ({})", connection.address(), connection.id());
    }

    fn on_server_disconnect(
        &mut self,
        connection: &mut dyn Connection,
        _: &mut Vec<SessionAction>,
    ) {
        tracing::info!("[disconnect] {} ({})", connection.address(), connection.id());
    }

    fn on_server_error(
        &mut self,
        connection: &mut dyn Connection,
        error_code: i32,
        _: &mut Vec<SessionAction>,
    ) {
        tracing::warn!("[error] {} code={}", connection.address(), error_code);
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

    let mut manager = SessionManager::with_hooks(TcpTransport, config, LoggingServer);
    if !manager.start_server() {
        return Err("server failed to bind".into());
    }
    tracing::info!("Listening on {:?}", manager.server().and_then(|server| server.local_addr()));

    manager.start_polling_with_duration(Some(Duration::from_millis(10)));
    Ok(())
}
