#![warn(missing_docs)]

//! rolenet-host: server/client/host session lifecycle over pluggable transports.

mod dispatch;
/// Overridable lifecycle and event hooks.
pub mod hooks;
/// Server and client roles.
pub mod role;
/// Session manager sequencing role start/stop and event delivery.
pub mod session_manager;

pub use hooks::{NoHooks, SessionAction, SessionHooks};
pub use role::{ClientHandle, ClientRole, ServerRole};
pub use session_manager::SessionManager;
