//! Dispatch bridge between an editor host and an out-of-process analyzer
//! daemon.
//!
//! The host submits analysis requests (typically on save events) and gets a
//! completion handle back immediately; a single worker serializes all
//! daemon traffic over one lazily established connection. A handle always
//! resolves — with the daemon's issues on success, or with one synthesized
//! issue describing the transport failure when the daemon is absent, slow,
//! or crashed. Once the connection breaks it stays broken for the life of
//! the bridge; there is no silent reconnect.

pub mod channel;
pub mod types;

pub(crate) mod daemon;

mod bridge;
mod dispatcher;

pub use bridge::AnalyzerBridge;
pub use dispatcher::{Dispatcher, DispatcherOptions, ResponseHandle};
pub use types::{BridgeConfig, DaemonConfig, TransportConfig};
