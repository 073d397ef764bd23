//! Configuration consumed by the host application.
//!
//! The host deserializes [`BridgeConfig`] from its own configuration file
//! and hands it to [`AnalyzerBridge::start`](crate::AnalyzerBridge::start).

#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for one bridge instance.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// External analyzer daemon to spawn.
    pub daemon: DaemonConfig,
    /// Transport the daemon connects back over. Default: loopback TCP on a
    /// dynamically chosen port.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Seconds to wait for the daemon to connect before treating the
    /// channel as broken. `None` (the default) waits indefinitely, which is
    /// the historical contract with the daemon binary.
    #[serde(default)]
    pub establish_timeout_secs: Option<u64>,
    /// Seconds to wait for a single request/response exchange. `None` (the
    /// default) waits indefinitely.
    #[serde(default)]
    pub exchange_timeout_secs: Option<u64>,
}

impl BridgeConfig {
    pub(crate) fn establish_timeout(&self) -> Option<Duration> {
        self.establish_timeout_secs.map(Duration::from_secs)
    }

    pub(crate) fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout_secs.map(Duration::from_secs)
    }
}

/// How to start the external analyzer daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Executable name or path (resolved through PATH).
    pub command: String,
    /// Fixed arguments, passed before the connection identifier.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Transport selection. Modeled as data, not subclassing: the variant picks
/// the channel implementation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Loopback TCP listener. Port 0 binds a dynamically chosen free port;
    /// the daemon is told the actual port either way.
    Tcp {
        #[serde(default)]
        port: u16,
    },
    /// Uniquely named pipe (Unix domain socket). The socket name embeds a
    /// fresh per-session identifier so concurrent bridges cannot collide.
    /// `dir` defaults to the system temp directory.
    #[cfg(unix)]
    Pipe {
        #[serde(default)]
        dir: Option<PathBuf>,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp { port: 0 }
    }
}
