//! `AnalyzerBridge` facade — the explicitly constructed service object
//! owning the channel, the daemon process handle, and the dispatcher.
//!
//! Hosts construct one bridge per session and inject it into whatever
//! triggers analysis; there is no ambient global instance.

use anyhow::{Context, Result};

use cppd_protocol::Request;

#[cfg(unix)]
use crate::channel::PipeChannel;
use crate::channel::{CommunicationChannel, TcpChannel};
use crate::daemon::DaemonProcess;
use crate::dispatcher::{Dispatcher, DispatcherOptions, ResponseHandle};
use crate::types::{BridgeConfig, DaemonConfig, TransportConfig};

pub struct AnalyzerBridge {
    dispatcher: Dispatcher,
    daemon: Option<DaemonProcess>,
}

impl AnalyzerBridge {
    /// Bind the transport, spawn the daemon with the endpoint argument,
    /// and start the dispatch worker.
    ///
    /// The listener must exist before the daemon is spawned: the daemon
    /// receives the connection identifier as a startup argument and
    /// connects back as the client.
    ///
    /// A daemon that fails to spawn is logged, not returned as an error —
    /// callers will observe broken-channel failure responses instead,
    /// which is the contract for every fault past construction. Only a
    /// listener that cannot bind fails `start`, since at that point no
    /// call exists to resolve.
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        let options = DispatcherOptions {
            establish_timeout: config.establish_timeout(),
            exchange_timeout: config.exchange_timeout(),
        };

        match config.transport {
            TransportConfig::Tcp { port } => {
                let channel = TcpChannel::bind(port)
                    .await
                    .context("binding loopback listener")?;
                let daemon = spawn_daemon(&config.daemon, &channel.endpoint());
                Ok(Self {
                    dispatcher: Dispatcher::spawn(channel, options),
                    daemon,
                })
            }
            #[cfg(unix)]
            TransportConfig::Pipe { dir } => {
                let channel = PipeChannel::bind(dir).context("binding pipe listener")?;
                let daemon = spawn_daemon(&config.daemon, &channel.endpoint());
                Ok(Self {
                    dispatcher: Dispatcher::spawn(channel, options),
                    daemon,
                })
            }
        }
    }

    /// Submit one analysis request.
    ///
    /// Never blocks; the handle always resolves, so a caller driving an
    /// editor save event can await it without risking a hang on a crashed
    /// daemon (subject to the configured timeouts).
    #[must_use]
    pub fn submit(&self, request: Request) -> ResponseHandle {
        self.dispatcher.submit(request)
    }

    /// Shut down: stop accepting submissions, drain or fail the pending
    /// calls, then terminate the daemon.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
        if let Some(mut daemon) = self.daemon {
            daemon.kill().await;
        }
    }
}

fn spawn_daemon(config: &DaemonConfig, endpoint: &str) -> Option<DaemonProcess> {
    match DaemonProcess::spawn(config, endpoint) {
        Ok(daemon) => Some(daemon),
        Err(e) => {
            // Spawn failures surface to callers only as broken-channel
            // symptoms once establishment gives up.
            tracing::warn!("failed to spawn analyzer daemon: {e}");
            None
        }
    }
}
