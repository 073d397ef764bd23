//! Lifecycle of the external analyzer daemon process.
//!
//! The daemon is spawned once, with the channel's connection identifier as
//! its final command-line argument, and connects back as the transport
//! client. Its stdout and stderr are drained line-by-line into the log.
//! A daemon that exits is not restarted: the dispatcher keeps answering
//! with synthesized failures until the host restarts the bridge. That is a
//! documented limitation, not an oversight.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::types::DaemonConfig;

#[derive(Debug, Error)]
pub(crate) enum SpawnError {
    #[error("{command} not found in PATH")]
    NotFound { command: String },

    #[error("spawning {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to the spawned daemon. Dropping it kills the process.
#[derive(Debug)]
pub(crate) struct DaemonProcess {
    child: Child,
}

impl DaemonProcess {
    /// Spawn the daemon with `endpoint` as the last positional argument.
    ///
    /// The identifier's position is part of the contract with the daemon
    /// binary; configured fixed arguments go before it.
    pub fn spawn(config: &DaemonConfig, endpoint: &str) -> Result<Self, SpawnError> {
        let resolved = which::which(&config.command).map_err(|_| SpawnError::NotFound {
            command: config.command.clone(),
        })?;

        let mut child = Command::new(&resolved)
            .args(&config.args)
            .arg(endpoint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Io {
                command: config.command.clone(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_lines(stderr, "stderr"));
        }

        tracing::info!(command = %config.command, endpoint, "analyzer daemon spawned");
        Ok(Self { child })
    }

    /// Kill the daemon if it is still running. Called at shutdown only;
    /// the process is otherwise left alone even after the channel breaks.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("killing analyzer daemon: {e}");
        }
    }
}

/// Forward one of the daemon's output streams to the log until EOF.
///
/// EOF here is the only signal the bridge gets that the daemon exited;
/// log it at info so a crashed daemon is visible without being an error
/// of the bridge itself.
async fn drain_lines<R: AsyncRead + Unpin>(stream: R, name: &'static str) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if name == "stderr" {
                    tracing::warn!(stream = name, "daemon: {line}");
                } else {
                    tracing::info!(stream = name, "daemon: {line}");
                }
            }
            Ok(None) => {
                tracing::info!("analyzer daemon closed its {name}");
                break;
            }
            Err(e) => {
                tracing::warn!("reading daemon {name}: {e}");
                break;
            }
        }
    }
}
