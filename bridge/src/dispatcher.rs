//! Request queue and the single worker that serializes all daemon traffic.
//!
//! Any number of callers may [`Dispatcher::submit`] concurrently; the
//! worker consumes the queue in FIFO order with at most one request in
//! flight on the wire, so submission order equals completion order and no
//! correlation identifiers are needed.
//!
//! Failures never escape to callers. A call hit by an establishment, I/O,
//! or framing failure resolves with a synthesized failure response, the
//! connection is recorded as broken, and every later call resolves with
//! the same recorded failure — permanently, until the host restarts the
//! bridge. There is no silent reconnect.

use std::time::Duration;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use cppd_protocol::codec::{FrameReader, FrameWriter};
use cppd_protocol::{Issue, Request, Response};

use crate::channel::{ByteStream, CommunicationChannel};

/// Grace period for the worker to drain the queue at shutdown.
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

/// Timeout policy for the worker's blocking points.
///
/// Both default to `None` — wait indefinitely, which is the historical
/// contract with the daemon. Setting them turns a permanently stuck daemon
/// into an ordinary transport failure: a synthesized response for the
/// current call and a permanently broken connection after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherOptions {
    pub establish_timeout: Option<Duration>,
    pub exchange_timeout: Option<Duration>,
}

/// A queued request paired with its completion handle.
struct PendingCall {
    request: Request,
    done: oneshot::Sender<Response>,
}

/// Completion handle for one submitted request.
///
/// Always resolves — with the daemon's response, or with a synthesized
/// failure response. It never returns an error and never panics, which is
/// the contract callers rely on to survive a daemon outage.
pub struct ResponseHandle {
    rx: oneshot::Receiver<Response>,
}

impl ResponseHandle {
    pub async fn wait(self) -> Response {
        match self.rx.await {
            Ok(response) => response,
            // The worker was aborted before reaching this call (shutdown).
            Err(_) => failure_response(
                "analysis dispatcher shut down before the request was processed",
            ),
        }
    }
}

/// The synthesized failure shape: exactly one issue, line 0.
fn failure_response(message: &str) -> Response {
    Response {
        issues: vec![Issue {
            message: message.to_string(),
            line: 0,
        }],
    }
}

/// Queue plus single worker over one communication channel.
pub struct Dispatcher {
    queue_tx: mpsc::UnboundedSender<PendingCall>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Start the worker over `channel`.
    ///
    /// The connection is established lazily, when the first call is
    /// dequeued, and exactly once.
    pub fn spawn<C: CommunicationChannel>(channel: C, options: DispatcherOptions) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            channel: Some(channel),
            conn: Conn::Idle,
            options,
        };
        Self {
            queue_tx,
            worker: tokio::spawn(worker.run(queue_rx)),
        }
    }

    /// Enqueue a request. Never blocks the caller; safe to call from any
    /// task or thread without external locking.
    #[must_use]
    pub fn submit(&self, request: Request) -> ResponseHandle {
        let (done, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(call)) = self.queue_tx.send(PendingCall { request, done })
        {
            // Queue already closed (a submit raced shutdown).
            let _ = call
                .done
                .send(failure_response("analysis dispatcher is shut down"));
        }
        ResponseHandle { rx }
    }

    /// Stop accepting submissions, give the worker a grace period to drain
    /// the queue, then abort it.
    ///
    /// Calls aborted mid-drain still resolve, through the
    /// [`ResponseHandle`] fallback.
    pub async fn shutdown(self) {
        drop(self.queue_tx);
        let abort = self.worker.abort_handle();
        match tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), self.worker).await {
            Ok(_) => {}
            Err(_) => {
                tracing::debug!("dispatch worker did not drain in time, aborting");
                abort.abort();
            }
        }
    }
}

/// Connection lifecycle. The transition to `Broken` is permanent for the
/// dispatcher's lifetime; the stored description is what every subsequent
/// call fails with.
enum Conn {
    Idle,
    Ready {
        reader: FrameReader<ReadHalf<ByteStream>>,
        writer: FrameWriter<WriteHalf<ByteStream>>,
    },
    Broken(String),
}

struct Worker<C> {
    /// Taken on first establishment; never refilled.
    channel: Option<C>,
    conn: Conn,
    options: DispatcherOptions,
}

impl<C: CommunicationChannel> Worker<C> {
    async fn run(mut self, mut queue_rx: mpsc::UnboundedReceiver<PendingCall>) {
        while let Some(call) = queue_rx.recv().await {
            let response = self.process(call.request).await;
            // The caller may have dropped its handle; that is its business.
            let _ = call.done.send(response);
        }
        tracing::debug!("dispatch queue closed, worker exiting");
    }

    async fn process(&mut self, request: Request) -> Response {
        if let Err(msg) = self.ensure_established().await {
            return failure_response(&msg);
        }

        let exchange_timeout = self.options.exchange_timeout;
        let Conn::Ready { reader, writer } = &mut self.conn else {
            // ensure_established only returns Ok with a ready connection.
            return failure_response("analyzer channel is not established");
        };

        match exchange(reader, writer, &request, exchange_timeout).await {
            Ok(response) => response,
            Err(msg) => {
                tracing::warn!(file = %request.file, "analysis exchange failed: {msg}");
                let response = failure_response(&msg);
                self.conn = Conn::Broken(msg);
                response
            }
        }
    }

    /// Leave the connection `Ready`, or return the failure description it
    /// is now permanently `Broken` with.
    async fn ensure_established(&mut self) -> Result<(), String> {
        if matches!(self.conn, Conn::Ready { .. }) {
            return Ok(());
        }
        if let Conn::Broken(msg) = &self.conn {
            return Err(msg.clone());
        }

        match self.establish_stream().await {
            Ok(stream) => {
                let (read_half, write_half) = tokio::io::split(stream);
                self.conn = Conn::Ready {
                    reader: FrameReader::new(read_half),
                    writer: FrameWriter::new(write_half),
                };
                Ok(())
            }
            Err(msg) => {
                tracing::warn!("analyzer channel could not be established: {msg}");
                self.conn = Conn::Broken(msg.clone());
                Err(msg)
            }
        }
    }

    /// First use consumes the channel; there is no re-establishment.
    async fn establish_stream(&mut self) -> Result<ByteStream, String> {
        let Some(mut channel) = self.channel.take() else {
            return Err("communication channel already consumed".to_string());
        };

        let connect = channel.establish();
        let result = match self.options.establish_timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(format!(
                        "timed out after {limit:?} waiting for the analyzer daemon to connect"
                    ));
                }
            },
            None => connect.await,
        };

        result.map_err(|e| format!("could not establish analyzer channel: {e}"))
    }
}

/// One exchange: exactly one frame out, then exactly one frame in.
async fn exchange(
    reader: &mut FrameReader<ReadHalf<ByteStream>>,
    writer: &mut FrameWriter<WriteHalf<ByteStream>>,
    request: &Request,
    limit: Option<Duration>,
) -> Result<Response, String> {
    let io = async {
        writer
            .write_frame(request)
            .await
            .map_err(|e| format!("could not send analysis request: {e}"))?;

        match reader.read_frame::<Response>().await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(
                "analyzer daemon closed the stream before responding (unexpected end of stream)"
                    .to_string(),
            ),
            Err(e) => Err(format!("could not read analysis response: {e}")),
        }
    };

    match limit {
        Some(limit) => match tokio::time::timeout(limit, io).await {
            Ok(result) => result,
            Err(_) => Err(format!("analysis exchange timed out after {limit:?}")),
        },
        None => io.await,
    }
}
