//! End-to-end dispatch over real transports, with an in-process stand-in
//! for the analyzer daemon connecting back as the client.

#[cfg(unix)]
use cppd_bridge::channel::PipeChannel;
use cppd_bridge::channel::{CommunicationChannel, TcpChannel};
use cppd_bridge::{Dispatcher, DispatcherOptions};
use cppd_protocol::codec::{FrameReader, FrameWriter};
use cppd_protocol::{Issue, Request, Response};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

fn ok_response() -> Response {
    Response {
        issues: vec![Issue {
            message: "ok".to_string(),
            line: 1,
        }],
    }
}

fn request(file: &str) -> Request {
    Request {
        file: file.to_string(),
        search_paths: vec!["/usr/include".to_string()],
    }
}

/// Serve `limit` exchanges on an accepted connection, recording each
/// decoded request, then drop the connection.
async fn serve<S>(stream: S, limit: usize, seen_tx: mpsc::UnboundedSender<Request>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);
    for _ in 0..limit {
        match reader.read_frame::<Request>().await {
            Ok(Some(request)) => {
                let _ = seen_tx.send(request);
                if writer.write_frame(&ok_response()).await.is_err() {
                    return;
                }
            }
            _ => return,
        }
    }
}

#[tokio::test]
async fn tcp_dispatch_round_trip() {
    let channel = TcpChannel::bind(0).await.unwrap();
    let port: u16 = channel.endpoint().parse().unwrap();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        serve(stream, 2, seen_tx).await;
    });

    let dispatcher = Dispatcher::spawn(channel, DispatcherOptions::default());

    let first = dispatcher.submit(request("a.cpp"));
    let second = dispatcher.submit(request("b.cpp"));

    assert_eq!(first.wait().await, ok_response());
    assert_eq!(second.wait().await, ok_response());

    let seen = seen_rx.recv().await.unwrap();
    assert_eq!(seen.file, "a.cpp");
    assert_eq!(seen.search_paths, vec!["/usr/include"]);
    assert_eq!(seen_rx.recv().await.unwrap().file, "b.cpp");

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn tcp_daemon_disconnect_breaks_dispatcher_permanently() {
    let channel = TcpChannel::bind(0).await.unwrap();
    let port: u16 = channel.endpoint().parse().unwrap();

    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        // One successful exchange, then the daemon goes away.
        serve(stream, 1, seen_tx).await;
    });

    let dispatcher = Dispatcher::spawn(channel, DispatcherOptions::default());

    assert_eq!(dispatcher.submit(request("a.cpp")).wait().await, ok_response());

    let broken = dispatcher.submit(request("b.cpp")).wait().await;
    assert_eq!(broken.issues.len(), 1);
    assert_eq!(broken.issues[0].line, 0);
    let message = broken.issues[0].message.clone();

    let still_broken = dispatcher.submit(request("c.cpp")).wait().await;
    assert_eq!(still_broken.issues[0].message, message);

    dispatcher.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn pipe_dispatch_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let channel = PipeChannel::bind(Some(dir.path().to_path_buf())).unwrap();
    let endpoint = channel.endpoint();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let stream = tokio::net::UnixStream::connect(&endpoint).await.unwrap();
        serve(stream, 1, seen_tx).await;
    });

    let dispatcher = Dispatcher::spawn(channel, DispatcherOptions::default());
    assert_eq!(dispatcher.submit(request("a.cpp")).wait().await, ok_response());
    assert_eq!(seen_rx.recv().await.unwrap().file, "a.cpp");

    dispatcher.shutdown().await;
}
