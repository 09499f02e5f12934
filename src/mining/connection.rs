//! Stratum socket with line-delimited JSON framing
//!
//! A connection is a TCP or TLS stream split into a reader task and a writer
//! task. The writer drains an unbounded channel of outbound lines; the reader
//! parses each inbound line and hands it to a [`ConnectionHandler`]. When the
//! reader stops (peer close, read error or shutdown) it cancels the
//! connection's `closed` token and reports the close exactly once.

use crate::context::MiningContext;
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Longest inbound line accepted; longer lines are discarded
pub(crate) const MAX_LINE_LENGTH: usize = 1 << 20;

pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub(crate) type BoxedStream = Box<dyn AsyncStream>;

/// Receives everything the reader and writer tasks observe.
///
/// Every call carries the generation the connection was opened with so the
/// receiver can ignore a connection it has already replaced.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    fn on_message(&self, generation: u64, message: Value);

    fn on_error(&self, generation: u64, error: Error);

    fn on_closed(self: Arc<Self>, generation: u64);
}

/// Sending side of an open connection
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<String>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Queue one message line for the writer task
    pub(crate) fn send(&self, line: String) -> Result<()> {
        self.outbound.send(line).map_err(|_| Error::NotConnected)
    }

    /// Cancelled once the reader task has stopped
    pub(crate) fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Handle with no socket behind it; lines land in the returned receiver
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let handle = Self {
            outbound,
            closed: CancellationToken::new(),
        };
        (handle, rx)
    }
}

/// Open the TCP socket described by `context`, wrapping it in TLS when the
/// context is secure.
pub(crate) async fn open(context: &MiningContext) -> Result<BoxedStream> {
    let tcp = TcpStream::connect((context.host(), context.port())).await?;
    tcp.set_nodelay(true)?;

    if !context.is_secure() {
        return Ok(Box::new(tcp));
    }

    let server_name = ServerName::try_from(context.host().to_string())
        .map_err(|e| Error::tls(format!("Invalid server name {}: {}", context.host(), e)))?;
    let stream = tls_connector()?.connect(server_name, tcp).await?;

    debug!(host = %context.host(), "TLS session established");
    Ok(Box::new(stream))
}

fn tls_connector() -> Result<TlsConnector> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Start the reader and writer tasks for `stream`.
///
/// Cancelling `shutdown` stops both tasks; the reader still reports the close.
pub(crate) fn spawn<H: ConnectionHandler>(
    stream: BoxedStream,
    generation: u64,
    shutdown: CancellationToken,
    handler: Arc<H>,
) -> ConnectionHandle {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut writer = FramedWrite::new(write_half, LinesCodec::new());
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let closed = CancellationToken::new();

    let writer_shutdown = shutdown.clone();
    let writer_closed = closed.clone();
    let writer_handler = Arc::clone(&handler);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_shutdown.cancelled() => break,
                _ = writer_closed.cancelled() => break,
                line = outbound_rx.recv() => {
                    let Some(line) = line else { break };
                    trace!(generation, tx = %line, "Sending message");
                    if let Err(e) = writer.send(line).await {
                        writer_handler.on_error(generation, codec_error(e));
                        break;
                    }
                }
            }
        }
        let _ = SinkExt::<String>::close(&mut writer).await;
    });

    let reader_closed = closed.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = reader.next() => frame,
            };

            match frame {
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    trace!(generation, rx = %line, "Received message");
                    match serde_json::from_str::<Value>(line) {
                        Ok(message) => handler.on_message(generation, message),
                        Err(e) => warn!(generation, error = %e, "Discarding malformed message"),
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(generation, max = MAX_LINE_LENGTH, "Discarding oversized message");
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    handler.on_error(generation, Error::Io(e));
                    break;
                }
                None => break,
            }
        }

        debug!(generation, "Connection closed");
        reader_closed.cancel();
        handler.on_closed(generation);
    });

    ConnectionHandle { outbound, closed }
}

fn codec_error(error: LinesCodecError) -> Error {
    match error {
        LinesCodecError::Io(e) => Error::Io(e),
        LinesCodecError::MaxLineLengthExceeded => Error::protocol("outbound line too long"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Endpoint;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<Value>>,
        closed: Mutex<Vec<u64>>,
    }

    impl ConnectionHandler for Recorder {
        fn on_message(&self, _generation: u64, message: Value) {
            self.messages.lock().push(message);
        }

        fn on_error(&self, _generation: u64, _error: Error) {}

        fn on_closed(self: Arc<Self>, generation: u64) {
            self.closed.lock().push(generation);
        }
    }

    #[tokio::test]
    async fn test_lines_in_both_directions() {
        let (client, server) = tokio::io::duplex(4096);
        let recorder = Arc::new(Recorder::default());
        let handle = spawn(Box::new(client), 7, CancellationToken::new(), Arc::clone(&recorder));

        handle.send(r#"{"method":"login"}"#.to_string()).unwrap();

        let (server_read, mut server_write) = tokio::io::split(server);
        let mut lines = BufReader::new(server_read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"{"method":"login"}"#);

        server_write
            .write_all(b"{\"method\":\"job\"}\n\nnot json\n{\"method\":\"result\"}\n")
            .await
            .unwrap();
        drop(server_write);
        drop(lines);

        tokio::time::timeout(Duration::from_secs(2), handle.closed().cancelled())
            .await
            .unwrap();

        let messages = recorder.messages.lock().clone();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["method"], "job");
        assert_eq!(messages[1]["method"], "result");
        assert_eq!(*recorder.closed.lock(), vec![7]);
    }

    #[tokio::test]
    async fn test_shutdown_reports_close() {
        let (client, _server) = tokio::io::duplex(64);
        let recorder = Arc::new(Recorder::default());
        let shutdown = CancellationToken::new();
        let handle = spawn(Box::new(client), 1, shutdown.clone(), Arc::clone(&recorder));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle.closed().cancelled())
            .await
            .unwrap();
        assert_eq!(*recorder.closed.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let context = MiningContext::new(Endpoint::new("127.0.0.1", port, false), "key");
        assert!(matches!(open(&context).await, Err(Error::Io(_))));
    }
}
