use std::net::SocketAddr;
use tilemud_session::Transport;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Identifies one accepted TCP connection.
pub type ConnId = u64;

/// Longest accepted input line, terminator excluded.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Writes queued for one socket before it counts as stalled.
pub const OUTPUT_QUEUE: usize = 1024;

/// Connection activity funnelled into the engine loop.
#[derive(Debug)]
pub enum Event {
    Connected { conn: ConnId, transport: ChannelTransport },
    Line { conn: ConnId, line: String },
    Closed { conn: ConnId },
}

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Engine-side handle for a socket: output is queued to the connection
/// task, which owns the write half.
///
/// A peer that stops reading until the queue fills is dropped; the engine
/// never waits on a socket.
#[derive(Debug)]
pub struct ChannelTransport {
    peer: SocketAddr,
    tx: Option<mpsc::Sender<Outgoing>>,
}

impl Transport for ChannelTransport {
    fn send(&mut self, text: &str) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(Outgoing::Text(text.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(peer = %self.peer, "output queue full, dropping connection");
                self.tx = None;
            }
            Err(TrySendError::Closed(_)) => {
                debug!(peer = %self.peer, "dropping output for a closed socket");
                self.tx = None;
            }
        }
    }

    fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Dropping the sender closes the socket even if the queue is full.
            let _ = tx.try_send(Outgoing::Close);
        }
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

/// Splits a byte stream into lines, refusing lines longer than a cap.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_line_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_line_len: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(1024),
            max_line_len: max_line_len.max(1),
        }
    }

    /// Next line with its terminator stripped, `None` at end of stream.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    /// Unterminated bytes at end of stream are discarded.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(i) = self.buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buf.drain(..=i).collect();
                if strip_terminator(&raw).len() > self.max_line_len {
                    return Err(too_long());
                }
                return Ok(Some(decode_line(&raw)));
            }
            // One extra byte for a pending '\r'.
            if self.buf.len() > self.max_line_len + 1 {
                return Err(too_long());
            }
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }
}

fn too_long() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "line too long")
}

/// Strip the line terminator. CRLF is the protocol; a bare LF is tolerated.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(strip_terminator(raw)).into_owned()
}

fn strip_terminator(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Drive one socket until either side closes it.
pub async fn handle_conn(
    stream: TcpStream,
    peer: SocketAddr,
    conn: ConnId,
    events: mpsc::Sender<Event>,
) -> anyhow::Result<()> {
    let (rd, mut wr) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outgoing>(OUTPUT_QUEUE);
    let transport = ChannelTransport {
        peer,
        tx: Some(out_tx),
    };
    events.send(Event::Connected { conn, transport }).await?;

    let mut lines = LineReader::new(rd, MAX_LINE_LEN);
    let result = loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = wr.write_all(text.as_bytes()).await {
                        break Err(e.into());
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = wr.shutdown().await;
                    break Ok(());
                }
            },
            read = lines.read_line() => match read {
                Ok(Some(line)) => {
                    if events.send(Event::Line { conn, line }).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
        }
    };

    if events.send(Event::Closed { conn }).await.is_err() {
        warn!(conn, "engine loop gone before close was delivered");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(capacity: usize) -> (ChannelTransport, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(capacity);
        let transport = ChannelTransport {
            peer: "127.0.0.1:4000".parse().unwrap(),
            tx: Some(tx),
        };
        (transport, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Outgoing>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(out) = rx.try_recv() {
            seen.push(match out {
                Outgoing::Text(t) => t,
                Outgoing::Close => "<close>".to_string(),
            });
        }
        seen
    }

    #[test]
    fn lines_lose_their_terminator() {
        assert_eq!(decode_line(b"look\r\n"), "look");
        assert_eq!(decode_line(b"look\n"), "look");
        assert_eq!(decode_line(b"\r\n"), "");
        assert_eq!(decode_line(b"say a\rb\r\n"), "say a\rb");
    }

    #[tokio::test]
    async fn reads_crlf_and_lf_lines() {
        let (client, server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut client = client;
            client.write_all(b"look\r\nnorth\n\r\npartial").await.unwrap();
        });

        let mut lines = LineReader::new(server, MAX_LINE_LEN);
        assert_eq!(lines.read_line().await.unwrap().as_deref(), Some("look"));
        assert_eq!(lines.read_line().await.unwrap().as_deref(), Some("north"));
        assert_eq!(lines.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn over_long_lines_are_refused() {
        let (client, server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut client = client;
            let _ = client.write_all(&[b'a'; 64]).await;
            let _ = client.write_all(b"\r\n").await;
        });

        let mut lines = LineReader::new(server, 16);
        let err = lines.read_line().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn endless_input_without_a_newline_is_refused() {
        let (client, server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut client = client;
            // Stops once the reader gives up and drops its end.
            while client.write_all(&[b'a'; 32]).await.is_ok() {}
        });

        let mut lines = LineReader::new(server, MAX_LINE_LEN);
        let err = lines.read_line().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(lines.buf.len() <= MAX_LINE_LEN + 1 + 64);
    }

    #[tokio::test]
    async fn a_line_at_the_cap_is_accepted() {
        let (client, server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut client = client;
            client.write_all(&[b'a'; 16]).await.unwrap();
            client.write_all(b"\r\n").await.unwrap();
        });

        let mut lines = LineReader::new(server, 16);
        assert_eq!(lines.read_line().await.unwrap().map(|l| l.len()), Some(16));
    }

    #[test]
    fn transport_queues_until_closed() {
        let (mut transport, mut rx) = transport(8);
        transport.send_line("hello");
        transport.close();
        transport.send("dropped");

        assert_eq!(drain(&mut rx), ["hello", "\r\n", "<close>"]);
        assert_eq!(transport.peer(), "127.0.0.1:4000");
    }

    #[test]
    fn stalled_reader_is_dropped_once_the_queue_fills() {
        let (mut transport, mut rx) = transport(2);
        transport.send("one");
        transport.send("two");
        transport.send("three");
        transport.send("four");

        assert_eq!(drain(&mut rx), ["one", "two"]);
        // The sender is gone, so the connection task sees the queue close.
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }
}
