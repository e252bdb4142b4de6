use std::sync::{Arc, Mutex};

/// Outgoing half of a connection.
///
/// Writes never fail from the caller's point of view; a transport that has
/// lost its peer drops output and reports the failure through its own
/// close path.
pub trait Transport: Send {
    /// Write `text` verbatim, with no terminator.
    fn send(&mut self, text: &str);

    /// Close the connection. Further sends are dropped.
    fn close(&mut self);

    /// Human-readable peer address for logs.
    fn peer(&self) -> String;

    fn send_line(&mut self, text: &str) {
        self.send(text);
        self.send("\r\n");
    }
}

#[derive(Debug, Default)]
struct Buffer {
    output: String,
    closed: bool,
}

/// In-memory transport for headless sessions and tests.
///
/// Clones share one buffer: hand one clone to the engine and keep the other
/// to read the transcript.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Buffer>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        self.inner
            .lock()
            .map(|b| b.output.clone())
            .unwrap_or_default()
    }

    /// Drain and return everything written so far.
    pub fn take_output(&self) -> String {
        self.inner
            .lock()
            .map(|mut b| std::mem::take(&mut b.output))
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|b| b.closed).unwrap_or(true)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, text: &str) {
        if let Ok(mut buffer) = self.inner.lock() {
            if !buffer.closed {
                buffer.output.push_str(text);
            }
        }
    }

    fn close(&mut self) {
        if let Ok(mut buffer) = self.inner.lock() {
            buffer.closed = true;
        }
    }

    fn peer(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_output() {
        let reader = MemoryTransport::new();
        let mut writer = reader.clone();
        writer.send("> ");
        writer.send_line("hello");
        assert_eq!(reader.output(), "> hello\r\n");
        assert_eq!(reader.take_output(), "> hello\r\n");
        assert_eq!(reader.output(), "");
    }

    #[test]
    fn closed_transport_drops_output() {
        let reader = MemoryTransport::new();
        let mut writer = reader.clone();
        writer.close();
        writer.send("lost");
        assert!(reader.is_closed());
        assert_eq!(reader.output(), "");
    }
}
