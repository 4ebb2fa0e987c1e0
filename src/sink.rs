//! Outbound byte sink.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

/// Destination for encoded frames. Writes must not block; the transport is
/// expected to buffer.
pub trait ByteSink: Send + Sync + 'static {
    fn write(&self, frame: Bytes);
}

/// Sink that queues frames on an unbounded channel for a writer task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ByteSink for ChannelSink {
    fn write(&self, frame: Bytes) {
        if self.tx.send(frame).is_err() {
            debug!("Output channel closed, dropping frame");
        }
    }
}
