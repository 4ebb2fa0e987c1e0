//! Driver spawns and manages transport tasks
//!
//! The manager itself never touches I/O. The driver connects it to any
//! `AsyncRead`/`AsyncWrite` pair (a serial port, a TCP stream, a pipe): one
//! task feeds received bytes to [`ObjectManager::feed`], another drains the
//! outbound frame channel into the writer.

use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ManagerConfig;
use crate::manager::ObjectManager;
use crate::protocol::MAX_FRAME_LENGTH;
use crate::scheduler::TokioScheduler;
use crate::sink::ChannelSink;
use crate::{Result, UavTalkError};

/// Handle to the spawned transport tasks
#[derive(Debug)]
pub struct DriverHandle {
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl DriverHandle {
    /// Ask both tasks to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) {
        if let Err(e) = self.reader.await {
            warn!("Reader task ended abnormally: {}", e);
        }
        if let Err(e) = self.writer.await {
            warn!("Writer task ended abnormally: {}", e);
        }
    }
}

/// Driver spawns and manages transport tasks
pub struct Driver;

impl Driver {
    /// Build a manager wired to `reader`/`writer` on the current runtime.
    ///
    /// Fails with [`UavTalkError::NoRuntime`] outside a tokio runtime.
    pub fn connect<R, W>(config: ManagerConfig, reader: R, writer: W) -> Result<(ObjectManager, DriverHandle)>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let scheduler = TokioScheduler::try_current().ok_or(UavTalkError::NoRuntime)?;
        let (sink, outbound) = ChannelSink::new();
        let manager = ObjectManager::new(config, Arc::new(sink), Arc::new(scheduler));
        let handle = Self::spawn(manager.clone(), reader, writer, outbound);
        Ok((manager, handle))
    }

    /// Spawn the reader and writer tasks for an existing manager.
    ///
    /// `outbound` is the receiving end of the [`ChannelSink`] the manager
    /// writes to. Either task ending (EOF, I/O error) stops the other.
    pub fn spawn<R, W>(
        manager: ObjectManager,
        reader: R,
        writer: W,
        outbound: mpsc::UnboundedReceiver<Bytes>,
    ) -> DriverHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(Self::reader_task(manager, reader, cancel.clone()));
        let writer = tokio::spawn(Self::writer_task(writer, outbound, cancel.clone()));
        DriverHandle { cancel, reader, writer }
    }

    async fn reader_task<R>(manager: ObjectManager, mut reader: R, cancel: CancellationToken)
    where
        R: AsyncRead + Unpin,
    {
        info!("Reader task started");
        let mut buf = vec![0u8; MAX_FRAME_LENGTH * 4];
        let mut total = 0u64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Reader cancelled");
                    break;
                }
                result = reader.read(&mut buf) => result,
            };

            match result {
                Ok(0) => {
                    info!("Transport closed after {} bytes", total);
                    break;
                }
                Ok(n) => {
                    total += n as u64;
                    trace!("Read {} bytes", n);
                    manager.feed(&buf[..n]);
                }
                Err(e) => {
                    warn!("Transport read failed: {}", e);
                    break;
                }
            }
        }

        cancel.cancel();
        debug!("Reader task stopped");
    }

    async fn writer_task<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Bytes>, cancel: CancellationToken)
    where
        W: AsyncWrite + Unpin,
    {
        info!("Writer task started");

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Writer cancelled");
                    break;
                }
                frame = outbound.recv() => frame,
            };

            let Some(frame) = frame else {
                debug!("Outbound channel closed, shutting down");
                break;
            };

            if let Err(e) = writer.write_all(&frame).await {
                warn!("Transport write failed: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!("Transport flush failed: {}", e);
                break;
            }
            trace!("Wrote {} bytes", frame.len());
        }

        cancel.cancel();
        debug!("Writer task stopped");
    }
}
