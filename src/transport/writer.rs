//! Async frame writer.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::codec::EncodedFrame;
use crate::core::{TransportError, TransportResult};

/// Writes encoded frames to an async byte sink.
///
/// Header, payload, and CRC go out as separate ordered writes, each bounded by
/// the send timeout.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    timeout: Duration,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a sink with a per-write timeout.
    pub fn new(inner: W, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Write one frame and flush.
    pub async fn write_frame(&mut self, frame: &EncodedFrame) -> TransportResult<()> {
        for segment in frame.segments() {
            self.bounded(|inner| inner.write_all(segment)).await?;
        }
        self.bounded(|inner| inner.flush()).await
    }

    async fn bounded<'a, F, Fut>(&'a mut self, op: F) -> TransportResult<()>
    where
        F: FnOnce(&'a mut W) -> Fut,
        Fut: Future<Output = std::io::Result<()>>,
    {
        let timeout = self.timeout;
        match time::timeout(timeout, op(&mut self.inner)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::from_write(e, timeout)),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}
