//! Byte pump: moves received bytes from a reader task into a channel.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Read buffer size for the pump task.
pub const READ_CHUNK_SIZE: usize = 512;

/// Default depth of the chunk channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Spawn a task that reads `reader` until end of stream, forwarding each
/// chunk in arrival order.
///
/// The task ends at end of stream, on a read error, or once the receiving
/// side is dropped. It resolves to the number of bytes forwarded.
pub fn spawn_byte_pump<R>(
    mut reader: R,
    capacity: usize,
) -> (mpsc::Receiver<Vec<u8>>, JoinHandle<io::Result<u64>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut forwarded = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                trace!(forwarded, "reader reached end of stream");
                return Ok(forwarded);
            }
            if tx.send(buf[..n].to_vec()).await.is_err() {
                trace!(forwarded, "chunk receiver dropped");
                return Ok(forwarded);
            }
            forwarded += n as u64;
        }
    });

    (rx, handle)
}
