//! Collaborator traits for the pullframe receiver.
//!
//! The protocol core never touches hardware directly. Storage, the status
//! indicator, time, and the outbound byte link are reached through these
//! traits so the same core runs on a UART, over TCP, or in a test.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use super::error::{StorageError, TransportError, TransportResult};

/// Monotonic tick count. Wraps; compare with `wrapping_sub`.
pub type Tick = u32;

/// Persistent sink for accepted records.
///
/// Called exactly once per accepted DATA frame with the payload minus its
/// leading label byte.
pub trait StorageSink {
    /// Persist one record.
    ///
    /// A failure leaves the session's expected sequence where it was and
    /// answers the remote with a negative acknowledgement, so the record is
    /// delivered again.
    fn store(&mut self, record: &[u8]) -> Result<(), StorageError>;
}

impl StorageSink for Vec<Vec<u8>> {
    fn store(&mut self, record: &[u8]) -> Result<(), StorageError> {
        self.push(record.to_vec());
        Ok(())
    }
}

/// Sink appending raw records to a byte writer (a file, a flash region).
///
/// Records are fixed-size, so the output is a plain concatenation. With a
/// limit set, records beyond it are refused with [`StorageError::Full`].
#[derive(Debug)]
pub struct RecordWriter<W> {
    inner: W,
    written: usize,
    limit: Option<usize>,
}

impl<W: Write> RecordWriter<W> {
    /// Append to `inner` without a record limit.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            limit: None,
        }
    }

    /// Refuse records once `limit` have been written.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Consume the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> StorageSink for RecordWriter<W> {
    fn store(&mut self, record: &[u8]) -> Result<(), StorageError> {
        if self.limit.is_some_and(|limit| self.written >= limit) {
            return Err(StorageError::Full);
        }
        self.inner.write_all(record)?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }
}

impl<S: StorageSink + ?Sized> StorageSink for Box<S> {
    fn store(&mut self, record: &[u8]) -> Result<(), StorageError> {
        (**self).store(record)
    }
}

/// Status indicator (an LED on the reference board).
///
/// Shared between the reception and polling contexts, hence `&self`.
pub trait Indicator: Send + Sync {
    /// Engage or release the "done" indication. Called on idle transitions.
    fn set(&self, active: bool);

    /// Signal activity. Called once per accepted record.
    fn pulse(&self) {}
}

/// No indicator attached.
impl Indicator for () {
    fn set(&self, _active: bool) {}
}

impl Indicator for AtomicBool {
    fn set(&self, active: bool) {
        self.store(active, Ordering::Release);
    }
}

impl<I: Indicator + ?Sized> Indicator for Arc<I> {
    fn set(&self, active: bool) {
        (**self).set(active)
    }

    fn pulse(&self) {
        (**self).pulse()
    }
}

/// Monotonic time source.
pub trait Clock {
    /// Current tick count.
    fn now(&self) -> Tick;
}

/// Clock derived from [`Instant`], counting ticks of a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    tick: Duration,
}

impl MonotonicClock {
    /// Create a clock whose tick is `tick` long, starting at zero now.
    pub fn new(tick: Duration) -> Self {
        Self {
            origin: Instant::now(),
            tick: tick.max(Duration::from_nanos(1)),
        }
    }

    /// Create a millisecond clock.
    pub fn millis() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::millis()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        // Truncation is the wrap.
        (self.origin.elapsed().as_nanos() / self.tick.as_nanos()) as Tick
    }
}

/// Manually advanced clock.
///
/// Clones share the same counter, so a test can keep one handle while the
/// receiver owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `ticks`, wrapping.
    pub fn advance(&self, ticks: Tick) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Jump to an absolute tick.
    pub fn set(&self, tick: Tick) {
        self.ticks.store(tick, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }
}

/// Outbound byte link.
///
/// Bytes handed over in successive calls must reach the peer in order and
/// without loss; the framing only tolerates loss between frames.
pub trait Transport {
    /// Write all of `bytes`, giving up after `timeout`.
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> TransportResult<()>;
}

/// In-memory transport: appends to the buffer.
impl Transport for Vec<u8> {
    fn send(&mut self, bytes: &[u8], _timeout: Duration) -> TransportResult<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// TCP transport, for serial-over-TCP bridges.
impl Transport for TcpStream {
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> TransportResult<()> {
        self.set_write_timeout(Some(timeout))?;
        self.write_all(bytes)
            .map_err(|e| TransportError::from_write(e, timeout))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> TransportResult<()> {
        (**self).send(bytes, timeout)
    }
}
