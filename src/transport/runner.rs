//! Async session runner.
//!
//! Runs the two halves of a receiver on a tokio runtime: reception in its own
//! task fed by the byte pump, polling on an interval in the caller's task.
//! The run ends when the session goes idle (the remote finished, or the
//! application set idle), optionally saying END on the way out.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::constants::TICK_MILLIS;
use crate::core::{Clock, StorageSink, TransportError, TransportResult};
use crate::session::{Outbound, PollDriver, Reception, Session, SessionState};

use super::pump::{DEFAULT_CHANNEL_CAPACITY, spawn_byte_pump};
use super::writer::FrameWriter;

/// Outcome of a run.
///
/// The storage sink always comes back, including when the link failed part-way.
#[derive(Debug)]
pub struct RunSummary<S> {
    /// Session record at the end of the run.
    pub state: SessionState,
    /// Whether an END frame was delivered.
    pub end_sent: bool,
    /// Storage sink, handed back from the reception task.
    pub storage: S,
    /// Link failure that ended the run before the session went idle.
    pub error: Option<TransportError>,
}

impl<S> RunSummary<S> {
    /// Whether the run ended with the session idle rather than a link failure.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Why the poll loop stopped.
enum Stop<S> {
    /// Session went idle; the reception task is still running.
    Idle,
    /// Reader ended; the reception task returned.
    Drained(Reception<S>),
    /// A write failed and retrying cannot help; the reception task is still running.
    Failed(TransportError),
}

/// Drives a receiver over an async byte stream.
#[derive(Debug)]
pub struct SessionRunner<C> {
    poller: PollDriver<C>,
    poll_interval: Duration,
    end_on_finish: bool,
    channel_capacity: usize,
}

impl<C: Clock + Send + Sync> SessionRunner<C> {
    /// Create a runner around the polling half.
    pub fn new(poller: PollDriver<C>) -> Self {
        Self {
            poller,
            poll_interval: Duration::from_millis(TICK_MILLIS),
            end_on_finish: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set how often the poll driver runs.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set whether END is sent once the session goes idle.
    pub fn with_end_on_finish(mut self, send: bool) -> Self {
        self.end_on_finish = send;
        self
    }

    /// Set the depth of the received-chunk channel.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Shared session.
    pub fn session(&self) -> &Arc<Session> {
        self.poller.session()
    }

    /// Run until the session goes idle or the link fails.
    ///
    /// A link failure (reader closed before the session went idle, or a write
    /// error that retrying cannot fix) is reported in [`RunSummary::error`]
    /// alongside the records stored so far. Retryable send failures are
    /// counted and polling continues. `Err` means the reception task
    /// panicked and the sink is lost.
    pub async fn run<S, R, W>(
        self,
        reception: Reception<S>,
        reader: R,
        writer: W,
    ) -> TransportResult<RunSummary<S>>
    where
        S: StorageSink + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let session = Arc::clone(self.poller.session());
        let mut writer = FrameWriter::new(writer, session.config().send_timeout);

        let (mut chunks, pump) = spawn_byte_pump(reader, self.channel_capacity);
        let mut reception_task = tokio::spawn(async move {
            let mut reception = reception;
            while let Some(chunk) = chunks.recv().await {
                reception.push_bytes(&chunk);
            }
            reception
        });

        let stop = self.drive(&mut writer, &mut reception_task).await?;
        // Dropping the pump's sender lets the reception task drain what was
        // already read and return.
        pump.abort();

        let (reception, error) = match stop {
            Stop::Idle => (reception_task.await.map_err(join_error)?, None),
            Stop::Drained(reception) if session.is_idle() => (reception, None),
            Stop::Drained(reception) => {
                warn!("link closed before the remote finished");
                (reception, Some(TransportError::Closed))
            }
            Stop::Failed(e) => (reception_task.await.map_err(join_error)?, Some(e)),
        };

        let end_sent = error.is_none()
            && self.end_on_finish
            && self.deliver(&mut writer, self.poller.end()).await.is_ok();
        let state = session.snapshot();
        info!(
            expected_sequence = state.expected_sequence,
            accepted = state.stats.accepted,
            end_sent,
            failed = error.is_some(),
            "session run complete"
        );

        Ok(RunSummary {
            state,
            end_sent,
            storage: reception.into_storage(),
            error,
        })
    }

    async fn drive<S, W>(
        &self,
        writer: &mut FrameWriter<W>,
        reception: &mut JoinHandle<Reception<S>>,
    ) -> TransportResult<Stop<S>>
    where
        S: StorageSink + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let session = self.poller.session();
        if let Some(request) = self.poller.begin() {
            match self.deliver(writer, request).await {
                Err(e) if !e.is_retryable() => return Ok(Stop::Failed(e)),
                _ => {}
            }
        }

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if session.is_idle() {
                debug!("session idle, stopping poll loop");
                return Ok(Stop::Idle);
            }

            tokio::select! {
                _ = ticker.tick() => {
                    for outbound in self.poller.plan() {
                        match self.deliver(writer, outbound).await {
                            Err(e) if !e.is_retryable() => return Ok(Stop::Failed(e)),
                            _ => {}
                        }
                    }
                }
                joined = &mut *reception => {
                    return Ok(Stop::Drained(joined.map_err(join_error)?));
                }
            }
        }
    }

    /// Send one frame through the driver's idle gate and stats.
    async fn deliver<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut FrameWriter<W>,
        outbound: Outbound,
    ) -> TransportResult<()> {
        if !self.poller.admits(&outbound) {
            return Ok(());
        }
        let result = writer
            .write_frame(&outbound.encode(self.poller.encoder()))
            .await;
        self.poller.record(&outbound, &result);
        result
    }
}

fn join_error(e: JoinError) -> TransportError {
    TransportError::Io(io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AckStatus, Frame, FrameEncoder, FrameParser, FrameType};
    use crate::core::ProtocolConfig;
    use crate::session::Receiver;
    use crate::transport::TokioClock;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn data_frame(sequence: u16) -> Vec<u8> {
        let mut payload = vec![sequence as u8];
        payload.extend(std::iter::repeat_n(sequence as u8, 400));
        let encoder = FrameEncoder::default();
        let frame = encoder.seal(FrameType::Data, sequence, payload).unwrap();
        encoder.encode(&frame).to_bytes()
    }

    fn finish_frame() -> Vec<u8> {
        let encoder = FrameEncoder::default();
        let frame = encoder.seal(FrameType::Finish, 0, Vec::<u8>::new()).unwrap();
        encoder.encode(&frame).to_bytes()
    }

    fn runner() -> (
        SessionRunner<TokioClock>,
        Reception<Vec<Vec<u8>>>,
        ReadHalf<DuplexStream>,
        WriteHalf<DuplexStream>,
        DuplexStream,
    ) {
        let (local, remote) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let receiver =
            Receiver::new(ProtocolConfig::default(), Vec::new(), (), TokioClock::millis()).unwrap();
        let (reception, poller) = receiver.split();
        (SessionRunner::new(poller), reception, reader, writer, remote)
    }

    /// Remote sender holding `records` records: answers REQUEST(n) with DATA(n)
    /// and REQUEST(records) with FINISH. Returns every frame it received,
    /// stopping after END.
    async fn remote_sender(remote: DuplexStream, records: u16) -> Vec<Frame> {
        let (mut rx, mut tx) = tokio::io::split(remote);
        let mut parser = FrameParser::default();
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];

        loop {
            let n = rx.read(&mut buf).await.unwrap();
            if n == 0 {
                return seen;
            }
            for frame in parser.feed(&buf[..n]) {
                match frame.frame_type() {
                    Some(FrameType::RequestData) if frame.sequence < records => {
                        tx.write_all(&data_frame(frame.sequence)).await.unwrap();
                    }
                    Some(FrameType::RequestData) => {
                        tx.write_all(&finish_frame()).await.unwrap();
                    }
                    Some(FrameType::End) => {
                        seen.push(frame);
                        return seen;
                    }
                    _ => {}
                }
                seen.push(frame);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_transfer() {
        init_tracing();
        let (runner, reception, reader, writer, remote) = runner();
        let remote = tokio::spawn(remote_sender(remote, 3));

        let summary = runner.run(reception, reader, writer).await.unwrap();
        let seen = remote.await.unwrap();

        assert_eq!(summary.storage.len(), 3);
        for (sequence, record) in summary.storage.iter().enumerate() {
            assert_eq!(record, &vec![sequence as u8; 400]);
        }
        assert!(summary.state.idle);
        assert_eq!(summary.state.expected_sequence, 3);
        assert_eq!(summary.state.stats.accepted, 3);
        assert!(summary.end_sent);
        assert!(summary.is_complete());

        let acked: Vec<u16> = seen
            .iter()
            .filter(|f| f.ack_status() == Some(AckStatus::Ok))
            .map(|f| f.sequence)
            .collect();
        assert!(acked.starts_with(&[0]));
        assert!(acked.contains(&2));
        let last = seen.last().unwrap();
        assert_eq!(last.frame_type(), Some(FrameType::End));
        assert_eq!(last.sequence, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_requests_while_silent() {
        init_tracing();
        let (runner, reception, reader, writer, remote) = runner();
        let session = Arc::clone(runner.session());
        let run = tokio::spawn(runner.run(reception, reader, writer));

        time::sleep(Duration::from_millis(105)).await;
        session.set_idle(true);
        let summary = run.await.unwrap().unwrap();

        // Opening request plus one per 20 ms period.
        assert!(summary.state.stats.requests_sent >= 5);
        assert!(summary.storage.is_empty());
        assert!(summary.end_sent);
        drop(remote);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_link_reported_in_summary() {
        init_tracing();
        let (runner, reception, reader, writer, remote) = runner();
        drop(remote);

        let summary = runner.run(reception, reader, writer).await.unwrap();
        assert!(matches!(summary.error, Some(TransportError::Closed)));
        assert!(!summary.is_complete());
        assert!(!summary.end_sent);
        assert!(summary.storage.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_survive_link_loss() {
        init_tracing();
        let (runner, reception, reader, writer, remote) = runner();

        // Remote serves DATA(0) and DATA(1), then hangs up once record 1 is
        // acknowledged, without sending FINISH.
        let remote = tokio::spawn(async move {
            let (mut rx, mut tx) = tokio::io::split(remote);
            let mut parser = FrameParser::default();
            let mut buf = [0u8; 256];
            loop {
                let n = rx.read(&mut buf).await.unwrap();
                assert_ne!(n, 0);
                for frame in parser.feed(&buf[..n]) {
                    match frame.frame_type() {
                        Some(FrameType::RequestData) if frame.sequence < 2 => {
                            tx.write_all(&data_frame(frame.sequence)).await.unwrap();
                        }
                        Some(FrameType::Acknowledgement)
                            if frame.ack_status() == Some(AckStatus::Ok) && frame.sequence == 1 =>
                        {
                            return;
                        }
                        _ => {}
                    }
                }
            }
        });

        let summary = runner.run(reception, reader, writer).await.unwrap();
        remote.await.unwrap();

        // Reader EOF and a write to the dropped peer both surface as Closed.
        assert!(matches!(summary.error, Some(TransportError::Closed)));
        assert!(!summary.end_sent);
        assert_eq!(summary.storage.len(), 2);
        assert_eq!(summary.storage[0], vec![0u8; 400]);
        assert_eq!(summary.storage[1], vec![1u8; 400]);
        assert_eq!(summary.state.stats.accepted, 2);
        assert!(!summary.state.idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_end_when_disabled() {
        init_tracing();
        let (runner, reception, reader, writer, remote) = runner();
        let runner = runner.with_end_on_finish(false);
        let remote = tokio::spawn(async move {
            let (_rx, mut tx) = tokio::io::split(remote);
            tx.write_all(&finish_frame()).await.unwrap();
            tx
        });

        let summary = runner.run(reception, reader, writer).await.unwrap();
        assert!(!summary.end_sent);
        assert!(summary.state.idle);
        drop(remote.await.unwrap());
    }
}
