//! Shared session state.
//!
//! One [`SessionState`] record sits behind one mutex. The reception context
//! (message handler) and the polling context (poll driver) each hold an
//! `Arc<Session>` and only ever touch the record through [`Session::lock`],
//! so every read-decide-write sequence is a single critical section.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::codec::{AckStatus, Crc16};
use crate::core::{ConfigError, Indicator, ProtocolConfig, Tick};

/// An acknowledgement decided by the handler and not yet sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingAck {
    /// Verdict.
    pub status: AckStatus,
    /// Sequence the verdict applies to.
    pub sequence: u16,
}

impl PendingAck {
    /// Positive acknowledgement for `sequence`.
    pub fn ok(sequence: u16) -> Self {
        Self {
            status: AckStatus::Ok,
            sequence,
        }
    }

    /// Negative acknowledgement for `sequence`.
    pub fn error(sequence: u16) -> Self {
        Self {
            status: AckStatus::Error,
            sequence,
        }
    }
}

/// Session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Records stored.
    pub accepted: u64,
    /// DATA frames re-acknowledged without storing.
    pub duplicates: u64,
    /// DATA frames ahead of the expected sequence.
    pub out_of_order: u64,
    /// Frames whose CRC did not match.
    pub crc_failures: u64,
    /// DATA frames with the wrong length.
    pub malformed: u64,
    /// Frames of a type the receiver does not act on.
    pub ignored: u64,
    /// Records the storage sink refused.
    pub storage_failures: u64,
    /// REQUEST frames sent.
    pub requests_sent: u64,
    /// ACK frames sent.
    pub acks_sent: u64,
    /// Transport sends that failed or timed out.
    pub send_failures: u64,
}

/// The authoritative record of where the exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    /// Next sequence accepted as new data.
    pub expected_sequence: u16,
    /// No requests or acknowledgements while set.
    pub idle: bool,
    /// Outstanding decision; latest wins.
    pub pending_ack: Option<PendingAck>,
    /// When the last REQUEST went out.
    pub last_request_at: Tick,
    /// Label byte of the last stored record.
    pub last_label: Option<u8>,
    /// Counters.
    pub stats: SessionStats,
}

impl SessionState {
    /// Fresh state at session start.
    pub fn new(now: Tick) -> Self {
        Self {
            expected_sequence: 0,
            idle: false,
            pending_ack: None,
            last_request_at: now,
            last_label: None,
            stats: SessionStats::default(),
        }
    }

    /// Whether a record at the expected sequence is stored but not yet acknowledged.
    pub fn awaiting_advance(&self) -> bool {
        self.pending_ack == Some(PendingAck::ok(self.expected_sequence))
    }

    /// Record a decision for the poll driver. The latest decision wins, except
    /// that the positive acknowledgement of a stored record is never displaced.
    pub fn decide(&mut self, ack: PendingAck) {
        if !self.awaiting_advance() {
            self.pending_ack = Some(ack);
        }
    }
}

/// Session shared between the reception and polling contexts.
pub struct Session {
    config: ProtocolConfig,
    crc: Crc16,
    state: Mutex<SessionState>,
    indicator: Box<dyn Indicator>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session, validating the configuration.
    pub fn new(
        config: ProtocolConfig,
        indicator: Box<dyn Indicator>,
        now: Tick,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            crc: Crc16::from(&config),
            config,
            state: Mutex::new(SessionState::new(now)),
            indicator,
        })
    }

    /// Protocol configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// CRC parameters.
    pub fn crc(&self) -> &Crc16 {
        &self.crc
    }

    /// Status indicator.
    pub fn indicator(&self) -> &dyn Indicator {
        self.indicator.as_ref()
    }

    /// Enter the critical section.
    ///
    /// Every writer leaves the record consistent before releasing the guard,
    /// so a poisoned lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of the whole record.
    pub fn snapshot(&self) -> SessionState {
        *self.lock()
    }

    /// Next sequence accepted as new data.
    pub fn expected_sequence(&self) -> u16 {
        self.lock().expected_sequence
    }

    /// Whether the session is idle.
    pub fn is_idle(&self) -> bool {
        self.lock().idle
    }

    /// Outstanding acknowledgement, if any.
    pub fn pending_ack(&self) -> Option<PendingAck> {
        self.lock().pending_ack
    }

    /// Counters.
    pub fn stats(&self) -> SessionStats {
        self.lock().stats
    }

    /// Enter or leave idle mode.
    ///
    /// Entering idle drops any undispatched acknowledgement. The indicator is
    /// driven inside the critical section, so it always shows the last flag
    /// written.
    pub fn set_idle(&self, idle: bool) {
        {
            let mut state = self.lock();
            state.idle = idle;
            if idle {
                state.pending_ack = None;
            }
            self.indicator.set(idle);
        }
        info!(idle, "session idle state changed");
    }

    /// Return to the initial state (sequence 0, active, nothing pending).
    pub fn reset(&self, now: Tick) {
        {
            let mut state = self.lock();
            *state = SessionState::new(now);
            self.indicator.set(false);
        }
        info!("session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn session() -> (Session, Arc<AtomicBool>) {
        let led = Arc::new(AtomicBool::new(false));
        let session =
            Session::new(ProtocolConfig::default(), Box::new(Arc::clone(&led)), 100).unwrap();
        (session, led)
    }

    #[test]
    fn test_initial_state() {
        let (session, led) = session();
        let state = session.snapshot();
        assert_eq!(state.expected_sequence, 0);
        assert!(!state.idle);
        assert_eq!(state.pending_ack, None);
        assert_eq!(state.last_request_at, 100);
        assert!(!led.load(Ordering::Acquire));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProtocolConfig::default().with_request_period(0);
        assert!(matches!(
            Session::new(config, Box::new(()), 0),
            Err(ConfigError::ZeroRequestPeriod)
        ));
    }

    #[test]
    fn test_idle_clears_pending_and_drives_indicator() {
        let (session, led) = session();
        session.lock().pending_ack = Some(PendingAck::ok(0));

        session.set_idle(true);
        assert!(session.is_idle());
        assert_eq!(session.pending_ack(), None);
        assert!(led.load(Ordering::Acquire));

        session.set_idle(false);
        assert!(!session.is_idle());
        assert!(!led.load(Ordering::Acquire));
    }

    #[test]
    fn test_leaving_idle_keeps_pending() {
        let (session, _led) = session();
        session.lock().pending_ack = Some(PendingAck::error(4));
        session.set_idle(false);
        assert_eq!(session.pending_ack(), Some(PendingAck::error(4)));
    }

    #[test]
    fn test_decide_latest_wins() {
        let mut state = SessionState::new(0);
        state.decide(PendingAck::error(3));
        state.decide(PendingAck::ok(0));
        assert!(state.awaiting_advance());

        // Stored-record acknowledgement survives later decisions.
        state.decide(PendingAck::error(7));
        assert_eq!(state.pending_ack, Some(PendingAck::ok(0)));

        state.expected_sequence = 1;
        state.decide(PendingAck::error(7));
        assert_eq!(state.pending_ack, Some(PendingAck::error(7)));
    }

    #[test]
    fn test_reset() {
        let (session, led) = session();
        {
            let mut state = session.lock();
            state.expected_sequence = 9;
            state.pending_ack = Some(PendingAck::ok(8));
            state.stats.accepted = 9;
        }
        session.set_idle(true);

        session.reset(500);
        assert_eq!(session.snapshot(), SessionState::new(500));
        assert!(!led.load(Ordering::Acquire));
    }

    #[test]
    fn test_indicator_matches_flag_under_contention() {
        let (session, led) = session();
        let session = Arc::new(session);

        let togglers: Vec<_> = [true, false]
            .into_iter()
            .map(|idle| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        session.set_idle(idle);
                    }
                })
            })
            .collect();
        for toggler in togglers {
            toggler.join().unwrap();
        }

        assert_eq!(led.load(Ordering::Acquire), session.is_idle());
    }

    #[test]
    fn test_session_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
    }
}
