//! Poll driver: the only place outbound REQUEST and ACK frames come from.
//!
//! Called repeatedly from one loop. Each call first decides, under the
//! session lock, which frames to send ([`PollDriver::plan`]), then sends them
//! with the lock released. Taking the pending acknowledgement with
//! `Option::take` inside the critical section means a decision written by the
//! handler while frames are on the wire stays in the slot for the next call.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{EncodedFrame, FrameEncoder};
use crate::core::{Clock, Tick, Transport, TransportResult};

use super::state::{PendingAck, Session};

/// A frame the receiver sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outbound {
    /// REQUEST_DATA for a sequence.
    Request {
        /// Requested sequence.
        sequence: u16,
    },
    /// ACKNOWLEDGEMENT.
    Ack(PendingAck),
    /// END, telling the remote to stop.
    End {
        /// Expected sequence at the time of sending.
        sequence: u16,
    },
}

impl Outbound {
    /// Serialize with the given encoder.
    pub fn encode(&self, encoder: &FrameEncoder) -> EncodedFrame {
        match *self {
            Outbound::Request { sequence } => encoder.request(sequence),
            Outbound::Ack(ack) => encoder.ack(ack.status, ack.sequence),
            Outbound::End { sequence } => encoder.end(sequence),
        }
    }

    /// Whether the frame is suppressed while the session is idle.
    pub fn is_gated_by_idle(&self) -> bool {
        !matches!(self, Outbound::End { .. })
    }
}

/// Drives retransmission timing and acknowledgement dispatch.
#[derive(Debug)]
pub struct PollDriver<C> {
    session: Arc<Session>,
    clock: C,
    encoder: FrameEncoder,
}

impl<C: Clock> PollDriver<C> {
    /// Create a poll driver for a session.
    pub fn new(session: Arc<Session>, clock: C) -> Self {
        let encoder = FrameEncoder::from_config(session.config());
        Self {
            session,
            clock,
            encoder,
        }
    }

    /// Shared session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Frame encoder.
    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// Current tick.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Decide what to send this cycle and apply its effect on the session.
    ///
    /// 1. Idle: drop any pending acknowledgement, send nothing.
    /// 2. Request period elapsed: REQUEST(expected).
    /// 3. Pending acknowledgement: ACK it; a positive ACK of the expected
    ///    sequence advances it and is followed at once by REQUEST(next).
    pub fn plan(&self) -> Vec<Outbound> {
        let now = self.clock.now();
        let period = self.session.config().request_period;
        let mut state = self.session.lock();

        if state.idle {
            state.pending_ack = None;
            return Vec::new();
        }

        let mut plan = Vec::with_capacity(3);

        if now.wrapping_sub(state.last_request_at) >= period {
            plan.push(Outbound::Request {
                sequence: state.expected_sequence,
            });
            state.last_request_at = now;
        }

        if let Some(ack) = state.pending_ack.take() {
            plan.push(Outbound::Ack(ack));

            if ack.status.is_ok() && ack.sequence == state.expected_sequence {
                state.expected_sequence = state.expected_sequence.wrapping_add(1);
                // Idle cannot change while the lock is held.
                plan.push(Outbound::Request {
                    sequence: state.expected_sequence,
                });
                state.last_request_at = now;
            }
        }

        plan
    }

    /// One poll cycle: plan, then send. Returns the frames actually sent.
    pub fn poll<T: Transport>(&mut self, transport: &mut T) -> Vec<Outbound> {
        let plan = self.plan();
        self.dispatch(&plan, transport)
    }

    /// Send planned frames in order.
    ///
    /// Frames are fire-and-forget: a failed send is logged and counted, never
    /// retried. If the session goes idle part-way, the remaining REQUEST and
    /// ACK frames are dropped. A fatal link error drops the rest of the plan.
    pub fn dispatch<T: Transport>(
        &self,
        plan: &[Outbound],
        transport: &mut T,
    ) -> Vec<Outbound> {
        let mut sent = Vec::with_capacity(plan.len());
        for outbound in plan {
            if !self.admits(outbound) {
                continue;
            }
            match self.send(outbound, transport) {
                Ok(()) => sent.push(*outbound),
                Err(e) if e.is_fatal() => break,
                Err(_) => {}
            }
        }
        sent
    }

    /// Whether `outbound` may go out now. REQUEST and ACK are dropped while idle.
    pub fn admits(&self, outbound: &Outbound) -> bool {
        if outbound.is_gated_by_idle() && self.session.is_idle() {
            debug!(?outbound, "session idle, dropping outbound frame");
            return false;
        }
        true
    }

    /// Opening REQUEST(expected), restarting the request period.
    ///
    /// `None` while idle. The caller sends the frame.
    pub fn begin(&self) -> Option<Outbound> {
        let now = self.clock.now();
        let mut state = self.session.lock();
        if state.idle {
            debug!("session idle, not starting");
            return None;
        }
        state.last_request_at = now;
        Some(Outbound::Request {
            sequence: state.expected_sequence,
        })
    }

    /// END frame carrying the expected sequence.
    pub fn end(&self) -> Outbound {
        Outbound::End {
            sequence: self.session.expected_sequence(),
        }
    }

    /// Send the opening REQUEST. Does nothing while idle.
    pub fn start<T: Transport>(&mut self, transport: &mut T) -> TransportResult<()> {
        match self.begin() {
            Some(request) => self.send(&request, transport),
            None => Ok(()),
        }
    }

    /// Send a single END frame. Never retried.
    pub fn send_end<T: Transport>(&mut self, transport: &mut T) -> TransportResult<()> {
        let end = self.end();
        self.send(&end, transport)
    }

    fn send<T: Transport>(&self, outbound: &Outbound, transport: &mut T) -> TransportResult<()> {
        let frame = outbound.encode(&self.encoder);
        let timeout = self.session.config().send_timeout;

        let result = frame
            .segments()
            .try_for_each(|segment| transport.send(segment, timeout));
        self.record(outbound, &result);
        result
    }

    /// Count and log the outcome of a send attempt.
    pub fn record(&self, outbound: &Outbound, result: &TransportResult<()>) {
        {
            let mut state = self.session.lock();
            match (outbound, result) {
                (_, Err(_)) => state.stats.send_failures += 1,
                (Outbound::Request { .. }, Ok(())) => state.stats.requests_sent += 1,
                (Outbound::Ack(_), Ok(())) => state.stats.acks_sent += 1,
                (Outbound::End { .. }, Ok(())) => {}
            }
        }
        match result {
            Ok(()) => debug!(?outbound, "frame sent"),
            Err(e) => warn!(?outbound, error = %e, "send failed"),
        }
    }
}
