//! Inbound frame handling.
//!
//! The handler turns each assembled frame into a decision. It runs in the
//! reception context, so it never sends anything itself: positive and
//! negative acknowledgements are left in the session's pending slot for the
//! poll driver.
//!
//! Order of checks:
//! 1. CRC mismatch → NACK at the frame's own sequence.
//! 2. FINISH → session goes idle, no acknowledgement.
//! 3. Any other non-DATA type → ignored.
//! 4. DATA with the wrong length → NACK.
//! 5. DATA by sequence: expected → store and ACK; behind → ACK again without
//!    storing; ahead → NACK.
//!
//! A later decision replaces an undispatched one, except the ACK of a record
//! that was just stored: dropping it would leave the record stored without
//! the sequence ever advancing.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Frame, FrameType};
use crate::core::StorageSink;

use super::state::{PendingAck, Session};

/// What the handler made of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// New in-order record stored.
    Accepted {
        /// Sequence of the stored record.
        sequence: u16,
        /// Leading label byte.
        label: u8,
    },
    /// Record already held; re-acknowledged.
    Duplicate {
        /// Sequence that was repeated.
        sequence: u16,
    },
    /// Record ahead of the expected sequence.
    OutOfOrder {
        /// Sequence received.
        sequence: u16,
        /// Sequence the session wanted.
        expected: u16,
    },
    /// CRC mismatch.
    Corrupt {
        /// Sequence as carried (not trusted).
        sequence: u16,
    },
    /// DATA frame of the wrong length.
    Malformed {
        /// Sequence as carried.
        sequence: u16,
        /// Declared length.
        length: u16,
    },
    /// Storage sink refused the record.
    StorageFailed {
        /// Sequence of the refused record.
        sequence: u16,
    },
    /// Remote finished; session is now idle.
    Finished,
    /// Frame type the receiver does not act on.
    Ignored {
        /// Raw type byte.
        type_code: u8,
    },
}

impl Disposition {
    /// Whether a record was stored.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Disposition::Accepted { .. })
    }
}

/// Applies inbound frames to the session.
#[derive(Debug)]
pub struct MessageHandler<S> {
    session: Arc<Session>,
    storage: S,
}

impl<S: StorageSink> MessageHandler<S> {
    /// Create a handler writing accepted records to `storage`.
    pub fn new(session: Arc<Session>, storage: S) -> Self {
        Self { session, storage }
    }

    /// Shared session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Storage sink.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable storage sink.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Consume the handler, returning the storage sink.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Decide what a fully assembled frame means and record the decision.
    pub fn handle(&mut self, frame: &Frame) -> Disposition {
        let sequence = frame.sequence;

        if !frame.is_intact(self.session.crc()) {
            warn!(
                sequence,
                carried = frame.crc,
                computed = frame.compute_crc(self.session.crc()),
                "crc mismatch"
            );
            let mut state = self.session.lock();
            state.stats.crc_failures += 1;
            state.decide(PendingAck::error(sequence));
            return Disposition::Corrupt { sequence };
        }

        match frame.frame_type() {
            Some(FrameType::Finish) => {
                debug!(sequence, "remote finished");
                self.session.set_idle(true);
                return Disposition::Finished;
            }
            Some(FrameType::Data) => {}
            _ => {
                debug!(type_code = frame.type_code, sequence, "ignoring frame");
                self.session.lock().stats.ignored += 1;
                return Disposition::Ignored {
                    type_code: frame.type_code,
                };
            }
        }

        let length = frame.length();
        let (label, record) = match frame.payload.split_first() {
            Some((&label, record)) if length == self.session.config().data_length => {
                (label, record)
            }
            _ => {
                warn!(
                    sequence,
                    length,
                    expected = self.session.config().data_length,
                    "data frame has wrong length"
                );
                let mut state = self.session.lock();
                state.stats.malformed += 1;
                state.decide(PendingAck::error(sequence));
                return Disposition::Malformed { sequence, length };
            }
        };

        let mut state = self.session.lock();
        let expected = state.expected_sequence;

        let disposition = match sequence.cmp(&expected) {
            // The ACK for this record has not gone out yet: the remote
            // resent before hearing from us. Already stored.
            Ordering::Equal if state.awaiting_advance() => {
                state.stats.duplicates += 1;
                Disposition::Duplicate { sequence }
            }
            Ordering::Equal => match self.storage.store(record) {
                Ok(()) => {
                    state.stats.accepted += 1;
                    state.last_label = Some(label);
                    state.decide(PendingAck::ok(expected));
                    Disposition::Accepted { sequence, label }
                }
                Err(e) => {
                    warn!(sequence, error = %e, "storage rejected record");
                    state.stats.storage_failures += 1;
                    state.decide(PendingAck::error(expected));
                    Disposition::StorageFailed { sequence }
                }
            },
            Ordering::Less => {
                state.stats.duplicates += 1;
                state.decide(PendingAck::ok(sequence));
                Disposition::Duplicate { sequence }
            }
            Ordering::Greater => {
                state.stats.out_of_order += 1;
                state.decide(PendingAck::error(sequence));
                Disposition::OutOfOrder { sequence, expected }
            }
        };
        drop(state);

        if disposition.is_accepted() {
            self.session.indicator().pulse();
        }
        debug!(?disposition, "data frame handled");
        disposition
    }
}
