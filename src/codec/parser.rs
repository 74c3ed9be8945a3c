//! Byte-at-a-time frame parser.
//!
//! The parser is a finite-state machine fed one byte per call. It never
//! blocks and never waits for more than the declared length, so any input
//! stream, however corrupted, brings it back to marker search.
//!
//! ```text
//! SeekSof0 → SeekSof1 → Type → Seq0 → Seq1 → Len0 → Len1 ─┬→ Data* → Crc0 → Crc1 → (frame) → SeekSof0
//!                                                         ├→ Crc0            (length == 0)
//!                                                         └→ SeekSof0        (length > capacity)
//! ```
//!
//! CRC validation is not done here: a frame with a bad CRC is still
//! dispatched so the session can answer it with a negative acknowledgement.

use tracing::trace;

use crate::core::ProtocolConfig;
use crate::core::constants::MARKER_SIZE;

use super::frame::Frame;

/// Parser states, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParserState {
    /// Waiting for the first start marker.
    #[default]
    SeekSof0,
    /// First marker seen; waiting for the second.
    SeekSof1,
    /// Expecting the type byte.
    Type,
    /// Expecting the low sequence byte.
    Seq0,
    /// Expecting the high sequence byte.
    Seq1,
    /// Expecting the low length byte.
    Len0,
    /// Expecting the high length byte.
    Len1,
    /// Accumulating payload.
    Data,
    /// Expecting the low CRC byte.
    Crc0,
    /// Expecting the high CRC byte.
    Crc1,
}

/// Parser counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserStats {
    /// Frames dispatched (CRC not checked).
    pub frames: u64,
    /// Frames dropped because the declared length exceeded the buffer.
    pub oversize_drops: u64,
    /// Bytes after a first marker that were not the second marker.
    pub marker_misses: u64,
}

/// Incremental frame parser with a fixed-capacity payload buffer.
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParserState,
    markers: [u8; MARKER_SIZE],
    type_code: u8,
    sequence: u16,
    length: u16,
    crc: u16,
    buffer: Box<[u8]>,
    filled: usize,
    stats: ParserStats,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(&ProtocolConfig::default())
    }
}

impl FrameParser {
    /// Create a parser with the configuration's markers and buffer capacity.
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            state: ParserState::SeekSof0,
            markers: config.start_markers,
            type_code: 0,
            sequence: 0,
            length: 0,
            crc: 0,
            buffer: vec![0u8; config.max_payload_length].into_boxed_slice(),
            filled: 0,
            stats: ParserStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Payload buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes accumulated into the payload buffer for the frame in progress.
    pub fn buffered(&self) -> usize {
        self.filled
    }

    /// Parser counters.
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Abandon any frame in progress and return to marker search.
    pub fn reset(&mut self) {
        self.state = ParserState::SeekSof0;
        self.filled = 0;
    }

    /// Consume one byte; returns a frame when the byte completes one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        let (next, frame) = self.step(byte);
        self.state = next;
        frame
    }

    /// Consume a run of bytes, collecting completed frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn step(&mut self, byte: u8) -> (ParserState, Option<Frame>) {
        use ParserState::*;

        match self.state {
            SeekSof0 => {
                if byte == self.markers[0] {
                    (SeekSof1, None)
                } else {
                    (SeekSof0, None)
                }
            }
            SeekSof1 => {
                if byte == self.markers[1] {
                    (Type, None)
                } else {
                    // The rejected byte is not re-tested as a first marker.
                    self.stats.marker_misses += 1;
                    (SeekSof0, None)
                }
            }
            Type => {
                self.type_code = byte;
                (Seq0, None)
            }
            Seq0 => {
                self.sequence = byte as u16;
                (Seq1, None)
            }
            Seq1 => {
                self.sequence |= (byte as u16) << 8;
                (Len0, None)
            }
            Len0 => {
                self.length = byte as u16;
                (Len1, None)
            }
            Len1 => {
                self.length |= (byte as u16) << 8;
                self.filled = 0;

                if self.length as usize > self.buffer.len() {
                    self.stats.oversize_drops += 1;
                    trace!(
                        length = self.length,
                        capacity = self.buffer.len(),
                        "dropping oversize frame"
                    );
                    (SeekSof0, None)
                } else if self.length == 0 {
                    (Crc0, None)
                } else {
                    (Data, None)
                }
            }
            Data => {
                let Some(slot) = self.buffer.get_mut(self.filled) else {
                    // Unreachable while Len1 guards the capacity.
                    self.filled = 0;
                    return (SeekSof0, None);
                };
                *slot = byte;
                self.filled += 1;

                if self.filled >= self.length as usize {
                    (Crc0, None)
                } else {
                    (Data, None)
                }
            }
            Crc0 => {
                self.crc = byte as u16;
                (Crc1, None)
            }
            Crc1 => {
                self.crc |= (byte as u16) << 8;
                self.stats.frames += 1;

                let frame = Frame {
                    type_code: self.type_code,
                    sequence: self.sequence,
                    payload: self.buffer[..self.length as usize].to_vec(),
                    crc: self.crc,
                };
                trace!(
                    type_code = frame.type_code,
                    sequence = frame.sequence,
                    length = frame.length(),
                    "frame assembled"
                );
                self.filled = 0;
                (SeekSof0, Some(frame))
            }
        }
    }
}
