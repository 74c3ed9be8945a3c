//! Protocol constants for the pullframe wire format.
//!
//! The defaults below match the reference deployment: a sensor node pulling
//! labelled blocks of 50 `f64` samples over a UART.

// =============================================================================
// FRAMING
// =============================================================================

/// First start-of-frame marker byte.
pub const START_OF_FRAME_0: u8 = 0xAA;

/// Second start-of-frame marker byte.
pub const START_OF_FRAME_1: u8 = 0x55;

/// Size of the marker pair.
pub const MARKER_SIZE: usize = 2;

/// Size of the CRC-covered header (type + sequence + length).
pub const HEADER_FIELDS_SIZE: usize = 1 + 2 + 2;

/// Size of the complete header as written to the wire (markers + fields).
pub const HEADER_SIZE: usize = MARKER_SIZE + HEADER_FIELDS_SIZE;

/// Size of the trailing CRC.
pub const CRC_SIZE: usize = 2;

// =============================================================================
// FRAME TYPES
// =============================================================================

/// Receiver asks the remote for the record at the carried sequence.
pub const FRAME_TYPE_REQUEST_DATA: u8 = 0x01;

/// Remote delivers one record.
pub const FRAME_TYPE_DATA: u8 = 0x02;

/// Receiver acknowledges a DATA frame (1-byte status payload).
pub const FRAME_TYPE_ACKNOWLEDGEMENT: u8 = 0x03;

/// Remote has no more data.
pub const FRAME_TYPE_FINISH: u8 = 0x04;

/// Receiver tells the remote to stop.
pub const FRAME_TYPE_END: u8 = 0x05;

/// Acknowledgement status byte: frame accepted.
pub const ACK_STATUS_OK: u8 = 0x00;

/// Acknowledgement status byte: frame rejected.
pub const ACK_STATUS_ERROR: u8 = 0x01;

// =============================================================================
// RECORD LAYOUT
// =============================================================================

/// Number of samples in one record.
pub const SAMPLES_PER_RECORD: usize = 50;

/// Size of one sample (`f64`).
pub const SAMPLE_SIZE: usize = 8;

/// Size of the label byte leading every DATA payload.
pub const LABEL_SIZE: usize = 1;

/// Size of the record handed to the storage sink.
pub const RECORD_SIZE: usize = SAMPLES_PER_RECORD * SAMPLE_SIZE;

/// Expected DATA payload length (label + record).
pub const DATA_PAYLOAD_LENGTH: u16 = (LABEL_SIZE + RECORD_SIZE) as u16;

/// Receive buffer capacity.
pub const MAX_PAYLOAD_LENGTH: usize = LABEL_SIZE + RECORD_SIZE;

// =============================================================================
// CRC-16/CCITT-FALSE
// =============================================================================

/// CCITT generator polynomial.
pub const CRC_POLYNOMIAL: u16 = 0x1021;

/// CRC register seed.
pub const CRC_INITIAL: u16 = 0xFFFF;

// =============================================================================
// TIMING
// =============================================================================

/// Ticks to wait before re-sending a REQUEST that got no answer.
pub const REQUEST_PERIOD_TICKS: u32 = 20;

/// Duration of one clock tick in the reference deployment.
pub const TICK_MILLIS: u64 = 1;

/// Upper bound on a single transport write.
pub const SEND_TIMEOUT_MILLIS: u64 = 1000;
