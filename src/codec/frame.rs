//! Frame types and the wire serializer.
//!
//! Wire format (all multi-byte fields little-endian):
//! ```text
//! +------+------+------+----------+----------+-----------------+----------+
//! | SOF0 | SOF1 | Type | Sequence | Length   | Payload         | CRC      |
//! | 0xAA | 0x55 | 1 B  | 2 B (LE) | 2 B (LE) | `Length` bytes  | 2 B (LE) |
//! +------+------+------+----------+----------+-----------------+----------+
//!              |<-------------- CRC-16 coverage -------------->|
//! ```

use crate::core::constants::*;
use crate::core::{FrameError, ProtocolConfig};

use super::crc::Crc16;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Receiver asks for the record at the carried sequence.
    RequestData = FRAME_TYPE_REQUEST_DATA,
    /// One record from the remote.
    Data = FRAME_TYPE_DATA,
    /// Receiver's verdict on a DATA frame.
    Acknowledgement = FRAME_TYPE_ACKNOWLEDGEMENT,
    /// Remote has nothing more to send.
    Finish = FRAME_TYPE_FINISH,
    /// Receiver tells the remote to stop.
    End = FRAME_TYPE_END,
}

impl FrameType {
    /// Parse frame type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            FRAME_TYPE_REQUEST_DATA => Some(Self::RequestData),
            FRAME_TYPE_DATA => Some(Self::Data),
            FRAME_TYPE_ACKNOWLEDGEMENT => Some(Self::Acknowledgement),
            FRAME_TYPE_FINISH => Some(Self::Finish),
            FRAME_TYPE_END => Some(Self::End),
            _ => None,
        }
    }

    /// Convert frame type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Acknowledgement status carried in the 1-byte ACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckStatus {
    /// Frame accepted (or already held).
    Ok,
    /// Frame rejected; the remote should resend.
    Error,
}

impl AckStatus {
    /// Parse a status byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK_STATUS_OK => Some(Self::Ok),
            ACK_STATUS_ERROR => Some(Self::Error),
            _ => None,
        }
    }

    /// Status byte on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ok => ACK_STATUS_OK,
            Self::Error => ACK_STATUS_ERROR,
        }
    }

    /// Whether this is a positive acknowledgement.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// One frame, as assembled by the parser or built for sending.
///
/// `type_code` is kept raw: frames of unknown type still carry a valid CRC
/// over the byte that was actually received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw type byte.
    pub type_code: u8,
    /// Sequence number (wraps mod 2^16).
    pub sequence: u16,
    /// Payload bytes; its length is the frame's length field.
    pub payload: Vec<u8>,
    /// CRC carried by the frame.
    pub crc: u16,
}

impl Frame {
    /// Decoded frame type, if the code is known.
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_byte(self.type_code)
    }

    /// Value of the length field.
    pub fn length(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Type, sequence, and length as laid out on the wire (CRC-covered, no markers).
    pub fn header_fields(&self) -> [u8; HEADER_FIELDS_SIZE] {
        let mut buf = [0u8; HEADER_FIELDS_SIZE];
        buf[0] = self.type_code;
        buf[1..3].copy_from_slice(&self.sequence.to_le_bytes());
        buf[3..5].copy_from_slice(&self.length().to_le_bytes());
        buf
    }

    /// CRC over type‖sequence‖length‖payload.
    pub fn compute_crc(&self, crc: &Crc16) -> u16 {
        let header = crc.update(crc.initial(), &self.header_fields());
        crc.update(header, &self.payload)
    }

    /// Check the carried CRC against a recomputation.
    pub fn is_intact(&self, crc: &Crc16) -> bool {
        self.compute_crc(crc) == self.crc
    }

    /// Status byte of an ACK frame.
    pub fn ack_status(&self) -> Option<AckStatus> {
        if self.frame_type() != Some(FrameType::Acknowledgement) || self.payload.len() != 1 {
            return None;
        }
        AckStatus::from_byte(self.payload[0])
    }
}

/// A serialized frame, split into the three ordered writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    header: [u8; HEADER_SIZE],
    payload: Vec<u8>,
    crc: [u8; CRC_SIZE],
}

impl EncodedFrame {
    /// Markers, type, sequence, and length.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Payload bytes (may be empty).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Trailing CRC bytes.
    pub fn crc(&self) -> &[u8] {
        &self.crc
    }

    /// Non-empty segments in write order: header, payload, CRC.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        [self.header(), self.payload(), self.crc()]
            .into_iter()
            .filter(|segment| !segment.is_empty())
    }

    /// Total size on the wire.
    pub fn len(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CRC_SIZE
    }

    /// Always false; a frame has at least a header and a CRC.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Contiguous wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        for segment in self.segments() {
            buf.extend_from_slice(segment);
        }
        buf
    }
}

/// Builds frames with the configured markers and CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    markers: [u8; MARKER_SIZE],
    crc: Crc16,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

impl FrameEncoder {
    /// Create an encoder for a configuration.
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            markers: config.start_markers,
            crc: Crc16::from(config),
        }
    }

    /// CRC parameters in use.
    pub fn crc(&self) -> &Crc16 {
        &self.crc
    }

    /// Build a frame with a freshly computed CRC.
    pub fn seal(
        &self,
        frame_type: FrameType,
        sequence: u16,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Frame, FrameError> {
        self.seal_code(frame_type.as_byte(), sequence, payload)
    }

    /// Build a frame from a raw type byte with a freshly computed CRC.
    pub fn seal_code(
        &self,
        type_code: u8,
        sequence: u16,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Frame, FrameError> {
        let payload = payload.into();
        if payload.len() > u16::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: u16::MAX as usize,
            });
        }
        Ok(self.seal_short(type_code, sequence, payload))
    }

    // Callers guarantee `payload.len() <= u16::MAX`.
    fn seal_short(&self, type_code: u8, sequence: u16, payload: Vec<u8>) -> Frame {
        let mut frame = Frame {
            type_code,
            sequence,
            payload,
            crc: 0,
        };
        frame.crc = frame.compute_crc(&self.crc);
        frame
    }

    /// Serialize a frame, writing its carried CRC as-is.
    pub fn encode(&self, frame: &Frame) -> EncodedFrame {
        let mut header = [0u8; HEADER_SIZE];
        header[..MARKER_SIZE].copy_from_slice(&self.markers);
        header[MARKER_SIZE..].copy_from_slice(&frame.header_fields());
        EncodedFrame {
            header,
            payload: frame.payload.clone(),
            crc: frame.crc.to_le_bytes(),
        }
    }

    /// REQUEST_DATA for `sequence`.
    pub fn request(&self, sequence: u16) -> EncodedFrame {
        self.encode(&self.seal_short(FRAME_TYPE_REQUEST_DATA, sequence, Vec::new()))
    }

    /// ACKNOWLEDGEMENT with `status` for `sequence`.
    pub fn ack(&self, status: AckStatus, sequence: u16) -> EncodedFrame {
        self.encode(&self.seal_short(
            FRAME_TYPE_ACKNOWLEDGEMENT,
            sequence,
            vec![status.as_byte()],
        ))
    }

    /// END carrying `sequence`.
    pub fn end(&self, sequence: u16) -> EncodedFrame {
        self.encode(&self.seal_short(FRAME_TYPE_END, sequence, Vec::new()))
    }
}
