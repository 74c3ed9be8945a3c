//! pullframe - Frame Codec
//!
//! - **CRC engine**: [`Crc16`], CRC-16/CCITT-FALSE with an incremental register
//! - **Serializer**: [`FrameEncoder`] producing [`EncodedFrame`]s as ordered writes
//! - **Deserializer**: [`FrameParser`], a byte-at-a-time state machine
//!
//! Nothing in this module does I/O or keeps session state.

mod crc;
mod frame;
mod parser;

pub use crc::Crc16;
pub use frame::*;
pub use parser::{FrameParser, ParserState, ParserStats};
