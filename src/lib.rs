//! # pullframe
//!
//! Receiving side of a pull-based, stop-and-wait framed serial protocol.
//!
//! The receiver asks a remote for fixed-size records one at a time, checks
//! each framed reply with CRC-16/CCITT-FALSE, stores in-order records through
//! a caller-supplied sink, and acknowledges. Lost or corrupt frames are
//! recovered by periodic re-requests; duplicates are re-acknowledged without
//! being stored twice.
//!
//! ## Wire format
//!
//! ```text
//! +------+------+------+---------+---------+----------+---------+
//! | 0xAA | 0x55 | type | seq(LE) | len(LE) | payload  | crc(LE) |
//! |  1   |  1   |  1   |    2    |    2    |   len    |    2    |
//! +------+------+------+---------+---------+----------+---------+
//! ```
//!
//! The CRC covers type, sequence, length, and payload.
//!
//! ## Feature Flags
//!
//! - `transport` (default): tokio runner, frame writer, and byte pump
//!
//! ## Modules
//!
//! - [`core`]: constants, configuration, errors, collaborator traits
//! - [`codec`]: CRC engine, frame serializer, byte-driven parser
//! - [`session`]: session state, message handler, poll driver, receiver
//! - [`transport`]: async runner (requires `transport` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use pullframe::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = ManualClock::new();
//! let mut receiver = Receiver::new(
//!     ProtocolConfig::default(),
//!     Vec::<Vec<u8>>::new(),
//!     (),
//!     clock.clone(),
//! )?;
//! let mut link: Vec<u8> = Vec::new();
//!
//! // Ask for record 0.
//! receiver.start(&mut link)?;
//!
//! // The remote answers with a label byte and a 400-byte record.
//! let encoder = FrameEncoder::default();
//! let mut payload = vec![0x01];
//! payload.extend([0u8; 400]);
//! let data = encoder.seal(FrameType::Data, 0, payload)?;
//! let dispositions = receiver.on_bytes(&encoder.encode(&data).to_bytes());
//! assert!(dispositions[0].is_accepted());
//!
//! // The next poll acknowledges it and asks for record 1.
//! receiver.poll(&mut link);
//! assert_eq!(receiver.expected_sequence(), 1);
//! assert_eq!(receiver.storage().len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Wire format
pub mod codec;

// Protocol state machine
pub mod session;

// Async transport (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::*;
    pub use crate::core::*;
    pub use crate::session::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{FrameWriter, RunSummary, SessionRunner, TokioClock};
}

// Re-export commonly used items at crate root
pub use crate::codec::{Crc16, Frame, FrameEncoder, FrameParser, FrameType};
pub use crate::core::{ProtocolConfig, PullframeError};
pub use crate::session::{Disposition, Receiver, Session};
