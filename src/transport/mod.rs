//! pullframe - Async Transport
//!
//! Runs a receiver over any tokio byte stream (serial port, TCP bridge,
//! in-memory duplex):
//!
//! - **Frame writer**: [`FrameWriter`], ordered segment writes under the send timeout
//! - **Byte pump**: [`spawn_byte_pump`], reader task feeding a bounded channel
//! - **Session runner**: [`SessionRunner`], reception task plus interval-driven polling
//! - **Clock**: [`TokioClock`], ticks on the runtime timer
//!
//! ```text
//!   AsyncRead ──► byte pump ──► mpsc ──► Reception (parser + handler)
//!                                               │
//!                                            Session
//!                                               │
//!   AsyncWrite ◄── FrameWriter ◄── PollDriver ◄─┘  (interval)
//! ```

mod clock;
mod pump;
mod runner;
mod writer;

pub use clock::TokioClock;
pub use pump::{DEFAULT_CHANNEL_CAPACITY, READ_CHUNK_SIZE, spawn_byte_pump};
pub use runner::{RunSummary, SessionRunner};
pub use writer::FrameWriter;
