//! Receiving side of the pull protocol.
//!
//! Two contexts share one [`Session`]:
//!
//! - **Reception**: bytes go through the [`FrameParser`](crate::codec::FrameParser)
//!   into the [`MessageHandler`], which stores records and leaves a pending
//!   acknowledgement behind.
//! - **Polling**: the [`PollDriver`] periodically requests the next record,
//!   sends the pending acknowledgement, and advances the sequence.
//!
//! [`Receiver`] bundles both for single-threaded use.

mod handler;
mod poll;
mod receiver;
mod state;

pub use handler::{Disposition, MessageHandler};
pub use poll::{Outbound, PollDriver};
pub use receiver::{Receiver, Reception};
pub use state::{PendingAck, Session, SessionState, SessionStats};
