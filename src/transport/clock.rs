//! Runtime clock.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::{Clock, Tick};

/// Clock on the tokio timer, so paused test time drives the request period.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
    tick: Duration,
}

impl TokioClock {
    /// Create a clock whose tick is `tick` long, starting at zero now.
    pub fn new(tick: Duration) -> Self {
        Self {
            origin: Instant::now(),
            tick: tick.max(Duration::from_nanos(1)),
        }
    }

    /// Create a millisecond clock.
    pub fn millis() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::millis()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Tick {
        (self.origin.elapsed().as_nanos() / self.tick.as_nanos()) as Tick
    }
}
