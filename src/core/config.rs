//! Protocol configuration.
//!
//! Every tunable of the wire format and the session lives here. The defaults
//! are the reference deployment's values; a receiver and its remote must agree
//! on all of them except the timing fields.

use std::time::Duration;

use super::constants::*;
use super::error::ConfigError;

/// Protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Start-of-frame marker pair.
    pub start_markers: [u8; 2],
    /// Receive buffer capacity; frames declaring more are dropped unread.
    pub max_payload_length: usize,
    /// Exact payload length of a DATA frame (label byte + record).
    pub data_length: u16,
    /// Ticks between REQUEST retransmissions.
    pub request_period: u32,
    /// Upper bound on a single transport send.
    pub send_timeout: Duration,
    /// CRC generator polynomial.
    pub crc_polynomial: u16,
    /// CRC register seed.
    pub crc_initial: u16,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            start_markers: [START_OF_FRAME_0, START_OF_FRAME_1],
            max_payload_length: MAX_PAYLOAD_LENGTH,
            data_length: DATA_PAYLOAD_LENGTH,
            request_period: REQUEST_PERIOD_TICKS,
            send_timeout: Duration::from_millis(SEND_TIMEOUT_MILLIS),
            crc_polynomial: CRC_POLYNOMIAL,
            crc_initial: CRC_INITIAL,
        }
    }
}

impl ProtocolConfig {
    /// Create a configuration with the reference values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start-of-frame markers.
    pub fn with_start_markers(mut self, first: u8, second: u8) -> Self {
        self.start_markers = [first, second];
        self
    }

    /// Set the record layout: DATA payload length, with the buffer sized to match.
    pub fn with_data_length(mut self, data_length: u16) -> Self {
        self.data_length = data_length;
        self.max_payload_length = data_length as usize;
        self
    }

    /// Set the receive buffer capacity independently of the DATA length.
    pub fn with_max_payload_length(mut self, capacity: usize) -> Self {
        self.max_payload_length = capacity;
        self
    }

    /// Set the REQUEST retransmission period in clock ticks.
    pub fn with_request_period(mut self, ticks: u32) -> Self {
        self.request_period = ticks;
        self
    }

    /// Set the transport send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the CRC polynomial and seed.
    pub fn with_crc(mut self, polynomial: u16, initial: u16) -> Self {
        self.crc_polynomial = polynomial;
        self.crc_initial = initial;
        self
    }

    /// Size of the record handed to storage (DATA payload minus the label byte).
    pub fn record_length(&self) -> usize {
        (self.data_length as usize).saturating_sub(LABEL_SIZE)
    }

    /// Check the configuration for values the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [first, second] = self.start_markers;
        if first == second {
            return Err(ConfigError::IdenticalMarkers(first));
        }
        if self.data_length == 0 {
            return Err(ConfigError::EmptyDataLength);
        }
        if self.max_payload_length < self.data_length as usize {
            return Err(ConfigError::CapacityTooSmall {
                capacity: self.max_payload_length,
                data_length: self.data_length,
            });
        }
        if self.max_payload_length > u16::MAX as usize {
            return Err(ConfigError::CapacityTooLarge(self.max_payload_length));
        }
        if self.request_period == 0 {
            return Err(ConfigError::ZeroRequestPeriod);
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::ZeroSendTimeout);
        }
        Ok(())
    }
}
