//! CRC-16/CCITT-FALSE.
//!
//! Polynomial 0x1021, seed 0xFFFF, MSB-first, no reflection, no final XOR.
//! The register is exposed so a checksum can be accumulated over the header
//! fields and the payload without copying them into one buffer.

use crate::core::ProtocolConfig;
use crate::core::constants::{CRC_INITIAL, CRC_POLYNOMIAL};

/// CRC-16 parameters (non-reflected, no final XOR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    polynomial: u16,
    initial: u16,
}

impl Crc16 {
    /// The CCITT-FALSE parameter set used on the wire.
    pub const CCITT_FALSE: Self = Self::new(CRC_POLYNOMIAL, CRC_INITIAL);

    /// Create a CRC with a custom polynomial and seed.
    pub const fn new(polynomial: u16, initial: u16) -> Self {
        Self {
            polynomial,
            initial,
        }
    }

    /// Register seed.
    pub const fn initial(&self) -> u16 {
        self.initial
    }

    /// Feed `bytes` into a running register.
    pub fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        for &byte in bytes {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                if crc & 0x8000 != 0 {
                    crc = (crc << 1) ^ self.polynomial;
                } else {
                    crc <<= 1;
                }
            }
        }
        crc
    }

    /// Checksum of one contiguous buffer.
    pub fn checksum(&self, bytes: &[u8]) -> u16 {
        self.update(self.initial, bytes)
    }

    /// Checksum of several buffers, as if concatenated.
    pub fn checksum_parts(&self, parts: &[&[u8]]) -> u16 {
        parts
            .iter()
            .fold(self.initial, |crc, part| self.update(crc, part))
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::CCITT_FALSE
    }
}

impl From<&ProtocolConfig> for Crc16 {
    fn from(config: &ProtocolConfig) -> Self {
        Self::new(config.crc_polynomial, config.crc_initial)
    }
}
