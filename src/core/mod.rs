//! Core types for the pullframe protocol.
//!
//! Constants, configuration, errors, and the collaborator traits. Everything
//! else in the crate builds on this module.

pub mod constants;
mod config;
mod error;
mod traits;

pub use config::*;
pub use error::*;
pub use traits::*;
