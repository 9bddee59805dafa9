//! Domain layer - pure device-protocol logic
//!
//! Nothing in here touches the network. The control codec builds the binary
//! PTZ / iris-focus frames and the XML envelopes that carry them, and parses
//! the MANSCDP notifications devices send back.

pub mod control;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
