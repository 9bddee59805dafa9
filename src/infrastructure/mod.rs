//! Infrastructure layer - Technical implementations
//!
//! This layer contains the SIP signaling engine: transport, response
//! correlation, registration and message construction.

pub mod protocols;
