//! Shared kernel - types used by every part of the domain

pub mod error;
pub mod result;

pub use error::DomainError;
pub use result::Result;
