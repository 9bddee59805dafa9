//! gbsip - a GB28181 signaling client
//!
//! Registers with a GB28181 SIP server over UDP, keeps the registration
//! alive, and sends device-control and live-view requests whose responses
//! are matched back to the caller by Call-ID.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{DeviceController, NotificationHandler, PlayOptions, PlaySession};
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
pub use infrastructure::protocols::sip::{ClientBuilder, SipClient, SipError, SipMessage};
