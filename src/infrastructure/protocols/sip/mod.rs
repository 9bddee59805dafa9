//! GB28181 SIP signaling client
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────┐
//! │   Application Layer     │
//! │  (device control, play) │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Client                │
//! │  (send, receive loop,   │
//! │   registration)         │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Correlation Pool      │
//! │  (Call-ID -> Channel)   │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transport Layer       │
//! │  (UDP)                  │
//! └─────────────────────────┘
//! ```

pub mod auth;
pub mod builder;
pub mod channel;
pub mod client;
pub mod message;
pub mod options;
pub mod registration;
pub mod sdp;
pub mod transport;

pub use auth::{AuthChallenge, DigestCredentials};
pub use builder::RequestBuilder;
pub use channel::{Channel, CorrelationPool, Delivery};
pub use client::{ClientBuilder, LoggingHandler, MessageHandler, Registrar, SipClient};
pub use message::{SipError, SipMessage, SipRequest, SipResponse};
pub use options::{ClientOptions, Endpoint, RegisterOptions, ServerOptions, UserOptions};
pub use registration::DigestRegistrar;
pub use sdp::{SdpOffer, SessionKind};
pub use transport::{Transport, TransportProtocol, UdpTransport};
