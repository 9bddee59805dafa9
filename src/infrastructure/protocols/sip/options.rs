//! Client and server options
//!
//! Both option sets are fixed once a client is built.

use super::transport::TransportProtocol;
use std::time::Duration;

/// A host and port pair as written in configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, or the host untouched when it already carries a port or
    /// is a bracketed IPv6 literal with one
    pub fn full_host(&self) -> String {
        if self.host.contains(':') {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Where the signaling server lives and how long to wait for it
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub protocol: TransportProtocol,
    /// SIP server ID, used as the REGISTER request-URI user
    pub id: String,
    pub endpoint: Endpoint,
    /// How long a request waits for its responses
    pub timeout: Duration,
    /// Rebuild the socket after a read or write error
    pub auto_reconnect: bool,
}

/// Identity presented to the server
#[derive(Debug, Clone)]
pub struct UserOptions {
    pub name: String,
    pub domain: String,
    pub password: String,
    pub user_agent: String,
}

impl UserOptions {
    /// `sip:<name>@<domain>`, the digest URI and address of record
    pub fn uri(&self) -> String {
        format!("sip:{}@{}", self.name, self.domain)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegisterOptions {
    /// Requested registration lifetime, in seconds
    pub expires: u32,
    /// Seconds between re-registrations
    pub keepalive_interval: u64,
}

impl RegisterOptions {
    pub fn keepalive_period(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub local: Endpoint,
    pub user: UserOptions,
    pub register: RegisterOptions,
}
