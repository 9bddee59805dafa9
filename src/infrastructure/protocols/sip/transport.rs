//! SIP transport layer - owns the one socket a client talks through
//!
//! Sends and receives take the connection slot's shared lock; connect,
//! disconnect and reconnect take the exclusive one, so a send never sees a
//! socket that is being torn down.

use super::message::SipError;
use super::options::Endpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Transport protocol type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Tls => "TLS",
        }
    }
}

/// Connection-oriented view of a datagram socket
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve both ends and open the socket
    async fn connect(&self) -> Result<(), SipError>;

    /// Close the socket. Safe to call when already closed.
    async fn disconnect(&self);

    async fn reconnect(&self) -> Result<(), SipError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Write one datagram, returning the number of bytes written
    async fn send(&self, data: &[u8]) -> Result<usize, SipError>;

    /// Read one datagram. Returns `SipError::Closed` when the socket was
    /// closed underneath the reader by a disconnect.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize, SipError>;

    async fn local_addr(&self) -> Option<SocketAddr>;
}

/// Resolve `endpoint` to the first address the resolver returns
pub async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, SipError> {
    let target = endpoint.full_host();
    let mut addrs = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| SipError::AddressResolution(format!("{}: {}", target, e)))?;
    let first = addrs.next();
    first.ok_or_else(|| SipError::AddressResolution(format!("{}: no addresses", target)))
}

struct UdpLink {
    socket: UdpSocket,
    closed: CancellationToken,
}

/// UDP transport implementation
pub struct UdpTransport {
    protocol: TransportProtocol,
    local: Endpoint,
    server: Endpoint,
    link: RwLock<Option<UdpLink>>,
    /// Close signal of the current link, reachable without the slot lock so
    /// a disconnect can wake a reader parked in `recv`
    closing: Mutex<CancellationToken>,
}

impl UdpTransport {
    pub fn new(protocol: TransportProtocol, local: Endpoint, server: Endpoint) -> Self {
        Self {
            protocol,
            local,
            server,
            link: RwLock::new(None),
            closing: Mutex::new(CancellationToken::new()),
        }
    }

    fn swap_closing(&self, token: CancellationToken) -> CancellationToken {
        let mut guard = self.closing.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, token)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self) -> Result<(), SipError> {
        if self.protocol != TransportProtocol::Udp {
            return Err(SipError::Unsupported(self.protocol.as_str().to_string()));
        }

        // A reader parked on a previous link must let go of the slot
        self.swap_closing(CancellationToken::new()).cancel();
        let mut slot = self.link.write().await;
        if let Some(old) = slot.take() {
            old.closed.cancel();
        }

        let local = resolve(&self.local).await?;
        let server = resolve(&self.server).await?;

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to bind UDP socket {}: {}", local, e)))?;
        socket
            .connect(server)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to associate with {}: {}", server, e)))?;

        let bound = socket.local_addr().unwrap_or(local);
        info!("UDP transport {} -> {}", bound, server);

        let closed = CancellationToken::new();
        self.swap_closing(closed.clone());
        *slot = Some(UdpLink { socket, closed });
        Ok(())
    }

    async fn disconnect(&self) {
        // Wake any reader first, it holds the shared lock while parked
        self.swap_closing(CancellationToken::new()).cancel();

        let mut slot = self.link.write().await;
        if let Some(link) = slot.take() {
            link.closed.cancel();
            debug!("UDP transport to {} closed", self.server.full_host());
        }
    }

    async fn send(&self, data: &[u8]) -> Result<usize, SipError> {
        let slot = self.link.read().await;
        let link = slot
            .as_ref()
            .ok_or_else(|| SipError::TransportError("Socket not connected".to_string()))?;

        debug!("Sending {} bytes via UDP", data.len());
        link.socket
            .send(data)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to send UDP data: {}", e)))
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize, SipError> {
        let slot = self.link.read().await;
        let link = slot
            .as_ref()
            .ok_or_else(|| SipError::TransportError("Socket not connected".to_string()))?;

        tokio::select! {
            result = link.socket.recv(buf) => {
                let size = result.map_err(|e| {
                    SipError::TransportError(format!("Failed to receive UDP packet: {}", e))
                })?;
                debug!("Received {} bytes via UDP", size);
                Ok(size)
            }
            _ = link.closed.cancelled() => Err(SipError::Closed),
        }
    }

    async fn local_addr(&self) -> Option<SocketAddr> {
        let slot = self.link.read().await;
        match slot.as_ref().map(|link| link.socket.local_addr()) {
            Some(Ok(addr)) => Some(addr),
            Some(Err(e)) => {
                warn!("Could not read local address: {}", e);
                None
            }
            None => None,
        }
    }
}
