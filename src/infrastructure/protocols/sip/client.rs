//! GB28181 SIP client
//!
//! Owns one transport, a pool of requests waiting for responses, a receive
//! loop that routes inbound datagrams, and a keepalive task that repeats the
//! registration exchange for as long as the client lives.

use super::builder::RequestBuilder;
use super::channel::{Channel, CorrelationPool, Delivery};
use super::message::{SipError, SipMessage};
use super::options::{ClientOptions, ServerOptions};
use super::registration::DigestRegistrar;
use super::transport::{Transport, UdpTransport};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Largest datagram the receive loop accepts
pub const RECV_BUFFER_SIZE: usize = 65_535;

/// Pause before the receive loop retries after a failed reconnect
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Receives inbound messages that no pending request is waiting for
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, client: SipClient, message: SipMessage);
}

/// Performs one registration exchange with the server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, client: &SipClient) -> Result<(), SipError>;
}

/// Handler that only logs what it is given
#[derive(Debug, Default)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, _client: SipClient, message: SipMessage) {
        debug!(
            "Unsolicited message (Call-ID {:?}) ignored",
            message.call_id()
        );
    }
}

struct ClientInner {
    server: ServerOptions,
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    pool: CorrelationPool,
    handler: Arc<dyn MessageHandler>,
    registrar: Arc<dyn Registrar>,
    shutdown: CancellationToken,
    span: Span,
}

/// Handle to a running client. Cheap to clone; all clones share one socket.
#[derive(Clone)]
pub struct SipClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for SipClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipClient")
            .field("server", &self.inner.server.endpoint)
            .field("user", &self.inner.options.user.name)
            .field("closed", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

/// Builder for [`SipClient`]
pub struct ClientBuilder {
    server: ServerOptions,
    options: ClientOptions,
    transport: Option<Arc<dyn Transport>>,
    handler: Option<Arc<dyn MessageHandler>>,
    registrar: Option<Arc<dyn Registrar>>,
    span: Option<Span>,
}

impl ClientBuilder {
    pub fn new(server: ServerOptions, options: ClientOptions) -> Self {
        Self {
            server,
            options,
            transport: None,
            handler: None,
            registrar: None,
            span: None,
        }
    }

    /// Use a custom transport instead of a UDP socket built from the options
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the Digest registration exchange
    pub fn registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Span every client task logs under
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Connect, start receiving, and register once. Fails if either the
    /// connect or the first registration fails.
    pub async fn build(self) -> Result<SipClient, SipError> {
        let span = self
            .span
            .unwrap_or_else(|| info_span!("sip_client", user = %self.options.user.name));
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(UdpTransport::new(
                self.server.protocol,
                self.options.local.clone(),
                self.server.endpoint.clone(),
            ))
        });

        transport.connect().instrument(span.clone()).await?;

        let client = SipClient {
            inner: Arc::new(ClientInner {
                server: self.server,
                options: self.options,
                transport,
                pool: CorrelationPool::new(),
                handler: self.handler.unwrap_or_else(|| Arc::new(LoggingHandler)),
                registrar: self
                    .registrar
                    .unwrap_or_else(|| Arc::new(DigestRegistrar::new())),
                shutdown: CancellationToken::new(),
                span,
            }),
        };

        client.spawn_receiver();

        if let Err(e) = client.register().await {
            error!(parent: &client.inner.span, "Initial registration failed: {}", e);
            client.shutdown().await;
            return Err(e);
        }
        info!(parent: &client.inner.span, "Registered with {}", client.inner.server.endpoint.full_host());

        client.spawn_keepalive();
        Ok(client)
    }
}

impl SipClient {
    pub fn server(&self) -> &ServerOptions {
        &self.inner.server
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.transport.local_addr().await
    }

    /// Bound local address, as used in Via/Contact/Call-ID
    pub async fn local_endpoint(&self) -> Result<SocketAddr, SipError> {
        self.local_addr()
            .await
            .ok_or_else(|| SipError::TransportError("Socket not connected".to_string()))
    }

    /// Start a request from this client to `target` (device or server ID)
    pub async fn request(
        &self,
        method: rsip::Method,
        target: &str,
    ) -> Result<RequestBuilder, SipError> {
        let local = self.local_endpoint().await?;
        Ok(RequestBuilder::new(method, &self.inner.options, local, target))
    }

    /// Number of requests still waiting for responses
    pub async fn pending_requests(&self) -> usize {
        self.inner.pool.len().await
    }

    /// Write `message` without waiting for anything back
    pub async fn send(&self, message: SipMessage) -> Result<(), SipError> {
        self.send_for_responses(message, 0).await.map(|_| ())
    }

    /// Write `message` and wait for its first response
    pub async fn send_for_response(&self, message: SipMessage) -> Result<SipMessage, SipError> {
        self.send_for_responses(message, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SipError::Internal("completed request carried no response".to_string()))
    }

    /// Write `message` and wait until `expected` messages with the same
    /// Call-ID arrived, in arrival order, or the server timeout passes.
    pub async fn send_for_responses(
        &self,
        message: SipMessage,
        expected: usize,
    ) -> Result<Vec<SipMessage>, SipError> {
        let client = self.clone();
        tokio::spawn(async move { client.transact(message, expected).await }.instrument(self.inner.span.clone()))
            .await
            .map_err(|e| SipError::Internal(format!("send task failed: {}", e)))?
    }

    /// Run the registration exchange once
    pub async fn register(&self) -> Result<(), SipError> {
        let client = self.clone();
        tokio::spawn(
            async move {
                let registrar = client.inner.registrar.clone();
                registrar.register(&client).await
            }
            .instrument(self.inner.span.clone()),
        )
        .await
        .map_err(|e| SipError::Internal(format!("registration task failed: {}", e)))?
    }

    /// Stop background tasks, fail pending waits and close the socket
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.transport.disconnect().await;
        info!(parent: &self.inner.span, "SIP client shut down");
    }

    async fn transact(
        &self,
        message: SipMessage,
        expected: usize,
    ) -> Result<Vec<SipMessage>, SipError> {
        if self.is_closed() {
            return Err(SipError::Cancelled("client shut down".to_string()));
        }

        // The channel goes in before the write so a fast reply cannot miss it
        let pending = if expected > 0 {
            let call_id = message
                .call_id()
                .ok_or_else(|| SipError::InvalidMessage("message has no Call-ID".to_string()))?;
            let channel = Arc::new(Channel::with_parent(
                expected,
                self.inner.server.timeout,
                &self.inner.shutdown,
            ));
            self.inner.pool.insert(call_id.clone(), channel.clone()).await;
            Some((call_id, channel))
        } else {
            None
        };

        let data = message.to_bytes();
        debug!("Sending message:\n{}", String::from_utf8_lossy(&data));

        if let Err(e) = self.write(&data).await {
            if let Some((call_id, channel)) = &pending {
                self.inner.pool.evict(call_id, channel).await;
            }
            return Err(e);
        }

        let Some((call_id, channel)) = pending else {
            return Ok(Vec::new());
        };

        let result = channel.wait().await;
        if let Err(e) = &result {
            self.inner.pool.evict(&call_id, &channel).await;
            debug!("Request {} failed: {}", call_id, e);
        }
        result
    }

    /// A failed or short write is reported even when the reconnect that
    /// follows it succeeds; the request is not resent.
    async fn write(&self, data: &[u8]) -> Result<(), SipError> {
        let err = match self.inner.transport.send(data).await {
            Ok(n) if n == data.len() => return Ok(()),
            Ok(n) => SipError::TransportError(format!("short write: {} of {} bytes", n, data.len())),
            Err(e) => e,
        };
        warn!("Write failed: {}", err);

        if self.inner.server.auto_reconnect {
            if let Err(reconnect_err) = self.inner.transport.reconnect().await {
                error!("Reconnect after write failure failed: {}", reconnect_err);
                return Err(reconnect_err);
            }
            info!("Reconnected after write failure");
        }
        Err(err)
    }

    /// Supervises the receive loop, relaunching it after a fault
    fn spawn_receiver(&self) {
        let client = self.clone();
        let span = self.inner.span.clone();
        tokio::spawn(
            async move {
                loop {
                    let worker = client.clone();
                    let run = tokio::spawn(
                        async move { worker.receive_loop().await }.instrument(Span::current()),
                    );
                    match run.await {
                        Ok(()) => break,
                        Err(_) if client.is_closed() => break,
                        Err(e) => error!("Receive loop fault, restarting: {}", e),
                    }
                }
                debug!("Receive loop stopped");
            }
            .instrument(span),
        );
    }

    async fn receive_loop(&self) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let received = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => return,
                r = self.inner.transport.recv(&mut buf) => r,
            };

            match received {
                Ok(size) => self.dispatch(&buf[..size]).await,
                // Socket replaced under us; read from the new one
                Err(SipError::Closed) => continue,
                Err(e) => self.recover(e).await,
            }
        }
    }

    async fn recover(&self, err: SipError) {
        if self.is_closed() {
            return;
        }
        warn!("Receive failed: {}", err);

        if self.inner.server.auto_reconnect {
            match self.inner.transport.reconnect().await {
                Ok(()) => {
                    info!("Reconnected after receive failure");
                    return;
                }
                Err(e) => error!("Reconnect after receive failure failed: {}", e),
            }
        }

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => {}
            _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
        }
    }

    async fn dispatch(&self, data: &[u8]) {
        let message = match SipMessage::parse(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable datagram ({} bytes): {}", data.len(), e);
                return;
            }
        };
        debug!("Received message:\n{}", String::from_utf8_lossy(data));

        let message = match message.call_id() {
            Some(call_id) => match self.inner.pool.deliver(&call_id, message).await {
                Delivery::Delivered => return,
                Delivery::Unmatched(message) => message,
            },
            None => message,
        };

        let client = self.clone();
        let handler = self.inner.handler.clone();
        tokio::spawn(async move { handler.handle(client, message).await }.instrument(self.inner.span.clone()));
    }

    fn spawn_keepalive(&self) {
        let client = self.clone();
        let period = self.inner.options.register.keepalive_period();
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = client.inner.shutdown.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    match client.register().await {
                        Ok(()) => debug!("Keepalive registration refreshed"),
                        Err(e) => warn!("Keepalive registration failed: {}", e),
                    }
                }
                debug!("Keepalive stopped");
            }
            .instrument(self.inner.span.clone()),
        );
    }
}
