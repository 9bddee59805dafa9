//! Response correlation
//!
//! A [`Channel`] collects the responses one request is waiting for. It ends
//! exactly once: either the expected number of messages arrived, or the
//! deadline passed (or the client shut down) first. The [`CorrelationPool`]
//! maps Call-IDs to the channels still in flight.

use super::message::{SipError, SipMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct ChannelState {
    messages: Vec<SipMessage>,
    /// Set by whichever outcome happens first
    closed: bool,
}

/// Result of offering a message to a channel
#[derive(Debug)]
pub enum Offer {
    /// Accepted; `true` once the expected count is reached
    Accepted(bool),
    /// The channel already finished; the message is handed back
    Rejected(SipMessage),
}

/// Per-request wait primitive
#[derive(Debug)]
pub struct Channel {
    expected: usize,
    timeout: Duration,
    deadline: Instant,
    state: Mutex<ChannelState>,
    done: CancellationToken,
}

impl Channel {
    pub fn new(expected: usize, timeout: Duration) -> Self {
        Self::with_token(expected, timeout, CancellationToken::new())
    }

    /// A channel that also ends (as cancelled) when `parent` is cancelled
    pub fn with_parent(expected: usize, timeout: Duration, parent: &CancellationToken) -> Self {
        Self::with_token(expected, timeout, parent.child_token())
    }

    fn with_token(expected: usize, timeout: Duration, done: CancellationToken) -> Self {
        Self {
            expected,
            timeout,
            deadline: Instant::now() + timeout,
            state: Mutex::new(ChannelState::default()),
            done,
        }
    }

    /// Append a message. Returns whether the expected count has been reached.
    /// A zero-count channel reports completion without keeping anything.
    pub async fn receive(&self, message: SipMessage) -> bool {
        match self.offer(message).await {
            Offer::Accepted(completed) => completed,
            Offer::Rejected(_) => true,
        }
    }

    pub async fn offer(&self, message: SipMessage) -> Offer {
        if self.expected == 0 {
            return Offer::Accepted(true);
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return Offer::Rejected(message);
        }

        state.messages.push(message);
        if state.messages.len() >= self.expected {
            state.closed = true;
            self.done.cancel();
            return Offer::Accepted(true);
        }
        Offer::Accepted(false)
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Wait until the expected messages are in, the deadline passes, or the
    /// parent token is cancelled. Success returns messages in arrival order;
    /// failure never carries a partial result.
    pub async fn wait(&self) -> Result<Vec<SipMessage>, SipError> {
        if self.expected == 0 {
            return Ok(Vec::new());
        }

        let expired = tokio::time::timeout_at(self.deadline, self.done.cancelled())
            .await
            .is_err();

        let mut state = self.state.lock().await;
        if state.closed && state.messages.len() >= self.expected {
            return Ok(std::mem::take(&mut state.messages));
        }

        state.closed = true;
        state.messages.clear();
        if expired {
            Err(SipError::Timeout(self.timeout))
        } else {
            Err(SipError::Cancelled("client shut down".to_string()))
        }
    }
}

/// What happened to an inbound message handed to the pool
#[derive(Debug)]
pub enum Delivery {
    Delivered,
    Unmatched(SipMessage),
}

/// Outstanding requests keyed by Call-ID
#[derive(Debug, Default)]
pub struct CorrelationPool {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl CorrelationPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a channel. Returns the channel it displaced, if any; Call-IDs
    /// are expected to be unique per in-flight request so that should not
    /// happen.
    pub async fn insert(&self, call_id: String, channel: Arc<Channel>) -> Option<Arc<Channel>> {
        let mut channels = self.channels.write().await;
        let displaced = channels.insert(call_id.clone(), channel);
        if displaced.is_some() {
            warn!("Call-ID {} already had a pending request; replaced", call_id);
        }
        displaced
    }

    /// Route an inbound message to its pending request
    pub async fn deliver(&self, call_id: &str, message: SipMessage) -> Delivery {
        let channel = {
            let channels = self.channels.read().await;
            channels.get(call_id).cloned()
        };

        let Some(channel) = channel else {
            return Delivery::Unmatched(message);
        };

        match channel.offer(message).await {
            Offer::Accepted(completed) => {
                if completed {
                    self.evict(call_id, &channel).await;
                    debug!("Request {} completed", call_id);
                }
                Delivery::Delivered
            }
            Offer::Rejected(message) => {
                self.evict(call_id, &channel).await;
                Delivery::Unmatched(message)
            }
        }
    }

    /// Remove `call_id` if it still maps to `channel`
    pub async fn evict(&self, call_id: &str, channel: &Arc<Channel>) -> bool {
        let mut channels = self.channels.write().await;
        match channels.get(call_id) {
            Some(current) if Arc::ptr_eq(current, channel) => {
                channels.remove(call_id);
                true
            }
            _ => false,
        }
    }

    pub async fn contains(&self, call_id: &str) -> bool {
        self.channels.read().await.contains_key(call_id)
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(call_id: &str, status: u16) -> SipMessage {
        let raw = format!(
            "SIP/2.0 {} OK\r\nCall-ID: {}\r\nCSeq: 1 MESSAGE\r\nContent-Length: 0\r\n\r\n",
            status, call_id
        );
        SipMessage::parse(raw.as_bytes()).unwrap()
    }

    fn status(msg: &SipMessage) -> u16 {
        msg.as_response().unwrap().status_code()
    }

    #[tokio::test]
    async fn test_collects_in_arrival_order() {
        let channel = Channel::new(3, Duration::from_secs(5));

        assert!(!channel.receive(response("a", 100)).await);
        assert!(!channel.receive(response("a", 180)).await);
        assert!(channel.receive(response("a", 200)).await);

        let messages = channel.wait().await.unwrap();
        let codes: Vec<u16> = messages.iter().map(status).collect();
        assert_eq!(codes, vec![100, 180, 200]);
    }

    #[tokio::test]
    async fn test_zero_expected_never_accumulates() {
        let channel = Channel::new(0, Duration::from_secs(5));
        assert!(channel.receive(response("a", 200)).await);
        assert!(channel.receive(response("a", 200)).await);
        assert!(channel.wait().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_has_no_partial_result() {
        let channel = Channel::new(2, Duration::from_millis(50));
        assert!(!channel.receive(response("a", 100)).await);

        let result = channel.wait().await;
        assert!(matches!(result, Err(SipError::Timeout(_))));

        // Late arrivals are refused once the deadline has fired
        assert!(matches!(
            channel.offer(response("a", 200)).await,
            Offer::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_completion_wakes_waiter_early() {
        let channel = Arc::new(Channel::new(1, Duration::from_secs(30)));
        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.receive(response("a", 200)).await;

        let messages = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_parent_cancel() {
        let parent = CancellationToken::new();
        let channel = Channel::with_parent(1, Duration::from_secs(30), &parent);
        parent.cancel();
        assert!(matches!(channel.wait().await, Err(SipError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_pool_routes_and_evicts() {
        let pool = CorrelationPool::new();
        let channel = Arc::new(Channel::new(2, Duration::from_secs(5)));
        pool.insert("call-1".to_string(), channel.clone()).await;

        assert!(matches!(
            pool.deliver("call-1", response("call-1", 100)).await,
            Delivery::Delivered
        ));
        assert!(pool.contains("call-1").await);

        assert!(matches!(
            pool.deliver("call-1", response("call-1", 200)).await,
            Delivery::Delivered
        ));
        assert!(pool.is_empty().await);

        assert!(matches!(
            pool.deliver("call-1", response("call-1", 200)).await,
            Delivery::Unmatched(_)
        ));
    }

    #[tokio::test]
    async fn test_pool_late_message_is_unmatched() {
        let pool = CorrelationPool::new();
        let channel = Arc::new(Channel::new(1, Duration::from_millis(10)));
        pool.insert("call-2".to_string(), channel.clone()).await;

        assert!(channel.wait().await.is_err());
        assert!(matches!(
            pool.deliver("call-2", response("call-2", 200)).await,
            Delivery::Unmatched(_)
        ));
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn test_evict_leaves_newer_channel() {
        let pool = CorrelationPool::new();
        let old = Arc::new(Channel::new(1, Duration::from_secs(5)));
        let new = Arc::new(Channel::new(1, Duration::from_secs(5)));
        pool.insert("call-3".to_string(), old.clone()).await;
        pool.insert("call-3".to_string(), new.clone()).await;

        assert!(!pool.evict("call-3", &old).await);
        assert!(pool.contains("call-3").await);
        assert!(pool.evict("call-3", &new).await);
    }
}
