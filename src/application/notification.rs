//! Handling of requests devices and the server send on their own

use crate::domain::control::Notification;
use crate::infrastructure::protocols::sip::builder::ResponseBuilder;
use crate::infrastructure::protocols::sip::{MessageHandler, SipClient, SipMessage};
use async_trait::async_trait;
use rsip::Method;
use tracing::{debug, info, warn};

/// Logs MANSCDP notifications and answers every inbound request except ACK
/// with `200 OK`
#[derive(Debug, Default)]
pub struct NotificationHandler;

impl NotificationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    async fn handle(&self, client: SipClient, message: SipMessage) {
        let request = match message {
            SipMessage::Request(request) => request,
            SipMessage::Response(response) => {
                debug!("Late or stray response {:?} dropped", response.call_id());
                return;
            }
        };

        if !request.body().is_empty() {
            match Notification::parse(request.body()) {
                Ok(notification) if notification.is_keepalive() => {
                    debug!("Keepalive from {}", notification.device_id)
                }
                Ok(notification) => info!(
                    "{} from {} (SN {}, status {:?}, result {:?})",
                    notification.cmd_type,
                    notification.device_id,
                    notification.sn,
                    notification.status,
                    notification.result
                ),
                Err(e) => debug!("{} body is not MANSCDP: {}", request.method(), e),
            }
        }

        if request.method() == &Method::Ack {
            return;
        }

        let response = match ResponseBuilder::ok()
            .user_agent(client.options().user.user_agent.clone())
            .build_for_request(&request)
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Could not answer {}: {}", request.method(), e);
                return;
            }
        };

        if let Err(e) = client.send(response.into()).await {
            warn!("Failed to answer {}: {}", request.method(), e);
        }
    }
}
