//! Device use cases: PTZ and iris/focus control, live play

use crate::domain::control::{
    Command, ControlEnvelope, FiConfig, PtzConfig, Ssrc, CONTENT_TYPE,
};
use crate::infrastructure::protocols::sip::{
    SdpOffer, SessionKind, SipClient, SipError, SipResponse,
};
use chrono::{DateTime, Utc};
use rsip::Method;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, info, warn};

const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Where a device should stream to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayOptions {
    /// Stream number encoded in the SSRC, 1..=9999
    pub stream_id: u16,
    pub media_ip: IpAddr,
    pub media_port: u16,
    #[serde(default = "default_real_time")]
    pub real_time: bool,
}

fn default_real_time() -> bool {
    true
}

/// An established media session
#[derive(Debug, Clone)]
pub struct PlaySession {
    pub device_id: String,
    pub call_id: String,
    pub ssrc: Ssrc,
    /// Final response to the INVITE, carrying the device's SDP answer
    pub response: SipResponse,
    pub started_at: DateTime<Utc>,
}

/// Sends control and session requests to devices through one client
#[derive(Debug, Clone)]
pub struct DeviceController {
    client: SipClient,
}

impl DeviceController {
    pub fn new(client: SipClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SipClient {
        &self.client
    }

    /// Pan, tilt and zoom. Returns the device's response, whatever its status.
    pub async fn control_ptz(
        &self,
        device_id: &str,
        config: &PtzConfig,
    ) -> Result<SipResponse, SipError> {
        let command = Command::ptz(config)?;
        self.send_command(device_id, command).await
    }

    /// Iris and focus
    pub async fn control_fi(
        &self,
        device_id: &str,
        config: &FiConfig,
    ) -> Result<SipResponse, SipError> {
        let command = Command::fi(config)?;
        self.send_command(device_id, command).await
    }

    /// Halt any motion in progress
    pub async fn stop(&self, device_id: &str) -> Result<SipResponse, SipError> {
        self.send_command(device_id, Command::stop()).await
    }

    async fn send_command(
        &self,
        device_id: &str,
        command: Command,
    ) -> Result<SipResponse, SipError> {
        let envelope = ControlEnvelope::new(device_id, command);
        debug!(
            "DeviceControl SN {} to {}: {}",
            envelope.sn(),
            device_id,
            envelope.command()
        );

        let request = self
            .client
            .request(Method::Message, device_id)
            .await?
            .body(CONTENT_TYPE, envelope.to_bytes())
            .build()?;
        let response = self.client.send_for_response(request).await?.into_response()?;

        if !response.is_success() {
            warn!(
                "Device {} answered control SN {} with {}",
                device_id,
                envelope.sn(),
                response.status_code()
            );
        }
        Ok(response)
    }

    /// Ask `device_id` to stream to `options.media_ip:media_port`.
    ///
    /// Sends an INVITE with a recvonly SDP offer, waits for the provisional
    /// and final responses, then acknowledges the final one.
    ///
    /// Exactly two responses are collected, matching the `100 Trying` then
    /// final answer that GB28181 devices send. A device that answers with the
    /// final response alone times out, and one that sends `100`, `180` and
    /// `200` is reported as refusing with `180`.
    pub async fn play(
        &self,
        device_id: &str,
        options: &PlayOptions,
    ) -> Result<PlaySession, SipError> {
        let ssrc = Ssrc::new(options.real_time, device_id, options.stream_id)?;
        let local = self.client.local_endpoint().await?;
        let kind = if options.real_time {
            SessionKind::Play
        } else {
            SessionKind::Playback
        };

        let offer = SdpOffer::video(
            kind,
            device_id,
            local.ip(),
            options.media_ip,
            options.media_port,
            ssrc.to_string(),
        );
        let user = &self.client.options().user.name;
        let invite = self
            .client
            .request(Method::Invite, device_id)
            .await?
            .subject(format!("{}:{},{}:0", device_id, ssrc, user))
            .body(SDP_CONTENT_TYPE, offer.to_bytes());
        let call_id = invite.current_call_id().to_string();

        let responses = self.client.send_for_responses(invite.build()?, 2).await?;
        let response = responses
            .into_iter()
            .last()
            .ok_or_else(|| SipError::Internal("INVITE completed without responses".to_string()))?
            .into_response()?;

        if !response.is_success() {
            return Err(SipError::InvalidMessage(format!(
                "device {} refused INVITE with {}",
                device_id,
                response.status_code()
            )));
        }

        let to = response.to_header().ok_or_else(|| {
            SipError::InvalidMessage("final INVITE response has no To header".to_string())
        })?;
        self.client.send(invite.ack(to).build()?).await?;

        info!("Playing {} with SSRC {} (Call-ID {})", device_id, ssrc, call_id);
        Ok(PlaySession {
            device_id: device_id.to_string(),
            call_id,
            ssrc,
            response,
            started_at: Utc::now(),
        })
    }
}
