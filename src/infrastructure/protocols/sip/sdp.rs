//! SDP offers for GB28181 media sessions
//!
//! The engine treats SDP as an opaque payload; this only renders the offer
//! a device expects in a live-view INVITE.

use std::net::IpAddr;

/// Session name of an SDP offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Real-time stream
    Play,
    /// Recorded stream
    Playback,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Play => "Play",
            SessionKind::Playback => "Playback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub address: IpAddr,
}

#[derive(Debug, Clone)]
pub struct SdpMedia {
    pub port: u16,
    pub protocol: String,
    /// Payload type and `encoding/clock` pairs
    pub rtpmap: Vec<(u8, String)>,
}

/// A recvonly video offer with the GB28181 `y=` SSRC line
#[derive(Debug, Clone)]
pub struct SdpOffer {
    pub origin: SdpOrigin,
    pub kind: SessionKind,
    /// Where the media should be sent
    pub connection: IpAddr,
    pub media: SdpMedia,
    pub ssrc: String,
}

fn address_type(addr: &IpAddr) -> &'static str {
    if addr.is_ipv4() {
        "IP4"
    } else {
        "IP6"
    }
}

impl SdpOffer {
    /// Video offer for `device_id`, receiving on `media_ip:media_port`
    pub fn video(
        kind: SessionKind,
        device_id: &str,
        local_ip: IpAddr,
        media_ip: IpAddr,
        media_port: u16,
        ssrc: impl Into<String>,
    ) -> Self {
        Self {
            origin: SdpOrigin {
                username: device_id.to_string(),
                session_id: "0".to_string(),
                session_version: "0".to_string(),
                address: local_ip,
            },
            kind,
            connection: media_ip,
            media: SdpMedia {
                port: media_port,
                protocol: "RTP/AVP".to_string(),
                rtpmap: vec![
                    (96, "PS/90000".to_string()),
                    (97, "MPEG4/90000".to_string()),
                    (98, "H264/90000".to_string()),
                ],
            },
            ssrc: ssrc.into(),
        }
    }

    /// Convert to SDP string
    pub fn to_string(&self) -> String {
        let mut sdp = String::new();

        sdp.push_str("v=0\r\n");
        sdp.push_str(&format!(
            "o={} {} {} IN {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            address_type(&self.origin.address),
            self.origin.address
        ));
        sdp.push_str(&format!("s={}\r\n", self.kind.as_str()));
        sdp.push_str(&format!(
            "c=IN {} {}\r\n",
            address_type(&self.connection),
            self.connection
        ));
        sdp.push_str("t=0 0\r\n");

        let formats: Vec<String> = self.media.rtpmap.iter().map(|(pt, _)| pt.to_string()).collect();
        sdp.push_str(&format!(
            "m=video {} {} {}\r\n",
            self.media.port,
            self.media.protocol,
            formats.join(" ")
        ));
        sdp.push_str("a=recvonly\r\n");
        for (pt, encoding) in &self.media.rtpmap {
            sdp.push_str(&format!("a=rtpmap:{} {}\r\n", pt, encoding));
        }

        // GB28181 extension: SSRC of the requested stream
        sdp.push_str(&format!("y={}\r\n", self.ssrc));

        sdp
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_offer() {
        let offer = SdpOffer::video(
            SessionKind::Play,
            "34020000001320000001",
            "192.168.1.100".parse().unwrap(),
            "192.168.1.200".parse().unwrap(),
            10000,
            "0200000001",
        );
        let sdp = offer.to_string();

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=34020000001320000001 0 0 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("s=Play\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.200\r\n"));
        assert!(sdp.contains("m=video 10000 RTP/AVP 96 97 98\r\n"));
        assert!(sdp.contains("a=recvonly\r\n"));
        assert!(sdp.contains("a=rtpmap:98 H264/90000\r\n"));
        assert!(sdp.ends_with("y=0200000001\r\n"));
    }

    #[test]
    fn test_playback_session_name() {
        let offer = SdpOffer::video(
            SessionKind::Playback,
            "34020000001320000001",
            "::1".parse().unwrap(),
            "::1".parse().unwrap(),
            10002,
            "1200000002",
        );
        let sdp = offer.to_string();
        assert!(sdp.contains("s=Playback\r\n"));
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
    }
}
