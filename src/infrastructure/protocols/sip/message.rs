//! SIP message types and parsing
//!
//! Parsing and serialization are delegated to `rsip`; the engine only looks
//! at the Call-ID (the correlation key), the status code, and a handful of
//! headers needed for registration and dialog follow-ups.

use crate::domain::DomainError;
use bytes::Bytes;
use rsip::headers::UntypedHeader;
use rsip::{Header, Headers, Method, Request, Response};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Address resolution error: {0}")]
    AddressResolution(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Malformed authentication challenge: {0}")]
    AuthChallengeParse(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Connection closed")]
    Closed,

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Unsupported transport: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// Value of the first header matching `name` that rsip left untyped
fn other_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.iter().find_map(|h| match h {
        Header::Other(key, value) if key.eq_ignore_ascii_case(name) => Some(value.as_str()),
        _ => None,
    })
}

fn call_id_of(headers: &Headers) -> Option<String> {
    headers
        .iter()
        .find_map(|h| match h {
            Header::CallId(cid) => Some(cid.value().trim().to_string()),
            _ => None,
        })
        .or_else(|| other_header(headers, "i").map(|v| v.trim().to_string()))
}

fn cseq_of(headers: &Headers) -> Option<(u32, String)> {
    headers.iter().find_map(|h| match h {
        Header::CSeq(cseq) => {
            let mut parts = cseq.value().split_whitespace();
            let seq = parts.next()?.parse().ok()?;
            let method = parts.next()?.to_string();
            Some((seq, method))
        }
        _ => None,
    })
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        call_id_of(&self.inner.headers)
    }

    pub fn cseq(&self) -> Option<u32> {
        cseq_of(&self.inner.headers).map(|(seq, _)| seq)
    }

    pub fn authorization(&self) -> Option<String> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::Authorization(auth) => Some(auth.value().to_string()),
            _ => None,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        call_id_of(&self.inner.headers)
    }

    /// Raw `WWW-Authenticate` value
    pub fn www_authenticate(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::WwwAuthenticate(auth) => Some(auth.value().to_string()),
                _ => None,
            })
            .or_else(|| other_header(&self.inner.headers, "WWW-Authenticate").map(str::to_string))
    }

    /// Raw `To` value, including the remote tag once a dialog is established
    pub fn to_header(&self) -> Option<String> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::To(to) => Some(to.value().to_string()),
            _ => None,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        // Try parsing as request first
        if let Ok(request) = SipRequest::parse(data) {
            return Ok(SipMessage::Request(request));
        }

        // Try parsing as response
        if let Ok(response) = SipResponse::parse(data) {
            return Ok(SipMessage::Response(response));
        }

        Err(SipError::ParseError(
            "Could not parse as SIP request or response".to_string(),
        ))
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, SipMessage::Response(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn into_response(self) -> Result<SipResponse, SipError> {
        match self {
            SipMessage::Response(resp) => Ok(resp),
            SipMessage::Request(req) => Err(SipError::InvalidMessage(format!(
                "expected a response, got {} request",
                req.method()
            ))),
        }
    }

    /// Dialog identifier used to correlate replies with requests
    pub fn call_id(&self) -> Option<String> {
        match self {
            SipMessage::Request(req) => req.call_id(),
            SipMessage::Response(resp) => resp.call_id(),
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(req) => req.headers(),
            SipMessage::Response(resp) => resp.headers(),
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            SipMessage::Request(req) => req.body(),
            SipMessage::Response(resp) => resp.body(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            SipMessage::Request(req) => req.to_bytes(),
            SipMessage::Response(resp) => resp.to_bytes(),
        }
    }
}

impl From<SipRequest> for SipMessage {
    fn from(req: SipRequest) -> Self {
        SipMessage::Request(req)
    }
}

impl From<SipResponse> for SipMessage {
    fn from(resp: SipResponse) -> Self {
        SipMessage::Response(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register_request() {
        let data = b"REGISTER sip:34020000002000000001@3402000000 SIP/2.0\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
                     From: <sip:34020000001320000001@3402000000>;tag=1928301774\r\n\
                     To: <sip:34020000001320000001@3402000000>\r\n\
                     Call-ID: a84b4c76e66710@192.168.1.100\r\n\
                     CSeq: 1 REGISTER\r\n\
                     Contact: <sip:34020000001320000001@192.168.1.100:5060>\r\n\
                     Expires: 3600\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.call_id(), Some("a84b4c76e66710@192.168.1.100".to_string()));

        let req = msg.as_request().unwrap();
        assert_eq!(req.method(), &Method::Register);
        assert_eq!(req.cseq(), Some(1));
    }

    #[test]
    fn test_parse_challenge_response() {
        let data = b"SIP/2.0 401 Unauthorized\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
                     From: <sip:34020000001320000001@3402000000>;tag=1928301774\r\n\
                     To: <sip:34020000001320000001@3402000000>;tag=a6c85cf\r\n\
                     Call-ID: a84b4c76e66710@192.168.1.100\r\n\
                     CSeq: 1 REGISTER\r\n\
                     WWW-Authenticate: Digest realm=\"3402000000\", nonce=\"9bd055\"\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.call_id(), Some("a84b4c76e66710@192.168.1.100".to_string()));

        let resp = msg.into_response().unwrap();
        assert_eq!(resp.status_code(), 401);
        assert!(!resp.is_success());
        let challenge = resp.www_authenticate().unwrap();
        assert!(challenge.contains("realm=\"3402000000\""));
        assert!(resp.to_header().unwrap().contains("tag=a6c85cf"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            SipMessage::parse(b"\x00\x01 definitely not sip"),
            Err(SipError::ParseError(_))
        ));
    }
}
