//! SIP request builder utilities

use super::message::{SipError, SipMessage, SipRequest, SipResponse};
use super::options::{ClientOptions, ServerOptions};
use rand::Rng;
use rsip::headers::UntypedHeader;
use rsip::{Header, Headers, Method, Request, Response, StatusCode, Version};
use std::net::SocketAddr;

const MAX_FORWARDS: u32 = 70;

/// Fresh Call-ID: `<uuid>@<local host>`
pub fn generate_call_id(local: &SocketAddr) -> String {
    format!("{}@{}", uuid::Uuid::new_v4().simple(), local.ip())
}

pub fn generate_tag() -> String {
    format!("{:x}", rand::thread_rng().gen::<u32>())
}

pub fn generate_branch() -> String {
    format!("z9hG4bK{:x}", rand::thread_rng().gen::<u64>())
}

pub fn generate_cseq() -> u32 {
    rand::thread_rng().gen_range(1..=0x7fff_ffff)
}

/// Builds a request from this client towards a user in the client's domain
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    request_uri: String,
    from: String,
    to: String,
    contact: String,
    local: SocketAddr,
    call_id: String,
    cseq: u32,
    user_agent: String,
    expires: Option<u32>,
    subject: Option<String>,
    authorization: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl RequestBuilder {
    /// A request addressed to `target` (a device or server ID)
    pub fn new(method: Method, options: &ClientOptions, local: SocketAddr, target: &str) -> Self {
        let user = &options.user;
        Self {
            method,
            request_uri: format!("sip:{}@{}", target, user.domain),
            from: format!("<{}>;tag={}", user.uri(), generate_tag()),
            to: format!("<sip:{}@{}>", target, user.domain),
            contact: format!("<sip:{}@{}>", user.name, local),
            local,
            call_id: generate_call_id(&local),
            cseq: generate_cseq(),
            user_agent: user.user_agent.clone(),
            expires: None,
            subject: None,
            authorization: None,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// REGISTER for this client's own address of record
    pub fn register(server: &ServerOptions, options: &ClientOptions, local: SocketAddr) -> Self {
        let mut builder = Self::new(Method::Register, options, local, &server.id);
        builder.to = format!("<{}>", options.user.uri());
        builder.expires = Some(options.register.expires);
        builder
    }

    /// Replace the Call-ID with a freshly generated one
    pub fn renew_call_id(mut self) -> Self {
        self.call_id = generate_call_id(&self.local);
        self
    }

    pub fn cseq(mut self, cseq: u32) -> Self {
        self.cseq = cseq;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn body(mut self, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body;
        self
    }

    pub fn current_call_id(&self) -> &str {
        &self.call_id
    }

    /// ACK for the INVITE this builder produced: same From tag, Call-ID and
    /// CSeq number, with the `To` of the final response
    pub fn ack(&self, to: impl Into<String>) -> Self {
        let mut ack = self.clone();
        ack.method = Method::Ack;
        ack.to = to.into();
        ack.subject = None;
        ack.content_type = None;
        ack.body = Vec::new();
        ack
    }

    pub fn build(&self) -> Result<SipMessage, SipError> {
        let uri = rsip::Uri::try_from(self.request_uri.as_str())?;

        let mut headers = Headers::default();
        headers.push(Header::Via(rsip::headers::Via::new(format!(
            "SIP/2.0/UDP {};rport;branch={}",
            self.local,
            generate_branch()
        ))));
        headers.push(Header::From(rsip::headers::From::new(self.from.clone())));
        headers.push(Header::To(rsip::headers::To::new(self.to.clone())));
        headers.push(Header::CallId(rsip::headers::CallId::new(self.call_id.clone())));
        headers.push(Header::CSeq(rsip::headers::CSeq::new(format!(
            "{} {}",
            self.cseq, self.method
        ))));
        headers.push(Header::Contact(rsip::headers::Contact::new(self.contact.clone())));
        headers.push(Header::MaxForwards(rsip::headers::MaxForwards::new(
            MAX_FORWARDS.to_string(),
        )));
        headers.push(Header::UserAgent(rsip::headers::UserAgent::new(
            self.user_agent.clone(),
        )));

        if let Some(expires) = self.expires {
            headers.push(Header::Expires(rsip::headers::Expires::new(expires.to_string())));
        }
        if let Some(subject) = &self.subject {
            headers.push(Header::Subject(rsip::headers::Subject::new(subject.clone())));
        }
        if let Some(authorization) = &self.authorization {
            headers.push(Header::Authorization(rsip::headers::Authorization::new(
                authorization.clone(),
            )));
        }
        if let Some(content_type) = &self.content_type {
            headers.push(Header::ContentType(rsip::headers::ContentType::new(
                content_type.clone(),
            )));
        }
        headers.push(Header::ContentLength(rsip::headers::ContentLength::new(
            self.body.len().to_string(),
        )));

        let request = Request {
            method: self.method.clone(),
            uri,
            version: Version::V2,
            headers,
            body: self.body.clone(),
        };

        Ok(SipMessage::Request(SipRequest::new(request)))
    }
}

/// Answer to an inbound request
pub struct ResponseBuilder {
    status_code: u16,
    user_agent: Option<String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            user_agent: None,
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build_for_request(self, request: &SipRequest) -> Result<SipResponse, SipError> {
        let mut headers = Headers::default();

        // Copy the dialog-identifying headers from the request
        for header in request.headers().iter() {
            match header {
                Header::Via(_) | Header::From(_) | Header::CallId(_) | Header::CSeq(_) => {
                    headers.push(header.clone());
                }
                Header::To(to) if !to.value().contains("tag=") => {
                    headers.push(Header::To(rsip::headers::To::new(format!(
                        "{};tag={}",
                        to.value(),
                        generate_tag()
                    ))));
                }
                Header::To(_) => headers.push(header.clone()),
                _ => {}
            }
        }

        if let Some(user_agent) = self.user_agent {
            headers.push(Header::UserAgent(rsip::headers::UserAgent::new(user_agent)));
        }
        headers.push(Header::ContentLength(rsip::headers::ContentLength::new(
            self.body.len().to_string(),
        )));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers,
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::protocols::sip::options::{
        Endpoint, RegisterOptions, UserOptions,
    };
    use crate::infrastructure::protocols::sip::transport::TransportProtocol;
    use std::time::Duration;

    fn options() -> (ServerOptions, ClientOptions) {
        let server = ServerOptions {
            protocol: TransportProtocol::Udp,
            id: "34020000002000000001".to_string(),
            endpoint: Endpoint::new("192.168.1.1", 5060),
            timeout: Duration::from_secs(5),
            auto_reconnect: true,
        };
        let client = ClientOptions {
            local: Endpoint::new("192.168.1.100", 5060),
            user: UserOptions {
                name: "34020000001320000001".to_string(),
                domain: "3402000000".to_string(),
                password: "12345678".to_string(),
                user_agent: "IP Camera".to_string(),
            },
            register: RegisterOptions {
                expires: 7200,
                keepalive_interval: 60,
            },
        };
        (server, client)
    }

    #[test]
    fn test_register_request() {
        let (server, client) = options();
        let local: SocketAddr = "192.168.1.100:5060".parse().unwrap();
        let msg = RequestBuilder::register(&server, &client, local)
            .cseq(1)
            .build()
            .unwrap();

        let text = String::from_utf8(msg.to_bytes().to_vec()).unwrap();
        assert!(text.starts_with("REGISTER sip:34020000002000000001@3402000000 SIP/2.0"));
        assert!(text.contains("To: <sip:34020000001320000001@3402000000>"));
        assert!(text.contains("Expires: 7200"));
        assert!(text.contains("User-Agent: IP Camera"));

        let req = msg.as_request().unwrap();
        assert_eq!(req.cseq(), Some(1));
        assert!(req.call_id().unwrap().ends_with("@192.168.1.100"));
        assert!(req.authorization().is_none());
    }

    #[test]
    fn test_call_ids_are_unique() {
        let local: SocketAddr = "10.0.0.1:5060".parse().unwrap();
        assert_ne!(generate_call_id(&local), generate_call_id(&local));
    }

    #[test]
    fn test_body_sets_content_headers() {
        let (_, client) = options();
        let local: SocketAddr = "192.168.1.100:5060".parse().unwrap();
        let msg = RequestBuilder::new(Method::Message, &client, local, "34020000001320000002")
            .body("Application/MANSCDP+xml", b"<Control/>".to_vec())
            .build()
            .unwrap();

        let text = String::from_utf8(msg.to_bytes().to_vec()).unwrap();
        assert!(text.starts_with("MESSAGE sip:34020000001320000002@3402000000 SIP/2.0"));
        assert!(text.contains("Content-Type: Application/MANSCDP+xml"));
        assert!(text.contains("Content-Length: 10"));
        assert!(text.ends_with("<Control/>"));
    }

    #[test]
    fn test_ack_reuses_invite_dialog() {
        let (_, client) = options();
        let local: SocketAddr = "192.168.1.100:5060".parse().unwrap();
        let invite = RequestBuilder::new(Method::Invite, &client, local, "34020000001320000002")
            .cseq(42)
            .subject("34020000001320000002:0200000001,34020000001320000001:0")
            .body("application/sdp", b"v=0\r\n".to_vec());

        let ack = invite
            .ack("<sip:34020000001320000002@3402000000>;tag=dev1")
            .build()
            .unwrap();
        let req = ack.as_request().unwrap();
        assert_eq!(req.method(), &Method::Ack);
        assert_eq!(req.call_id().as_deref(), Some(invite.current_call_id()));
        assert_eq!(req.cseq(), Some(42));
        assert!(req.body().is_empty());

        let text = String::from_utf8(ack.to_bytes().to_vec()).unwrap();
        assert!(text.contains("CSeq: 42 ACK"));
        assert!(text.contains("tag=dev1"));
        assert!(!text.contains("Subject:"));
    }

    #[test]
    fn test_ok_response_mirrors_request() {
        let request = SipRequest::parse(
            b"MESSAGE sip:34020000001320000001@3402000000 SIP/2.0\r\n\
              Via: SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK1\r\n\
              From: <sip:34020000001320000002@3402000000>;tag=99\r\n\
              To: <sip:34020000001320000001@3402000000>\r\n\
              Call-ID: keepalive-7@192.168.1.64\r\n\
              CSeq: 20 MESSAGE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();

        let response = ResponseBuilder::ok()
            .user_agent("IP Camera")
            .build_for_request(&request)
            .unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.call_id(), Some("keepalive-7@192.168.1.64".to_string()));
        assert!(response.to_header().unwrap().contains(";tag="));
        let text = String::from_utf8(response.to_bytes().to_vec()).unwrap();
        assert!(text.starts_with("SIP/2.0 200 OK"));
        assert!(text.contains("CSeq: 20 MESSAGE"));
    }
}
