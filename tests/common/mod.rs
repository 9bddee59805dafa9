//! In-process GB28181 server for integration tests

#![allow(dead_code)]

use gbsip::infrastructure::protocols::sip::{
    ClientOptions, Endpoint, RegisterOptions, ServerOptions, SipMessage, SipRequest,
    TransportProtocol, UserOptions,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub const REALM: &str = "example.com";
pub const NONCE: &str = "abc123";
pub const SERVER_ID: &str = "34020000002000000001";
pub const USER: &str = "34020000001320000001";
pub const DOMAIN: &str = "3402000000";
pub const PASSWORD: &str = "12345678";
pub const DEVICE: &str = "34020000001320000002";

/// A request the server received, with its raw text
#[derive(Debug, Clone)]
pub struct Received {
    pub request: SipRequest,
    pub text: String,
    pub from: SocketAddr,
}

impl Received {
    pub fn method(&self) -> String {
        self.request.method().to_string()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        header_value(&self.text, name)
    }
}

/// Decides the raw datagrams to answer a request with
pub type Responder = dyn Fn(&Received) -> Vec<String> + Send + Sync;

pub struct FakeServer {
    pub socket: Arc<UdpSocket>,
    pub endpoint: Endpoint,
    pub requests: mpsc::UnboundedReceiver<Received>,
    /// Responses the client sent to server-initiated requests
    pub responses: mpsc::UnboundedReceiver<SipMessage>,
}

impl FakeServer {
    pub async fn start(responder: Arc<Responder>) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let port = socket.local_addr().unwrap().port();
        let (req_tx, requests) = mpsc::unbounded_channel();
        let (resp_tx, responses) = mpsc::unbounded_channel();

        let server = socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_535];
            loop {
                let Ok((n, from)) = server.recv_from(&mut buf).await else {
                    return;
                };
                let text = String::from_utf8_lossy(&buf[..n]).to_string();
                let message = match SipMessage::parse(&buf[..n]) {
                    Ok(message) => message,
                    Err(_) => continue,
                };
                let request = match message {
                    SipMessage::Request(request) => request,
                    response => {
                        let _ = resp_tx.send(response);
                        continue;
                    }
                };

                let received = Received { request, text, from };
                for reply in responder(&received) {
                    let _ = server.send_to(reply.as_bytes(), from).await;
                }
                let _ = req_tx.send(received);
            }
        });

        Self {
            socket,
            endpoint: Endpoint::new("127.0.0.1", port),
            requests,
            responses,
        }
    }

    pub async fn next_request(&mut self) -> Received {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("no request within 5s")
            .expect("server stopped")
    }

    /// Next request of `method`, skipping others
    pub async fn next(&mut self, method: &str) -> Received {
        loop {
            let received = self.next_request().await;
            if received.method() == method {
                return received;
            }
        }
    }

    pub fn server_options(&self, timeout: Duration) -> ServerOptions {
        ServerOptions {
            protocol: TransportProtocol::Udp,
            id: SERVER_ID.to_string(),
            endpoint: self.endpoint.clone(),
            timeout,
            auto_reconnect: true,
        }
    }
}

pub fn client_options(keepalive_interval: u64) -> ClientOptions {
    ClientOptions {
        local: Endpoint::new("127.0.0.1", 0),
        user: UserOptions {
            name: USER.to_string(),
            domain: DOMAIN.to_string(),
            password: PASSWORD.to_string(),
            user_agent: "IP Camera".to_string(),
        },
        register: RegisterOptions {
            expires: 3600,
            keepalive_interval,
        },
    }
}

/// Value of the first `name:` header line in `text`
pub fn header_value(text: &str, name: &str) -> Option<String> {
    text.lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
}

/// Raw response mirroring the dialog headers of `received`
pub fn reply(received: &Received, status: &str, extra: &[&str], body: &str) -> String {
    let mut out = format!("SIP/2.0 {}\r\n", status);
    for name in ["Via", "From", "To", "Call-ID", "CSeq"] {
        if let Some(value) = received.header(name) {
            if name == "To" && !value.contains("tag=") && !status.starts_with("100") {
                out.push_str(&format!("To: {};tag=srv1\r\n", value));
            } else {
                out.push_str(&format!("{}: {}\r\n", name, value));
            }
        }
    }
    for line in extra {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
    out
}

/// REGISTER without credentials gets a challenge, with credentials a 200
pub fn register_responder(received: &Received) -> Option<String> {
    if received.method() != "REGISTER" {
        return None;
    }
    Some(match received.request.authorization() {
        None => reply(
            received,
            "401 Unauthorized",
            &[&format!(
                "WWW-Authenticate: Digest realm=\"{}\", nonce=\"{}\"",
                REALM, NONCE
            )],
            "",
        ),
        Some(_) => reply(received, "200 OK", &[], ""),
    })
}
