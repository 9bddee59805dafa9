//! REGISTER with Digest challenge
//!
//! One exchange is two requests: an unauthenticated REGISTER that the server
//! answers with a `401` challenge, then the same REGISTER with a fresh
//! Call-ID, the next CSeq and an `Authorization` header.

use super::auth::{AuthChallenge, DigestCredentials};
use super::builder::RequestBuilder;
use super::client::{Registrar, SipClient};
use super::message::{SipError, SipResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

const UNAUTHORIZED: u16 = 401;

/// Default [`Registrar`]: Digest-authenticated REGISTER
#[derive(Debug)]
pub struct DigestRegistrar {
    cseq: AtomicU32,
}

impl DigestRegistrar {
    pub fn new() -> Self {
        Self {
            cseq: AtomicU32::new(1),
        }
    }
}

impl Default for DigestRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the challenge from the answer to an unauthenticated REGISTER
fn challenge_of(response: &SipResponse) -> Result<AuthChallenge, SipError> {
    let status = response.status_code();
    if status != UNAUTHORIZED {
        return Err(SipError::AuthChallengeParse(format!(
            "expected {} challenge, server answered {}",
            UNAUTHORIZED, status
        )));
    }

    let header = response.www_authenticate().ok_or_else(|| {
        SipError::AuthChallengeParse("401 without WWW-Authenticate".to_string())
    })?;
    AuthChallenge::parse(&header)
}

#[async_trait]
impl Registrar for DigestRegistrar {
    async fn register(&self, client: &SipClient) -> Result<(), SipError> {
        let seq = self.cseq.fetch_add(2, Ordering::SeqCst);
        let local = client.local_endpoint().await?;
        let builder = RequestBuilder::register(client.server(), client.options(), local).cseq(seq);

        let first = client
            .send_for_response(builder.build()?)
            .await?
            .into_response()?;
        if first.is_success() {
            info!("Registered without challenge");
            return Ok(());
        }

        let challenge = challenge_of(&first)?;
        debug!("Challenged by realm {}", challenge.realm);

        let user = &client.options().user;
        let credentials = DigestCredentials::new(&user.name, &user.password, &user.domain);
        let authorization = credentials.authorize(&challenge, "REGISTER");

        let request = builder
            .renew_call_id()
            .cseq(seq.wrapping_add(1))
            .authorization(authorization)
            .build()?;
        let response = client.send_for_response(request).await?.into_response()?;

        let status = response.status_code();
        if !response.is_success() {
            return Err(SipError::Authentication(format!(
                "server rejected credentials for {} with {}",
                user.name, status
            )));
        }

        info!("Registered as {} in realm {}", user.name, challenge.realm);
        Ok(())
    }
}
