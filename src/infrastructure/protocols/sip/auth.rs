//! SIP Digest Authentication (RFC 2617), client side

use super::message::SipError;
use tracing::debug;

/// The parts of a `WWW-Authenticate` challenge a GB28181 REGISTER needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
}

/// Text between `key="` and the next quote
fn quoted_param<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("{}=\"", key);
    let start = header.find(&marker)? + marker.len();
    let len = header[start..].find('"')?;
    Some(&header[start..start + len])
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate` value. Both `realm` and `nonce` must be
    /// present and quoted.
    pub fn parse(header: &str) -> Result<Self, SipError> {
        let realm = quoted_param(header, "realm").ok_or_else(|| {
            SipError::AuthChallengeParse(format!("no quoted realm in {:?}", header))
        })?;
        let nonce = quoted_param(header, "nonce").ok_or_else(|| {
            SipError::AuthChallengeParse(format!("no quoted nonce in {:?}", header))
        })?;

        Ok(Self {
            realm: realm.to_string(),
            nonce: nonce.to_string(),
        })
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// MD5(MD5(user:realm:password):nonce:MD5(method:uri))
pub fn calculate_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    // HA1 = MD5(username:realm:password)
    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));

    // HA2 = MD5(method:uri)
    let ha2 = md5_hex(&format!("{}:{}", method, uri));

    md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
}

/// Credentials for one SIP user
#[derive(Debug, Clone)]
pub struct DigestCredentials {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl DigestCredentials {
    pub fn new(username: &str, password: &str, domain: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
        }
    }

    pub fn uri(&self) -> String {
        format!("sip:{}@{}", self.username, self.domain)
    }

    /// `Authorization` header value answering `challenge`. Field order and
    /// quoting are fixed; some servers parse the header positionally.
    pub fn authorize(&self, challenge: &AuthChallenge, method: &str) -> String {
        let uri = self.uri();
        let response = calculate_response(
            &self.username,
            &self.password,
            &challenge.realm,
            &challenge.nonce,
            method,
            &uri,
        );
        debug!("Calculated digest response for {}", self.username);

        format!(
            r#"Digest username="{}",realm="{}",nonce="{}",uri="{}",response="{}",algorithm=MD5"#,
            self.username, challenge.realm, challenge.nonce, uri, response
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge() {
        let challenge =
            AuthChallenge::parse(r#"Digest realm="example.com", nonce="abc123""#).unwrap();
        assert_eq!(challenge.realm, "example.com");
        assert_eq!(challenge.nonce, "abc123");
    }

    #[test]
    fn test_parse_challenge_with_extra_params() {
        let challenge = AuthChallenge::parse(
            r#"Digest realm="3402000000",qop="auth",nonce="9bd055",algorithm=MD5"#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "3402000000");
        assert_eq!(challenge.nonce, "9bd055");
    }

    #[test]
    fn test_malformed_challenge_is_an_error() {
        assert!(matches!(
            AuthChallenge::parse(r#"Digest nonce="abc123""#),
            Err(SipError::AuthChallengeParse(_))
        ));
        assert!(matches!(
            AuthChallenge::parse(r#"Digest realm="example.com", nonce="abc"#),
            Err(SipError::AuthChallengeParse(_))
        ));
        assert!(AuthChallenge::parse("").is_err());
    }

    #[test]
    fn test_calculate_response_rfc2617() {
        // RFC 2617 section 3.5 example, without qop
        let ha1 = md5_hex("Mufasa:testrealm@host.com:Circle Of Life");
        assert_eq!(ha1, "939e7578ed9e3c518a452acee763bce9");

        let response = calculate_response(
            "Mufasa",
            "Circle Of Life",
            "testrealm@host.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "GET",
            "/dir/index.html",
        );
        assert_eq!(response.len(), 32);
        assert_eq!(
            response,
            md5_hex(&format!(
                "{}:{}:{}",
                ha1,
                "dcd98b7102dd2f0e8b11d0f600bfb0c093",
                md5_hex("GET:/dir/index.html")
            ))
        );
    }

    #[test]
    fn test_authorization_layout() {
        let creds = DigestCredentials::new("34020000001320000001", "12345678", "3402000000");
        let challenge = AuthChallenge {
            realm: "example.com".to_string(),
            nonce: "abc123".to_string(),
        };
        let header = creds.authorize(&challenge, "REGISTER");

        let expected_response = calculate_response(
            "34020000001320000001",
            "12345678",
            "example.com",
            "abc123",
            "REGISTER",
            "sip:34020000001320000001@3402000000",
        );
        assert_eq!(
            header,
            format!(
                r#"Digest username="34020000001320000001",realm="example.com",nonce="abc123",uri="sip:34020000001320000001@3402000000",response="{}",algorithm=MD5"#,
                expected_response
            )
        );
    }
}
