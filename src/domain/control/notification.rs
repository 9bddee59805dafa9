//! Inbound MANSCDP bodies (Keepalive notifies, control responses, ...)

use crate::domain::shared::{DomainError, Result};
use serde::Deserialize;

/// The common fields of a MANSCDP message. The root element name
/// (`Notify`, `Response`, `Query`) is not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    #[serde(default)]
    pub cmd_type: String,
    #[serde(rename = "SN", default)]
    pub sn: u32,
    #[serde(rename = "DeviceID", default)]
    pub device_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

impl Notification {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| DomainError::ParseError(format!("MANSCDP body is not UTF-8: {}", e)))?;

        quick_xml::de::from_str(text)
            .map_err(|e| DomainError::ParseError(format!("Invalid MANSCDP body: {}", e)))
    }

    pub fn is_keepalive(&self) -> bool {
        self.cmd_type.eq_ignore_ascii_case("Keepalive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keepalive() {
        let body = br#"<?xml version="1.0"?>
<Notify>
<CmdType>Keepalive</CmdType>
<SN>43</SN>
<DeviceID>34020000001320000001</DeviceID>
<Status>OK</Status>
</Notify>"#;

        let n = Notification::parse(body).unwrap();
        assert!(n.is_keepalive());
        assert_eq!(n.sn, 43);
        assert_eq!(n.device_id, "34020000001320000001");
        assert_eq!(n.status.as_deref(), Some("OK"));
        assert_eq!(n.result, None);
    }

    #[test]
    fn test_parse_control_response() {
        let body = br#"<Response><CmdType>DeviceControl</CmdType><SN>7</SN><DeviceID>34020000001320000001</DeviceID><Result>OK</Result></Response>"#;

        let n = Notification::parse(body).unwrap();
        assert_eq!(n.cmd_type, "DeviceControl");
        assert_eq!(n.result.as_deref(), Some("OK"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            Notification::parse(b"<Notify><SN>abc</SN></Notify>"),
            Err(DomainError::ParseError(_))
        ));
        assert!(Notification::parse(&[0xff, 0xfe]).is_err());
    }
}
