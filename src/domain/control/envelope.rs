//! DeviceControl XML envelope

use super::command::Command;
use rand::Rng;

/// MANSCDP body content type
pub const CONTENT_TYPE: &str = "Application/MANSCDP+xml";

/// Control priority written into every envelope
pub const CONTROL_PRIORITY: u8 = 5;

/// A `DeviceControl` request carrying a PTZ or iris/focus command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEnvelope {
    sn: u16,
    device_id: String,
    command: Command,
}

impl ControlEnvelope {
    /// Wrap a command with a random 15-bit sequence number
    pub fn new(device_id: &str, command: Command) -> Self {
        Self::with_sn(random_sn(), device_id, command)
    }

    pub fn with_sn(sn: u16, device_id: &str, command: Command) -> Self {
        Self {
            sn,
            device_id: device_id.to_string(),
            command,
        }
    }

    pub fn sn(&self) -> u16 {
        self.sn
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn to_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\"?>\r\n\
             <Control>\r\n\
             <CmdType>DeviceControl</CmdType>\r\n\
             <SN>{}</SN>\r\n\
             <DeviceID>{}</DeviceID>\r\n\
             <PTZCmd>{}</PTZCmd>\r\n\
             <Info>\r\n\
             <ControlPriority>{}</ControlPriority>\r\n\
             </Info>\r\n\
             </Control>\r\n",
            self.sn, self.device_id, self.command, CONTROL_PRIORITY
        )
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }
}

/// Sequence number in [0, i16::MAX)
fn random_sn() -> u16 {
    rand::thread_rng().gen_range(0..i16::MAX as u16)
}
