//! Device-control codec
//!
//! Pure builders for the GB28181 control plane: binary PTZ / iris-focus
//! frames, the `DeviceControl` envelope that carries them, stream SSRCs, and
//! the MANSCDP bodies devices answer with. No shared state.

pub mod command;
pub mod envelope;
pub mod notification;
pub mod ssrc;

pub use command::{
    Command, FiConfig, FiFocusParam, FiIrisParam, PtzConfig, PtzRotateParam, PtzZoomParam,
};
pub use envelope::{ControlEnvelope, CONTENT_TYPE};
pub use notification::Notification;
pub use ssrc::Ssrc;
