//! Application layer - device use cases on top of the SIP client

pub mod device_control;
pub mod notification;

pub use device_control::{DeviceController, PlayOptions, PlaySession};
pub use notification::NotificationHandler;
