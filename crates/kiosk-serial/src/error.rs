use kiosk_core::{DeviceKind, UnknownDeviceKind};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("{device}: port {port} unavailable: {source}")]
    PortUnavailable {
        device: DeviceKind,
        port: String,
        #[source]
        source: io::Error,
    },
    #[error("{device}: read failed: {message}")]
    ReadFailure { device: DeviceKind, message: String },
    #[error("{0} is not connected")]
    NotConnected(DeviceKind),
    #[error("{device}: write failed: {source}")]
    WriteFailed {
        device: DeviceKind,
        #[source]
        source: io::Error,
    },
}

impl From<UnknownDeviceKind> for HardwareError {
    fn from(e: UnknownDeviceKind) -> Self {
        Self::UnknownDevice(e.0)
    }
}
