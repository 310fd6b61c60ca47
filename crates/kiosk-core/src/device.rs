//! Device types for the serial boards attached to the kiosk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Default baud rate used by every board firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Identity of a hardware endpoint. Each kind exists at most once, so the
/// kind doubles as the device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Main ESP32 driving the presentation
    #[serde(alias = "esp32_1")]
    Esp32Primary,
    /// First add-on ESP32
    #[serde(rename = "esp32_addon_2", alias = "esp32_2")]
    Esp32Addon2,
    /// Second add-on ESP32
    #[serde(rename = "esp32_addon_3", alias = "esp32_3")]
    Esp32Addon3,
    /// Arduino-class controller board
    #[serde(alias = "giga")]
    ControllerBoard,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::Esp32Primary,
        DeviceKind::Esp32Addon2,
        DeviceKind::Esp32Addon3,
        DeviceKind::ControllerBoard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Esp32Primary => "esp32_primary",
            Self::Esp32Addon2 => "esp32_addon_2",
            Self::Esp32Addon3 => "esp32_addon_3",
            Self::ControllerBoard => "controller_board",
        }
    }

    /// Name shown on status panels
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Esp32Primary => "ESP32.1 (Main)",
            Self::Esp32Addon2 => "ESP32.2 (Addon)",
            Self::Esp32Addon3 => "ESP32.3 (Addon)",
            Self::ControllerBoard => "Controller Board",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown device: {0}")]
pub struct UnknownDeviceKind(pub String);

impl FromStr for DeviceKind {
    type Err = UnknownDeviceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "esp32_primary" | "esp32_1" => Ok(Self::Esp32Primary),
            "esp32_addon_2" | "esp32_2" => Ok(Self::Esp32Addon2),
            "esp32_addon_3" | "esp32_3" => Ok(Self::Esp32Addon3),
            "controller_board" | "giga" => Ok(Self::ControllerBoard),
            other => Err(UnknownDeviceKind(other.to_string())),
        }
    }
}

/// Connection state of a serial device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No open link
    Disconnected,
    /// Port is being opened
    Connecting,
    /// Link open and a reader is running
    Connected,
    /// Open or read failed; needs an explicit reconnect
    Error,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// A serial board known to the kiosk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Device identity
    pub kind: DeviceKind,
    /// Human-readable name
    pub display_name: String,
    /// Platform port path (e.g. `/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Current connection status
    pub status: ConnectionStatus,
    /// Most recent slide id reported by the board
    pub last_signal: Option<i64>,
    /// Number of downstream viewers the board reports
    pub client_count: u32,
    /// Last failure cause, empty while healthy
    pub error_message: String,
    /// When the board last produced a recognized line
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Create a disconnected device
    pub fn new(kind: DeviceKind, port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            kind,
            display_name: kind.display_name().to_string(),
            port: port.into(),
            baud_rate,
            status: ConnectionStatus::Disconnected,
            last_signal: None,
            client_count: 0,
            error_message: String::new(),
            last_seen: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Update the last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Some(Utc::now());
    }
}
