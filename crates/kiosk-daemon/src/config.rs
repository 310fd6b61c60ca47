//! Configuration loading and validation

use anyhow::Result;
use kiosk_core::{Device, DeviceKind, SlideCatalog, SlideInfo, DEFAULT_BAUD_RATE, DEFAULT_INTERVAL_MS};
use kiosk_serial::LinkSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("device {0} configured more than once")]
    DuplicateDevice(DeviceKind),
    #[error("invalid slide list: {0}")]
    Slides(#[from] kiosk_core::CatalogError),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default = "default_devices", rename = "device")]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub demo: DemoConfig,
    #[serde(default = "default_slides", rename = "slide")]
    pub slides: Vec<SlideInfo>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            hardware: HardwareConfig::default(),
            devices: default_devices(),
            demo: DemoConfig::default(),
            slides: default_slides(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the UI adapter
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Host loop tick in milliseconds (queue drain and demo timer)
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tick_ms: default_tick(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tick() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Wait after opening a port for the board to reset
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle(),
            read_timeout_ms: default_read_timeout(),
            poll_interval_ms: default_poll_interval(),
            join_timeout_ms: default_join_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_settle() -> u64 {
    2000 // ESP32 boards reset when DTR toggles
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    10
}

fn default_join_timeout() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_devices() -> Vec<DeviceConfig> {
    [
        (DeviceKind::Esp32Primary, "/dev/ttyUSB0"),
        (DeviceKind::Esp32Addon2, "/dev/ttyUSB1"),
        (DeviceKind::Esp32Addon3, "/dev/ttyUSB2"),
        (DeviceKind::ControllerBoard, "/dev/ttyACM0"),
    ]
    .into_iter()
    .map(|(kind, port)| DeviceConfig {
        kind,
        port: port.to_string(),
        baud_rate: DEFAULT_BAUD_RATE,
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Time each slide stays up
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_true")]
    pub loop_enabled: bool,
    /// Start the demo automatically when no hardware is found
    #[serde(default = "default_true")]
    pub auto_start_in_dev_mode: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            loop_enabled: true,
            auto_start_in_dev_mode: true,
        }
    }
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_slides() -> Vec<SlideInfo> {
    SlideCatalog::standard().slides().to_vec()
}

impl Config {
    /// Check values the core would otherwise reject at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.tick_ms == 0 {
            return Err(ConfigError::Zero("daemon.tick_ms"));
        }
        if self.hardware.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("hardware.poll_interval_ms"));
        }
        if self.hardware.queue_capacity == 0 {
            return Err(ConfigError::Zero("hardware.queue_capacity"));
        }
        if self.demo.interval_ms == 0 {
            return Err(ConfigError::Zero("demo.interval_ms"));
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.kind) {
                return Err(ConfigError::DuplicateDevice(device.kind));
            }
        }
        self.slide_catalog()?;
        Ok(())
    }

    pub fn slide_catalog(&self) -> Result<SlideCatalog, ConfigError> {
        Ok(SlideCatalog::new(self.slides.clone())?)
    }

    /// Registry entries for the configured devices
    pub fn to_devices(&self) -> Vec<Device> {
        self.devices
            .iter()
            .map(|d| Device::new(d.kind, d.port.clone(), d.baud_rate))
            .collect()
    }

    pub fn to_link_settings(&self) -> LinkSettings {
        LinkSettings {
            settle: Duration::from_millis(self.hardware.settle_ms),
            read_timeout: Duration::from_millis(self.hardware.read_timeout_ms),
            poll_interval: Duration::from_millis(self.hardware.poll_interval_ms),
            join_timeout: Duration::from_millis(self.hardware.join_timeout_ms),
            queue_capacity: self.hardware.queue_capacity,
            ..LinkSettings::default()
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };
    config.validate()?;
    Ok(config)
}
