//! Kiosk Core - Core types, event bus and slide scheduling
//!
//! This crate provides the hardware-independent pieces of the kiosk:
//! - Device model and the registry describing every serial board
//! - Line protocol decoder for board telemetry
//! - Topic-keyed event bus connecting producers and presentation layers
//! - Slide catalog and signal history
//! - Demo scheduler that auto-advances slides without hardware

pub mod bus;
pub mod device;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod slide;
pub mod timer;

pub use bus::{handler, topics, EventBus, Handler};
pub use device::{ConnectionStatus, Device, DeviceKind, UnknownDeviceKind, DEFAULT_BAUD_RATE};
pub use history::{SignalHistory, SignalRecord, HISTORY_CAPACITY};
pub use protocol::{decode_line, LineSplitter, Reading, TelemetryItem, TelemetryKind};
pub use registry::DeviceRegistry;
pub use scheduler::{DemoError, DemoScheduler, DemoStatus, DEFAULT_INTERVAL_MS, DEMO_DEVICE};
pub use slide::{CatalogError, SlideCatalog, SlideInfo};
pub use timer::{OneShotTimer, PendingTimer, TimerToken};
