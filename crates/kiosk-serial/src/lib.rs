//! Kiosk Serial - Serial links and the connection manager
//!
//! This crate owns the hardware side of the kiosk: one reader thread per
//! connected board, a bounded queue funnelling decoded telemetry to a
//! single consumer, and the connection manager that drives the device
//! registry through its connection states.

pub mod error;
pub mod link;
pub mod manager;
pub mod reader;

pub use error::HardwareError;
pub use link::{available_ports, PortOpener, SerialLink, SystemPortOpener};
pub use manager::{ConnectOutcome, ConnectionManager, LinkSettings};
pub use reader::ReaderMessage;
