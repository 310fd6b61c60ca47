//! Line protocol spoken by the boards
//!
//! Boards emit newline-delimited ASCII. Two line shapes carry data:
//!
//! ```text
//! SIGNAL:<int>     slide id to display
//! Clients:<int>    number of downstream viewers on that board
//! ```
//!
//! Everything else (boot banners, debug prints) is ignored.

use serde::{Deserialize, Serialize};

use crate::device::DeviceKind;

const SIGNAL_KEYWORD: &str = "SIGNAL";
const CLIENTS_KEYWORD: &str = "Clients";

/// What a telemetry value means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    Signal,
    ClientCount,
}

/// A decoded line, not yet attributed to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub kind: TelemetryKind,
    pub value: i64,
}

impl Reading {
    /// Attribute this reading to the device it was read from
    pub fn tag(self, device: DeviceKind) -> TelemetryItem {
        TelemetryItem {
            kind: self.kind,
            device,
            value: self.value,
        }
    }
}

/// A reading tagged with its source device, as passed from reader threads
/// to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryItem {
    pub kind: TelemetryKind,
    pub device: DeviceKind,
    pub value: i64,
}

/// Decode one line of board output.
///
/// Returns `None` for anything that is not a well-formed `SIGNAL:` or
/// `Clients:` line. Client counts must fit a `u32`.
pub fn decode_line(line: &str) -> Option<Reading> {
    let (keyword, value) = line.trim().split_once(':')?;
    let kind = match keyword.trim_end() {
        SIGNAL_KEYWORD => TelemetryKind::Signal,
        CLIENTS_KEYWORD => TelemetryKind::ClientCount,
        _ => return None,
    };
    let value = value.trim().parse::<i64>().ok()?;
    if kind == TelemetryKind::ClientCount && u32::try_from(value).is_err() {
        return None;
    }
    Some(Reading { kind, value })
}

/// Splits a byte stream into lines.
///
/// Lines end at `\n`; a trailing `\r` is stripped. A line that grows past
/// `max_line` bytes without a terminator is discarded up to the next
/// newline.
#[derive(Debug)]
pub struct LineSplitter {
    buf: Vec<u8>,
    max_line: usize,
    overflowed: bool,
}

impl LineSplitter {
    pub const DEFAULT_MAX_LINE: usize = 1024;

    pub fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::with_capacity(128),
            max_line,
            overflowed: false,
        }
    }

    /// Feed bytes, returning every line completed by them. Lines that are
    /// not valid UTF-8 are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                if !self.overflowed {
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                    if let Ok(line) = std::str::from_utf8(&self.buf) {
                        lines.push(line.to_string());
                    }
                }
                self.buf.clear();
                self.overflowed = false;
            } else if self.overflowed {
                continue;
            } else if self.buf.len() >= self.max_line {
                self.buf.clear();
                self.overflowed = true;
            } else {
                self.buf.push(b);
            }
        }
        lines
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_LINE)
    }
}
