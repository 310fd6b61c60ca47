//! Per-device reader thread
//!
//! One reader runs for each connected board. It polls the port, splits the
//! byte stream into lines, decodes them and pushes tagged telemetry onto
//! the shared queue. It never touches the event bus.

use kiosk_core::{decode_line, DeviceKind, DeviceRegistry, LineSplitter, TelemetryItem, TelemetryKind};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, trace, warn};

use crate::link::SerialLink;

const READ_CHUNK: usize = 256;

/// What reader threads hand to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderMessage {
    Telemetry(TelemetryItem),
    /// The reader hit an I/O error and exited
    ReadFailed { device: DeviceKind, error: String },
}

pub(crate) struct Reader {
    pub device: DeviceKind,
    pub link: Box<dyn SerialLink>,
    pub registry: Arc<DeviceRegistry>,
    pub queue: mpsc::Sender<ReaderMessage>,
    pub cancel: Arc<AtomicBool>,
    pub poll_interval: Duration,
}

impl Reader {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("reader-{}", self.device))
            .spawn(move || self.run())
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn run(mut self) {
        debug!(device = %self.device, "Reader started");
        let mut splitter = LineSplitter::default();
        let mut buf = [0u8; READ_CHUNK];

        while !self.cancelled() {
            let available = match self.link.bytes_to_read() {
                Ok(n) => n as usize,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            };
            if available == 0 {
                thread::sleep(self.poll_interval);
                continue;
            }

            let want = available.min(buf.len());
            match self.link.read(&mut buf[..want]) {
                Ok(0) => thread::sleep(self.poll_interval),
                Ok(n) => {
                    for line in splitter.push(&buf[..n]) {
                        if !self.handle_line(&line) {
                            debug!(device = %self.device, "Reader stopped");
                            return;
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) => {}
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }
        debug!(device = %self.device, "Reader stopped");
    }

    /// Returns `false` once the reader should exit
    fn handle_line(&self, line: &str) -> bool {
        let Some(reading) = decode_line(line) else {
            trace!(device = %self.device, line, "Ignoring line");
            return true;
        };

        self.registry.update(self.device, |d| {
            match reading.kind {
                TelemetryKind::Signal => d.last_signal = Some(reading.value),
                TelemetryKind::ClientCount => {
                    d.client_count = u32::try_from(reading.value).unwrap_or(d.client_count)
                }
            }
            d.touch();
        });

        trace!(device = %self.device, kind = ?reading.kind, value = reading.value, "Telemetry");
        self.enqueue(ReaderMessage::Telemetry(reading.tag(self.device)))
    }

    fn fail(&self, e: io::Error) {
        if self.cancelled() {
            debug!(device = %self.device, error = %e, "Read error during shutdown");
            return;
        }
        error!(device = %self.device, error = %e, "Read failed, closing reader");
        self.registry.set_error(self.device, e.to_string());
        self.enqueue(ReaderMessage::ReadFailed {
            device: self.device,
            error: e.to_string(),
        });
    }

    /// Push onto the queue, waiting while it is full. Gives up when
    /// cancelled or when the consumer is gone.
    fn enqueue(&self, msg: ReaderMessage) -> bool {
        let mut msg = msg;
        let mut warned = false;
        loop {
            match self.queue.try_send(msg) {
                Ok(()) => return true,
                Err(TrySendError::Full(m)) => {
                    if self.cancelled() {
                        return false;
                    }
                    if !warned {
                        warn!(device = %self.device, "Telemetry queue full, waiting for consumer");
                        warned = true;
                    }
                    thread::sleep(self.poll_interval);
                    msg = m;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(device = %self.device, "Telemetry queue closed");
                    return false;
                }
            }
        }
    }
}
