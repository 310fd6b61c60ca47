//! Connection manager: owns every serial link and its reader thread

use kiosk_core::{topics, ConnectionStatus, Device, DeviceKind, DeviceRegistry, EventBus, TelemetryKind};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::HardwareError;
use crate::link::{PortOpener, SerialLink};
use crate::reader::{Reader, ReaderMessage};

/// Timing and sizing knobs for serial links
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Wait after opening a port while the board resets
    pub settle: Duration,
    /// Blocking read timeout on the port
    pub read_timeout: Duration,
    /// Reader sleep between polls when no bytes are waiting
    pub poll_interval: Duration,
    /// Upper bound on waiting for a reader to exit on disconnect
    pub join_timeout: Duration,
    /// Pause between disconnect and reconnect on restart
    pub restart_pause: Duration,
    /// Telemetry queue capacity
    pub queue_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            read_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            join_timeout: Duration::from_secs(1),
            restart_pause: Duration::from_secs(1),
            queue_capacity: 1024,
        }
    }
}

/// Successful result of [`ConnectionManager::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// The device was already connected; nothing changed
    AlreadyConnected,
}

struct ActiveLink {
    writer: Box<dyn SerialLink>,
    cancel: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

pub struct ConnectionManager {
    registry: Arc<DeviceRegistry>,
    bus: Arc<EventBus>,
    opener: Arc<dyn PortOpener>,
    settings: LinkSettings,
    links: Mutex<HashMap<DeviceKind, ActiveLink>>,
    /// Serializes connect/disconnect so a device never gets two readers
    lifecycle: Mutex<()>,
    queue_tx: mpsc::Sender<ReaderMessage>,
    queue_rx: Mutex<mpsc::Receiver<ReaderMessage>>,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        bus: Arc<EventBus>,
        opener: Arc<dyn PortOpener>,
        settings: LinkSettings,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity.max(1));
        Self {
            registry,
            bus,
            opener,
            settings,
            links: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Snapshot of every device
    pub fn devices(&self) -> Vec<Device> {
        self.registry.devices()
    }

    /// Number of reader threads still running
    pub fn active_readers(&self) -> usize {
        self.links().values().filter(|l| !l.reader.is_finished()).count()
    }

    fn links(&self) -> MutexGuard<'_, HashMap<DeviceKind, ActiveLink>> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn known(&self, kind: DeviceKind) -> Result<Device, HardwareError> {
        self.registry.get(kind).ok_or_else(|| {
            warn!(device = %kind, "Unknown device");
            HardwareError::UnknownDevice(kind.to_string())
        })
    }

    /// Open the device's port and start its reader.
    ///
    /// Blocks for the settle delay. Calling this on a connected device is
    /// a no-op.
    pub fn connect(&self, kind: DeviceKind) -> Result<ConnectOutcome, HardwareError> {
        self.known(kind)?;
        let _guard = self.lock_lifecycle();

        let device = self.known(kind)?;
        if device.status == ConnectionStatus::Connected && self.links().contains_key(&kind) {
            debug!(device = %kind, "Already connected");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        // A reader that died on a read error leaves its link behind.
        let stale = self.links().remove(&kind);
        if let Some(stale) = stale {
            self.shutdown_link(kind, stale);
        }

        self.registry.set_status(kind, ConnectionStatus::Connecting);
        info!(
            device = %kind,
            port = %device.port,
            baud = device.baud_rate,
            "Connecting"
        );

        match self.open_link(&device) {
            Ok(link) => {
                self.links().insert(kind, link);
                info!(device = %kind, port = %device.port, "Device connected");
                self.bus.publish(
                    topics::DEVICE_CONNECTED,
                    json!({ "device": kind.as_str(), "port": device.port }),
                );
                Ok(ConnectOutcome::Connected)
            }
            Err(source) => {
                let message = source.to_string();
                self.registry.set_error(kind, message.clone());
                error!(device = %kind, port = %device.port, error = %message, "Connection failed");
                self.bus.publish(
                    topics::DEVICE_ERROR,
                    json!({ "device": kind.as_str(), "error": message }),
                );
                Err(HardwareError::PortUnavailable {
                    device: kind,
                    port: device.port,
                    source,
                })
            }
        }
    }

    fn open_link(&self, device: &Device) -> std::io::Result<ActiveLink> {
        let link = self
            .opener
            .open(&device.port, device.baud_rate, self.settings.read_timeout)?;
        if !self.settings.settle.is_zero() {
            thread::sleep(self.settings.settle);
        }
        let writer = link.try_clone_link()?;
        let cancel = Arc::new(AtomicBool::new(false));

        // Connected before the reader starts, so an immediate read error
        // is not overwritten.
        self.registry.set_status(device.kind, ConnectionStatus::Connected);
        let spawned = Reader {
            device: device.kind,
            link,
            registry: self.registry.clone(),
            queue: self.queue_tx.clone(),
            cancel: cancel.clone(),
            poll_interval: self.settings.poll_interval,
        }
        .spawn();

        match spawned {
            Ok(reader) => Ok(ActiveLink {
                writer,
                cancel,
                reader,
            }),
            Err(e) => {
                self.registry.set_status(device.kind, ConnectionStatus::Connecting);
                Err(e)
            }
        }
    }

    /// Try every configured device. Publishes `hardware:dev_mode_activated`
    /// when none could be connected.
    pub fn connect_all(&self) -> usize {
        let mut connected = 0;
        for kind in self.registry.kinds() {
            if self.connect(kind).is_ok() {
                connected += 1;
            }
        }

        if connected > 0 {
            info!(connected, total = self.registry.kinds().len(), "Hardware connected");
            self.bus.publish(
                topics::STATUS_CHANGED,
                json!({ "connected_count": connected, "dev_mode": false }),
            );
        } else {
            warn!("No hardware found, activating dev mode");
            self.bus.publish_empty(topics::DEV_MODE_ACTIVATED);
        }
        connected
    }

    /// Stop the device's reader and close its port. The status always ends
    /// up `Disconnected`.
    pub fn disconnect(&self, kind: DeviceKind) -> Result<(), HardwareError> {
        self.known(kind)?;
        let _guard = self.lock_lifecycle();

        let link = self.links().remove(&kind);
        if link.is_none() && self.registry.status(kind) == Some(ConnectionStatus::Disconnected) {
            return Ok(());
        }
        if let Some(link) = link {
            self.shutdown_link(kind, link);
        }

        self.registry.set_status(kind, ConnectionStatus::Disconnected);
        info!(device = %kind, "Device disconnected");
        self.bus
            .publish(topics::DEVICE_DISCONNECTED, json!({ "device": kind.as_str() }));
        Ok(())
    }

    pub fn disconnect_all(&self) {
        for kind in self.registry.kinds() {
            if let Err(e) = self.disconnect(kind) {
                warn!(device = %kind, error = %e, "Disconnect failed");
            }
        }
    }

    /// Disconnect everything, pause, and connect again
    pub fn restart_connections(&self) -> usize {
        info!("Restarting hardware connections");
        self.disconnect_all();
        thread::sleep(self.settings.restart_pause);
        self.connect_all()
    }

    fn shutdown_link(&self, kind: DeviceKind, link: ActiveLink) {
        let ActiveLink {
            writer,
            cancel,
            reader,
        } = link;
        cancel.store(true, Ordering::Release);
        drop(writer);

        let deadline = Instant::now() + self.settings.join_timeout;
        while !reader.is_finished() && Instant::now() < deadline {
            thread::sleep(self.settings.poll_interval.min(Duration::from_millis(10)));
        }
        if reader.is_finished() {
            if reader.join().is_err() {
                warn!(device = %kind, "Reader thread panicked");
            }
        } else {
            warn!(device = %kind, "Reader did not stop in time, detaching");
        }
    }

    /// Write a newline-terminated command to a connected device
    pub fn send(&self, kind: DeviceKind, command: &str) -> Result<(), HardwareError> {
        self.known(kind)?;
        if self.registry.status(kind) != Some(ConnectionStatus::Connected) {
            return Err(HardwareError::NotConnected(kind));
        }
        let mut links = self.links();
        let link = links.get_mut(&kind).ok_or(HardwareError::NotConnected(kind))?;

        let line = format!("{}\n", command);
        let result = link
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| link.writer.flush());
        match result {
            Ok(()) => {
                debug!(device = %kind, command, "Command sent");
                Ok(())
            }
            Err(source) => {
                error!(device = %kind, error = %source, "Failed to send command");
                Err(HardwareError::WriteFailed { device: kind, source })
            }
        }
    }

    /// Publish everything the readers queued since the last call. Never
    /// blocks; meant to run on the host loop tick.
    pub fn drain(&self) -> usize {
        let messages: Vec<ReaderMessage> = {
            let mut rx = self.queue_rx.lock().unwrap_or_else(|e| e.into_inner());
            let mut batch = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                batch.push(msg);
            }
            batch
        };

        for msg in &messages {
            match msg {
                ReaderMessage::Telemetry(item) => match item.kind {
                    TelemetryKind::Signal => self.bus.publish(
                        topics::SIGNAL_RECEIVED,
                        json!({ "device": item.device.as_str(), "signal_id": item.value }),
                    ),
                    TelemetryKind::ClientCount => self.bus.publish(
                        topics::CLIENTS_UPDATED,
                        json!({ "device": item.device.as_str(), "client_count": item.value }),
                    ),
                },
                ReaderMessage::ReadFailed { device, error } => {
                    let failure = HardwareError::ReadFailure {
                        device: *device,
                        message: error.clone(),
                    };
                    warn!(error = %failure, "Device dropped out");
                    self.bus.publish(
                        topics::DEVICE_ERROR,
                        json!({ "device": device.as_str(), "error": error }),
                    );
                }
            }
        }
        messages.len()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let links: Vec<_> = self.links().drain().collect();
        for (kind, link) in links {
            self.shutdown_link(kind, link);
        }
    }
}
