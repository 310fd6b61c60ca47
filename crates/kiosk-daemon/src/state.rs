//! Application state management

use anyhow::Result;
use kiosk_core::{Device, DeviceKind, DeviceRegistry, EventBus, SignalHistory, SignalRecord, SlideCatalog};
use kiosk_serial::{ConnectionManager, PortOpener};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::host::HostCommand;

/// One bus event as forwarded to WebSocket clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
}

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub bus: Arc<EventBus>,
    pub manager: Arc<ConnectionManager>,
    pub catalog: SlideCatalog,
    /// Recent hardware and simulated signals
    pub history: Mutex<SignalHistory>,
    /// Last slide announced on `slide:change`
    pub current_slide: AtomicU32,
    pub dev_mode: AtomicBool,
    /// Scheduler commands for the host loop
    pub commands: mpsc::Sender<HostCommand>,
    /// Event broadcast for WebSocket clients
    pub events: broadcast::Sender<BusEvent>,
}

impl AppState {
    /// Build state and the receiving end of the host command channel
    pub fn new(
        config: Config,
        opener: Arc<dyn PortOpener>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<HostCommand>)> {
        let catalog = config.slide_catalog()?;
        let registry = Arc::new(DeviceRegistry::new(config.to_devices()));
        let bus = Arc::new(EventBus::new());
        let manager = Arc::new(ConnectionManager::new(
            registry,
            bus.clone(),
            opener,
            config.to_link_settings(),
        ));

        let (commands, command_rx) = mpsc::channel(32);
        let (events, _) = broadcast::channel(100);

        let state = Arc::new(Self {
            config,
            bus,
            manager,
            catalog,
            history: Mutex::new(SignalHistory::new()),
            current_slide: AtomicU32::new(1),
            dev_mode: AtomicBool::new(false),
            commands,
            events,
        });
        Ok((state, command_rx))
    }

    /// Subscribe to bus events
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.manager.devices()
    }

    /// Look a device up by its serialized name or a legacy alias
    pub fn get_device(&self, id: &str) -> Option<Device> {
        let kind: DeviceKind = id.parse().ok()?;
        self.manager.registry().get(kind)
    }

    pub fn history(&self) -> Vec<SignalRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries()
    }

    pub fn current_slide(&self) -> u32 {
        self.current_slide.load(Ordering::Relaxed)
    }

    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode.load(Ordering::Relaxed)
    }
}
