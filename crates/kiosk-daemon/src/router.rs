//! Bus subscribers wiring hardware events to the rest of the daemon

use anyhow::{anyhow, Context};
use kiosk_core::{handler, topics, DEMO_DEVICE};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::host::HostCommand;
use crate::state::{AppState, BusEvent};

/// Register the daemon's bus subscribers. Handlers hold a weak reference
/// so the bus does not keep the state alive.
pub fn install(state: &Arc<AppState>) {
    let bus = &state.bus;

    // Forwarders first, so clients see an event before anything it causes.
    for topic in topics::ALL {
        let weak = Arc::downgrade(state);
        bus.subscribe(
            topic,
            handler(move |payload| {
                debug!(topic, %payload, "Bus event");
                let state = upgrade(&weak)?;
                // No receivers just means no WebSocket client is attached.
                let _ = state.events.send(BusEvent {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                });
                Ok(())
            }),
        );
    }

    let weak = Arc::downgrade(state);
    bus.subscribe(
        topics::SIGNAL_RECEIVED,
        handler(move |payload| {
            let state = upgrade(&weak)?;
            on_signal(&state, payload)
        }),
    );

    let weak = Arc::downgrade(state);
    bus.subscribe(
        topics::SLIDE_CHANGE,
        handler(move |payload| {
            let state = upgrade(&weak)?;
            let slide = field_i64(payload, "slide_id")?;
            let slide = u32::try_from(slide).context("slide_id out of range")?;
            state.current_slide.store(slide, Ordering::Relaxed);
            Ok(())
        }),
    );

    let weak = Arc::downgrade(state);
    bus.subscribe(
        topics::DEV_MODE_ACTIVATED,
        handler(move |_| {
            let state = upgrade(&weak)?;
            match state.commands.try_send(HostCommand::EnterDevMode) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(command)) => {
                    warn!("Host command queue full, deferring dev mode");
                    let handle = Handle::try_current()
                        .map_err(|_| anyhow!("host command queue full, dev mode not entered"))?;
                    let commands = state.commands.clone();
                    handle.spawn(async move {
                        if commands.send(command).await.is_err() {
                            warn!("Host loop stopped before dev mode was entered");
                        }
                    });
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(anyhow!("host loop stopped")),
            }
        }),
    );
}

fn upgrade(weak: &Weak<AppState>) -> anyhow::Result<Arc<AppState>> {
    weak.upgrade().ok_or_else(|| anyhow!("application state dropped"))
}

fn field_i64(payload: &Value, key: &str) -> anyhow::Result<i64> {
    payload
        .get(key)
        .and_then(Value::as_i64)
        .with_context(|| format!("payload missing integer {}", key))
}

/// Record the signal and, for real hardware, show the matching slide
fn on_signal(state: &AppState, payload: &Value) -> anyhow::Result<()> {
    let signal = field_i64(payload, "signal_id")?;
    let device = payload
        .get("device")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let name = u32::try_from(signal)
        .ok()
        .and_then(|id| state.catalog.name(id));
    state
        .history
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(signal, name, device);

    // The scheduler already announced its own slide.
    if device == DEMO_DEVICE {
        return Ok(());
    }
    if !state.catalog.contains(signal) {
        warn!(device, signal, "Signal has no matching slide");
        return Ok(());
    }
    info!(device, signal, "Hardware signal selects slide");
    state
        .bus
        .publish(topics::SLIDE_CHANGE, json!({ "slide_id": signal }));
    Ok(())
}
