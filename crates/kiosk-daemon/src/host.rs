//! Cooperative host loop
//!
//! A single tokio task owns the demo scheduler. On every tick it drains the
//! reader queue onto the bus and lets the scheduler fire its timer. Other
//! tasks reach the scheduler through [`HostCommand`]s.

use anyhow::Result;
use kiosk_core::{DemoError, DemoScheduler, DemoStatus};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub type Reply = oneshot::Sender<Result<DemoStatus, DemoError>>;

/// Scheduler operations exposed to the UI adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoCommand {
    Start,
    Stop,
    Jump(i64),
    Next,
    Previous,
    Settings {
        interval_ms: Option<u64>,
        loop_enabled: Option<bool>,
    },
    Status,
}

#[derive(Debug)]
pub enum HostCommand {
    Demo(DemoCommand, Reply),
    /// No hardware answered; simulate signals from the scheduler
    EnterDevMode,
}

/// Send a command to the host loop and wait for its answer
pub async fn request(state: &AppState, command: DemoCommand) -> Result<DemoStatus, HostError> {
    let (tx, rx) = oneshot::channel();
    state
        .commands
        .send(HostCommand::Demo(command, tx))
        .await
        .map_err(|_| HostError::Stopped)?;
    let status = rx.await.map_err(|_| HostError::Stopped)??;
    Ok(status)
}

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("host loop is not running")]
    Stopped,
    #[error(transparent)]
    Demo(#[from] DemoError),
}

pub struct Host {
    state: Arc<AppState>,
    scheduler: DemoScheduler,
    commands: mpsc::Receiver<HostCommand>,
}

impl Host {
    pub fn new(state: Arc<AppState>, commands: mpsc::Receiver<HostCommand>) -> Self {
        let demo = &state.config.demo;
        let scheduler = DemoScheduler::new(
            state.bus.clone(),
            state.catalog.count(),
            demo.interval_ms,
            demo.loop_enabled,
        );
        Self {
            state,
            scheduler,
            commands,
        }
    }

    #[cfg(test)]
    fn scheduler(&self) -> &DemoScheduler {
        &self.scheduler
    }

    /// One host iteration: publish queued telemetry, then fire a due timer
    pub fn tick(&mut self, now: Instant) {
        let drained = self.state.manager.drain();
        if drained > 0 {
            debug!(drained, "Published queued telemetry");
        }
        self.scheduler.tick(now);
    }

    pub fn handle(&mut self, command: HostCommand, now: Instant) {
        match command {
            HostCommand::Demo(cmd, reply) => {
                let result = self.apply(cmd, now);
                // The requester may have given up waiting.
                let _ = reply.send(result);
            }
            HostCommand::EnterDevMode => self.enter_dev_mode(now),
        }
    }

    fn apply(&mut self, command: DemoCommand, now: Instant) -> Result<DemoStatus, DemoError> {
        match command {
            DemoCommand::Start => self.scheduler.start(now),
            DemoCommand::Stop => self.scheduler.stop(),
            DemoCommand::Jump(id) => self.scheduler.jump_to_slide(id, now)?,
            DemoCommand::Next => self.scheduler.next_slide(now)?,
            DemoCommand::Previous => self.scheduler.previous_slide(now)?,
            DemoCommand::Settings {
                interval_ms,
                loop_enabled,
            } => {
                if let Some(ms) = interval_ms {
                    self.scheduler.set_interval(ms)?;
                }
                if let Some(enabled) = loop_enabled {
                    self.scheduler.set_loop(enabled);
                }
            }
            DemoCommand::Status => {}
        }
        Ok(self.scheduler.status())
    }

    fn enter_dev_mode(&mut self, now: Instant) {
        if self.state.dev_mode.swap(true, Ordering::Relaxed) {
            debug!("Dev mode already active");
            return;
        }
        info!("Dev mode active, demo signals are simulated");
        self.scheduler.set_dev_mode(true);
        if self.state.config.demo.auto_start_in_dev_mode {
            self.scheduler.start(now);
        }
    }

    /// Run until `shutdown` resolves, then stop the demo and release all
    /// hardware.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.state.config.daemon.tick_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(tick_ms = self.state.config.daemon.tick_ms, "Host loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Instant::now()),
                Some(command) = self.commands.recv() => self.handle(command, Instant::now()),
                _ = &mut shutdown => break,
            }
        }

        info!("Shutting down");
        self.scheduler.stop();
        let manager = self.state.manager.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || manager.disconnect_all()).await {
            warn!(error = %e, "Disconnect task failed");
        }
        self.state.manager.drain();
        Ok(())
    }
}
