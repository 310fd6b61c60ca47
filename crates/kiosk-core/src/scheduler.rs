//! Demo scheduler: auto-advances slides when no hardware drives them
//!
//! The scheduler is owned by the host loop. It never spawns threads or
//! tasks; the host calls [`DemoScheduler::tick`] and the single pending
//! timer fires from there. Manual navigation re-arms the timer so it
//! resets the cadence instead of competing with it.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bus::{topics, EventBus};
use crate::timer::{OneShotTimer, PendingTimer, TimerToken};

/// Device name used for simulated signals in dev mode
pub const DEMO_DEVICE: &str = "demo";

/// Default time each slide stays up
pub const DEFAULT_INTERVAL_MS: u64 = 5000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemoError {
    #[error("demo is not running")]
    NotRunning,
    #[error("slide {id} out of range 1..={count}")]
    SlideOutOfRange { id: i64, count: u32 },
    #[error("interval must be greater than zero")]
    InvalidInterval,
}

/// Snapshot of scheduler state for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoStatus {
    pub running: bool,
    pub current_slide: u32,
    pub total_slides: u32,
    pub interval_ms: u64,
    pub loop_enabled: bool,
}

pub struct DemoScheduler {
    bus: Arc<EventBus>,
    slide_count: u32,
    running: bool,
    current_slide: u32,
    interval: Duration,
    loop_enabled: bool,
    dev_mode: bool,
    timer: OneShotTimer,
}

impl DemoScheduler {
    /// `slide_count` is clamped to at least one slide.
    pub fn new(bus: Arc<EventBus>, slide_count: u32, interval_ms: u64, loop_enabled: bool) -> Self {
        Self {
            bus,
            slide_count: slide_count.max(1),
            running: false,
            current_slide: 1,
            interval: Duration::from_millis(interval_ms.max(1)),
            loop_enabled,
            dev_mode: false,
            timer: OneShotTimer::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_slide(&self) -> u32 {
        self.current_slide
    }

    pub fn pending_timer(&self) -> Option<PendingTimer> {
        self.timer.pending()
    }

    pub fn status(&self) -> DemoStatus {
        DemoStatus {
            running: self.running,
            current_slide: self.current_slide,
            total_slides: self.slide_count,
            interval_ms: self.interval.as_millis() as u64,
            loop_enabled: self.loop_enabled,
        }
    }

    /// In dev mode every shown slide is echoed as a simulated hardware signal
    pub fn set_dev_mode(&mut self, enabled: bool) {
        self.dev_mode = enabled;
    }

    /// Start from slide 1. No-op if already running.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            warn!("Demo already running");
            return;
        }
        self.running = true;
        self.current_slide = 1;
        info!(interval_ms = self.interval.as_millis() as u64, "Demo started");
        self.bus.publish_empty(topics::DEMO_STARTED);
        self.show_current();
        self.arm(now);
    }

    /// Stop and cancel the pending timer. No-op if idle.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.timer.cancel();
        info!(slide = self.current_slide, "Demo stopped");
        self.bus.publish_empty(topics::DEMO_STOPPED);
    }

    /// Show slide `id` now and restart the cadence from it
    pub fn jump_to_slide(&mut self, id: i64, now: Instant) -> Result<(), DemoError> {
        if !self.running {
            warn!(slide = id, "Ignoring jump, demo not running");
            return Err(DemoError::NotRunning);
        }
        if id < 1 || id > i64::from(self.slide_count) {
            warn!(slide = id, count = self.slide_count, "Invalid slide id");
            return Err(DemoError::SlideOutOfRange {
                id,
                count: self.slide_count,
            });
        }
        self.timer.cancel();
        self.current_slide = id as u32;
        info!(slide = id, "Demo jumped to slide");
        self.show_current();
        self.arm(now);
        Ok(())
    }

    /// Manual step forward, wrapping to the first slide
    pub fn next_slide(&mut self, now: Instant) -> Result<(), DemoError> {
        let next = if self.current_slide >= self.slide_count {
            1
        } else {
            self.current_slide + 1
        };
        self.jump_to_slide(i64::from(next), now)
    }

    /// Manual step back, wrapping to the last slide
    pub fn previous_slide(&mut self, now: Instant) -> Result<(), DemoError> {
        let prev = if self.current_slide <= 1 {
            self.slide_count
        } else {
            self.current_slide - 1
        };
        self.jump_to_slide(i64::from(prev), now)
    }

    /// Takes effect from the next armed timer
    pub fn set_interval(&mut self, interval_ms: u64) -> Result<(), DemoError> {
        if interval_ms == 0 {
            warn!("Rejecting zero demo interval");
            return Err(DemoError::InvalidInterval);
        }
        self.interval = Duration::from_millis(interval_ms);
        debug!(interval_ms, "Demo interval updated");
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Fire the pending timer if it is due. Call on every host loop tick.
    pub fn tick(&mut self, now: Instant) {
        if let Some(token) = self.timer.due(now) {
            self.fire(token, now);
        }
    }

    /// Deliver a timer firing. Tokens that were cancelled or superseded are
    /// ignored, so a callback already queued before a jump or stop is inert.
    pub fn fire(&mut self, token: TimerToken, now: Instant) {
        if !self.timer.take_if_current(token) {
            debug!(?token, "Ignoring stale demo timer");
            return;
        }
        if !self.running {
            return;
        }
        self.advance(now);
    }

    fn advance(&mut self, now: Instant) {
        if self.current_slide >= self.slide_count {
            if !self.loop_enabled {
                info!("Reached last slide with looping disabled");
                self.stop();
                return;
            }
            self.current_slide = 1;
        } else {
            self.current_slide += 1;
        }
        self.show_current();
        self.arm(now);
    }

    fn show_current(&self) {
        debug!(slide = self.current_slide, "Demo showing slide");
        self.bus
            .publish(topics::SLIDE_CHANGE, json!({ "slide_id": self.current_slide }));
        if self.dev_mode {
            self.bus.publish(
                topics::SIGNAL_RECEIVED,
                json!({ "device": DEMO_DEVICE, "signal_id": self.current_slide }),
            );
        }
    }

    fn arm(&mut self, now: Instant) {
        if self.running {
            self.timer.arm(now, self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handler;
    use serde_json::Value;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<(String, Value)>>>;

    fn recording_bus() -> (Arc<EventBus>, Log) {
        let bus = Arc::new(EventBus::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        for topic in topics::ALL {
            let log = log.clone();
            bus.subscribe(
                topic,
                handler(move |payload| {
                    log.lock().unwrap().push((topic.to_string(), payload.clone()));
                    Ok(())
                }),
            );
        }
        (bus, log)
    }

    fn slide_changes(log: &Log) -> Vec<u64> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topics::SLIDE_CHANGE)
            .filter_map(|(_, p)| p["slide_id"].as_u64())
            .collect()
    }

    fn count(log: &Log, topic: &str) -> usize {
        log.lock().unwrap().iter().filter(|(t, _)| t == topic).count()
    }

    const INTERVAL: Duration = Duration::from_millis(DEFAULT_INTERVAL_MS);

    #[test]
    fn test_start_shows_first_slide_and_arms_timer() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);

        assert!(demo.is_running());
        assert_eq!(count(&log, topics::DEMO_STARTED), 1);
        assert_eq!(slide_changes(&log), vec![1]);
        assert_eq!(demo.pending_timer().unwrap().due, t0 + INTERVAL);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        let pending = demo.pending_timer();
        demo.start(t0 + Duration::from_millis(10));

        assert_eq!(count(&log, topics::DEMO_STARTED), 1);
        assert_eq!(slide_changes(&log), vec![1]);
        assert_eq!(demo.pending_timer(), pending);
    }

    #[test]
    fn test_jump_publishes_once_and_keeps_single_timer() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        let before = demo.pending_timer().unwrap();
        log.lock().unwrap().clear();

        let t1 = t0 + Duration::from_millis(1200);
        demo.jump_to_slide(5, t1).unwrap();

        assert_eq!(slide_changes(&log), vec![5]);
        let after = demo.pending_timer().unwrap();
        assert_ne!(after.token, before.token);
        assert_eq!(after.due, t1 + INTERVAL);

        // The superseded timer is inert even if delivered late.
        demo.fire(before.token, t1 + INTERVAL);
        assert_eq!(slide_changes(&log), vec![5]);
        assert_eq!(demo.current_slide(), 5);
        assert_eq!(demo.pending_timer(), Some(after));
    }

    #[test]
    fn test_jump_out_of_range_is_ignored() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        let pending = demo.pending_timer();
        log.lock().unwrap().clear();

        assert_eq!(
            demo.jump_to_slide(11, t0),
            Err(DemoError::SlideOutOfRange { id: 11, count: 10 })
        );
        assert!(demo.jump_to_slide(0, t0).is_err());
        assert_eq!(demo.current_slide(), 1);
        assert_eq!(demo.pending_timer(), pending);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_jump_while_idle_is_rejected() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        assert_eq!(demo.jump_to_slide(3, Instant::now()), Err(DemoError::NotRunning));
        assert!(log.lock().unwrap().is_empty());
        assert!(demo.pending_timer().is_none());
    }

    #[test]
    fn test_looping_wraps_after_last_slide() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let mut now = Instant::now();
        demo.start(now);
        for _ in 0..10 {
            now += INTERVAL;
            demo.tick(now);
        }
        assert_eq!(demo.current_slide(), 1);
        assert!(demo.is_running());
        assert_eq!(slide_changes(&log), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 1]);
    }

    #[test]
    fn test_no_loop_stops_at_end() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, false);
        let mut now = Instant::now();
        demo.start(now);
        for _ in 0..9 {
            now += INTERVAL;
            demo.tick(now);
        }
        assert_eq!(demo.current_slide(), 10);
        assert!(demo.is_running());
        assert_eq!(count(&log, topics::DEMO_STOPPED), 0);

        now += INTERVAL;
        demo.tick(now);
        assert!(!demo.is_running());
        assert_eq!(count(&log, topics::DEMO_STOPPED), 1);
        assert!(demo.pending_timer().is_none());
        assert_eq!(slide_changes(&log).len(), 10);
    }

    #[test]
    fn test_tick_before_deadline_does_nothing() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        demo.tick(t0 + INTERVAL - Duration::from_millis(1));
        assert_eq!(slide_changes(&log), vec![1]);
    }

    #[test]
    fn test_stop_cancels_timer_and_is_idempotent() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        let token = demo.pending_timer().unwrap().token;
        demo.stop();
        demo.stop();

        assert_eq!(count(&log, topics::DEMO_STOPPED), 1);
        assert!(demo.pending_timer().is_none());
        demo.fire(token, t0 + INTERVAL);
        demo.tick(t0 + INTERVAL * 3);
        assert_eq!(slide_changes(&log), vec![1]);
    }

    #[test]
    fn test_manual_navigation_wraps() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 3, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        demo.previous_slide(t0).unwrap();
        assert_eq!(demo.current_slide(), 3);
        demo.next_slide(t0).unwrap();
        assert_eq!(demo.current_slide(), 1);
        assert_eq!(slide_changes(&log), vec![1, 3, 1]);
    }

    #[test]
    fn test_interval_change_applies_to_next_timer() {
        let (bus, _log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        let t0 = Instant::now();
        demo.start(t0);
        assert_eq!(demo.set_interval(0), Err(DemoError::InvalidInterval));
        demo.set_interval(2500).unwrap();
        assert_eq!(demo.pending_timer().unwrap().due, t0 + INTERVAL);

        demo.tick(t0 + INTERVAL);
        assert_eq!(
            demo.pending_timer().unwrap().due,
            t0 + INTERVAL + Duration::from_millis(2500)
        );
        assert_eq!(demo.status().interval_ms, 2500);
    }

    #[test]
    fn test_dev_mode_echoes_simulated_signal() {
        let (bus, log) = recording_bus();
        let mut demo = DemoScheduler::new(bus, 10, DEFAULT_INTERVAL_MS, true);
        demo.set_dev_mode(true);
        demo.start(Instant::now());

        let log = log.lock().unwrap();
        let signal = log
            .iter()
            .find(|(t, _)| t == topics::SIGNAL_RECEIVED)
            .map(|(_, p)| p.clone())
            .unwrap();
        assert_eq!(signal["device"], DEMO_DEVICE);
        assert_eq!(signal["signal_id"], 1);
    }
}
