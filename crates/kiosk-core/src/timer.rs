//! Single-slot, cancellable one-shot timer driven by the host loop tick

use std::time::{Duration, Instant};

/// Handle identifying one armed timer. Tokens are never reused, so a token
/// that is no longer pending can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub token: TimerToken,
    pub due: Instant,
}

/// At most one pending deadline; arming again replaces it.
#[derive(Debug, Default)]
pub struct OneShotTimer {
    next_token: u64,
    pending: Option<PendingTimer>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer `delay` after `now`, cancelling any pending one
    pub fn arm(&mut self, now: Instant, delay: Duration) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.pending = Some(PendingTimer {
            token,
            due: now + delay,
        });
        token
    }

    /// Cancel the pending timer, returning its token
    pub fn cancel(&mut self) -> Option<TimerToken> {
        self.pending.take().map(|p| p.token)
    }

    pub fn pending(&self) -> Option<PendingTimer> {
        self.pending
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.pending.is_some_and(|p| p.token == token)
    }

    /// Token of the pending timer if its deadline has passed
    pub fn due(&self, now: Instant) -> Option<TimerToken> {
        self.pending.filter(|p| p.due <= now).map(|p| p.token)
    }

    /// Consume the pending timer if `token` is still the current one.
    /// Returns `false` for stale or cancelled tokens.
    pub fn take_if_current(&mut self, token: TimerToken) -> bool {
        if self.is_pending(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}
