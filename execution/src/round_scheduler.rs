//! Round timing for crash tables.
//!
//! A round cycles through three phases:
//! 1. **Idle** - Bets accepted, countdown to the next round
//! 2. **Flying** - Multiplier grows until it reaches the crash point
//! 3. **Crashed** - Results shown for a short pause before the next countdown
//!
//! ## Wall Clock
//!
//! The multiplier is a pure function of elapsed wall-clock time,
//! `m(t) = e^(k * t)`, recomputed from `now - started_at` on every tick. Time enters only
//! through [`Clock`] so tests can drive it by hand.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crashpad_execution::round_scheduler::{PhaseConfig, ScheduledTransition, Transition};
//!
//! let config = PhaseConfig::default();
//! let mut timer = ScheduledTransition::default();
//!
//! // Schedule the first round after the idle countdown.
//! timer.schedule(Transition::StartRound, now_ms + config.idle_ms);
//!
//! // Each tick, fire the timer once it is due.
//! if let Some(Transition::StartRound) = timer.due(later_ms) {
//!     // draw crash point, start flying
//! }
//! let m = config.multiplier_at(later_ms - started_at_ms);
//! ```

use crashpad_types::casino::{Multiplier, RoundPhase};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default countdown between rounds.
pub const DEFAULT_IDLE_MS: u64 = 12_000;

/// Default pause on the crash screen.
pub const DEFAULT_CRASH_DISPLAY_MS: u64 = 3_000;

/// Default growth constant `k` (per second).
pub const DEFAULT_GROWTH_PER_SEC: f64 = 0.15;

/// Phase configuration with durations in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseConfig {
    /// Countdown before a round takes off.
    pub idle_ms: u64,
    /// Pause after a crash before the next countdown.
    pub crash_display_ms: u64,
    /// Growth constant `k` of `m(t) = e^(k * t)`, per second.
    pub growth_per_sec: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            idle_ms: DEFAULT_IDLE_MS,
            crash_display_ms: DEFAULT_CRASH_DISPLAY_MS,
            growth_per_sec: DEFAULT_GROWTH_PER_SEC,
        }
    }
}

impl PhaseConfig {
    pub fn new(idle_ms: u64, crash_display_ms: u64, growth_per_sec: f64) -> Self {
        Self {
            idle_ms,
            crash_display_ms,
            growth_per_sec,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.idle_ms == 0 {
            return Err("idle_ms must be greater than zero");
        }
        if self.crash_display_ms == 0 {
            return Err("crash_display_ms must be greater than zero");
        }
        if !self.growth_per_sec.is_finite() || self.growth_per_sec <= 0.0 {
            return Err("growth_per_sec must be a positive number");
        }
        Ok(())
    }

    /// Timed phases only; a flight lasts until the crash point.
    pub fn duration_for_phase(&self, phase: RoundPhase) -> Option<u64> {
        match phase {
            RoundPhase::Idle => Some(self.idle_ms),
            RoundPhase::Flying => None,
            RoundPhase::Crashed => Some(self.crash_display_ms),
        }
    }

    /// Multiplier after `elapsed_ms` of flight, truncated to hundredths.
    pub fn multiplier_at(&self, elapsed_ms: u64) -> Multiplier {
        let t = elapsed_ms as f64 / 1_000.0;
        Multiplier::floor_f64((self.growth_per_sec * t).exp())
    }

    /// Flight time needed to reach `multiplier` (inverse of [`Self::multiplier_at`]).
    pub fn elapsed_for(&self, multiplier: Multiplier) -> u64 {
        let seconds = multiplier.as_f64().ln() / self.growth_per_sec;
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * 1_000.0).ceil() as u64
    }
}

/// Source of wall-clock time in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Phase transitions driven by the timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Idle -> Flying
    StartRound,
    /// Crashed -> Idle
    ReturnToIdle,
}

/// Single-slot transition timer. Scheduling replaces whatever was pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduledTransition {
    slot: Option<(Transition, u64)>,
}

impl ScheduledTransition {
    /// Schedules `transition` at `at_ms`, returning the timer it replaced.
    pub fn schedule(&mut self, transition: Transition, at_ms: u64) -> Option<(Transition, u64)> {
        self.slot.replace((transition, at_ms))
    }

    pub fn cancel(&mut self) -> Option<(Transition, u64)> {
        self.slot.take()
    }

    pub fn peek(&self) -> Option<(Transition, u64)> {
        self.slot
    }

    /// Fires the pending transition if it is due, clearing the slot.
    pub fn due(&mut self, now_ms: u64) -> Option<Transition> {
        match self.slot {
            Some((transition, at_ms)) if now_ms >= at_ms => {
                self.slot = None;
                Some(transition)
            }
            _ => None,
        }
    }
}
