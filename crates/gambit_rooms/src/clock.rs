//! Dual countdown clock with increment.
//!
//! The stored remaining time of the active color is only written when a
//! turn ends ([`GameClock::switch`], [`GameClock::stop`]) or the clock is
//! paused. Everything else ([`GameClock::remaining`], snapshots, tick
//! broadcasts) computes a live value from the turn start without mutating
//! anything, so broadcast cadence cannot accumulate rounding error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::color::{ByColor, Color};
use crate::error::ClockError;
use crate::time::TimeSource;

/// Live view of both clocks, as broadcast in `timerUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    pub active_color: Option<Color>,
}

/// Per-room chess clock.
#[derive(Debug, Clone)]
pub struct GameClock {
    remaining: ByColor<u64>,
    base_ms: u64,
    increment_ms: u64,
    active: Option<Color>,
    turn_started_at: Option<u64>,
    time: Arc<dyn TimeSource>,
}

impl GameClock {
    pub fn new(base_ms: u64, increment_ms: u64, time: Arc<dyn TimeSource>) -> Self {
        Self {
            remaining: ByColor::new(base_ms, base_ms),
            base_ms,
            increment_ms,
            active: None,
            turn_started_at: None,
            time,
        }
    }

    pub fn base_ms(&self) -> u64 {
        self.base_ms
    }

    pub fn increment_ms(&self) -> u64 {
        self.increment_ms
    }

    pub fn active(&self) -> Option<Color> {
        self.active
    }

    /// True while a turn timer is counting down.
    pub fn is_running(&self) -> bool {
        self.active.is_some() && self.turn_started_at.is_some()
    }

    /// True when a color is on turn but its timer is suspended.
    pub fn is_paused(&self) -> bool {
        self.active.is_some() && self.turn_started_at.is_none()
    }

    /// Resets both sides to a new time control. Only meaningful before the
    /// clock has started.
    pub fn reset(&mut self, base_ms: u64, increment_ms: u64) {
        self.remaining = ByColor::new(base_ms, base_ms);
        self.base_ms = base_ms;
        self.increment_ms = increment_ms;
        self.active = None;
        self.turn_started_at = None;
    }

    /// Starts counting down for `color`.
    pub fn start(&mut self, color: Color) {
        self.active = Some(color);
        self.turn_started_at = Some(self.time.now_ms());
    }

    /// Remaining time for `color`, including the running turn if `color`
    /// is on turn. Never negative.
    pub fn remaining(&self, color: Color) -> u64 {
        let stored = *self.remaining.get(color);
        match (self.active, self.turn_started_at) {
            (Some(active), Some(started)) if active == color => {
                stored.saturating_sub(self.time.now_ms().saturating_sub(started))
            }
            _ => stored,
        }
    }

    /// Ends the mover's turn: deducts elapsed time, credits the increment
    /// to the mover and starts the opponent's timer.
    pub fn switch(&mut self) -> Result<Color, ClockError> {
        let mover = self.active.ok_or(ClockError::NoActiveColor)?;
        if self.turn_started_at.is_none() {
            return Err(ClockError::Paused);
        }
        self.settle_turn(mover, true);
        let next = mover.opposite();
        self.active = Some(next);
        self.turn_started_at = Some(self.time.now_ms());
        Ok(next)
    }

    /// Stops the clock for good. With `credit_increment`, the color on turn
    /// (the player who just made the final move) gets its increment once.
    pub fn stop(&mut self, credit_increment: bool) {
        if let Some(color) = self.active {
            self.settle_turn(color, credit_increment);
        }
        self.active = None;
        self.turn_started_at = None;
    }

    /// Suspends the running turn, keeping the turn with the active color.
    pub fn pause(&mut self) {
        if let (Some(color), Some(_)) = (self.active, self.turn_started_at) {
            self.settle_turn(color, false);
            self.turn_started_at = None;
        }
    }

    /// Resumes a paused turn with a fresh turn start.
    pub fn resume(&mut self) -> Result<(), ClockError> {
        if self.active.is_none() {
            return Err(ClockError::NoActiveColor);
        }
        if self.turn_started_at.is_none() {
            self.turn_started_at = Some(self.time.now_ms());
        }
        Ok(())
    }

    /// The active color if its live remaining time has reached zero.
    pub fn flagged(&self) -> Option<Color> {
        if !self.is_running() {
            return None;
        }
        self.active.filter(|color| self.remaining(*color) == 0)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            white_remaining_ms: self.remaining(Color::White),
            black_remaining_ms: self.remaining(Color::Black),
            active_color: self.active,
        }
    }

    fn settle_turn(&mut self, color: Color, credit_increment: bool) {
        let left = self.remaining(color);
        let credit = if credit_increment { self.increment_ms } else { 0 };
        *self.remaining.get_mut(color) = left + credit;
        if self.turn_started_at.is_some() {
            self.turn_started_at = Some(self.time.now_ms());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeSource;

    fn clock(base: u64, inc: u64) -> (GameClock, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(10_000));
        (GameClock::new(base, inc, time.clone()), time)
    }

    #[test]
    fn switch_deducts_elapsed_and_credits_mover() {
        let (mut clock, time) = clock(60_000, 2_000);
        clock.start(Color::White);
        time.advance(5_000);
        assert_eq!(clock.switch().unwrap(), Color::Black);
        assert_eq!(clock.remaining(Color::White), 57_000);
        assert_eq!(clock.remaining(Color::Black), 60_000);

        time.advance(1_500);
        assert_eq!(clock.remaining(Color::Black), 58_500);
        clock.switch().unwrap();
        assert_eq!(clock.remaining(Color::Black), 60_500);
    }

    #[test]
    fn switch_clamps_before_adding_increment() {
        let (mut clock, time) = clock(1_000, 3_000);
        clock.start(Color::White);
        time.advance(4_000);
        clock.switch().unwrap();
        assert_eq!(clock.remaining(Color::White), 3_000);
    }

    #[test]
    fn ticks_do_not_mutate_stored_time() {
        let (mut clock, time) = clock(10_000, 0);
        clock.start(Color::White);
        for _ in 0..10 {
            time.advance(100);
            let _ = clock.snapshot();
        }
        assert_eq!(clock.remaining(Color::White), 9_000);
        clock.switch().unwrap();
        assert_eq!(clock.remaining(Color::White), 9_000);
    }

    #[test]
    fn switch_without_active_color_is_an_error() {
        let (mut clock, _) = clock(10_000, 0);
        assert_eq!(clock.switch(), Err(ClockError::NoActiveColor));
    }

    #[test]
    fn pause_preserves_time_across_the_gap() {
        let (mut clock, time) = clock(30_000, 0);
        clock.start(Color::White);
        time.advance(4_000);
        clock.pause();
        assert!(clock.is_paused());
        time.advance(20_000);
        assert_eq!(clock.remaining(Color::White), 26_000);
        assert_eq!(clock.flagged(), None);
        clock.resume().unwrap();
        time.advance(1_000);
        assert_eq!(clock.remaining(Color::White), 25_000);
        assert_eq!(clock.active(), Some(Color::White));
    }

    #[test]
    fn flag_falls_at_zero() {
        let (mut clock, time) = clock(1_000, 0);
        clock.start(Color::White);
        time.advance(999);
        assert_eq!(clock.flagged(), None);
        time.advance(1);
        assert_eq!(clock.flagged(), Some(Color::White));
    }

    #[test]
    fn stop_credits_final_mover_once() {
        let (mut clock, time) = clock(10_000, 500);
        clock.start(Color::White);
        time.advance(2_000);
        clock.stop(true);
        assert!(!clock.is_running());
        assert_eq!(clock.remaining(Color::White), 8_500);
        assert_eq!(clock.remaining(Color::Black), 10_000);
        time.advance(50_000);
        assert_eq!(clock.snapshot().white_remaining_ms, 8_500);
    }
}
