//! Per-test study timer.
//!
//! Elapsed time is recomputed from wall-clock deltas on every tick rather than
//! counted, so a late or skipped tick never loses time.

use thiserror::Error;

use crate::model::{Test, TimerMode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    #[error("timer minutes must not be negative (got {0})")]
    NegativeMinutes(i64),
}

/// What one tick did to the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer is stopped; nothing changed.
    Idle,
    /// Seconds were added (count-up) or counted down.
    Advanced { delta: i64 },
    /// The countdown reached zero on this tick and the timer stopped.
    Expired { delta: i64 },
}

/// Sets mode, limit and session goal.
///
/// Positive minutes select a countdown of that length, zero selects count-up.
/// A running timer keeps running.
///
/// # Errors
///
/// Returns `TimerError::NegativeMinutes` without touching the test.
pub fn configure(test: &mut Test, minutes: i64, session_goal: u32) -> Result<(), TimerError> {
    if minutes < 0 {
        return Err(TimerError::NegativeMinutes(minutes));
    }
    if minutes > 0 {
        test.timer_mode = TimerMode::CountDown;
        test.timer_limit = minutes * 60;
    } else {
        test.timer_mode = TimerMode::CountUp;
        test.timer_limit = 0;
    }
    test.session_goal = session_goal;
    Ok(())
}

/// Starts the timer at `now_millis`. Returns false if it was already running.
pub fn start(test: &mut Test, now_millis: i64) -> bool {
    if test.timer_running {
        return false;
    }
    test.timer_running = true;
    test.last_update = now_millis;
    true
}

/// Stops the timer. Returns false if it was not running.
pub fn stop(test: &mut Test) -> bool {
    std::mem::replace(&mut test.timer_running, false)
}

/// Folds the wall-clock time since the last update into the test.
pub fn tick(test: &mut Test, now_millis: i64) -> TickOutcome {
    if !test.timer_running {
        return TickOutcome::Idle;
    }

    let delta = rounded_seconds(now_millis - test.last_update);
    test.last_update = now_millis;
    test.time_spent += delta;

    match test.timer_mode {
        TimerMode::CountUp => TickOutcome::Advanced { delta },
        TimerMode::CountDown => {
            test.timer_limit -= delta;
            if test.timer_limit <= 0 {
                test.timer_limit = 0;
                test.timer_running = false;
                TickOutcome::Expired { delta }
            } else {
                TickOutcome::Advanced { delta }
            }
        }
    }
}

/// Seconds shown on the clock: remaining for a countdown, spent otherwise.
#[must_use]
pub fn display_seconds(test: &Test) -> i64 {
    match test.timer_mode {
        TimerMode::CountUp => test.time_spent,
        TimerMode::CountDown => test.timer_limit,
    }
}

/// `HH:MM:SS`, with a leading `-` for negative input.
#[must_use]
pub fn format_time(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let s = seconds.unsigned_abs();
    format!("{sign}{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

fn rounded_seconds(millis: i64) -> i64 {
    // clock went backwards: count nothing
    if millis <= 0 {
        return 0;
    }
    (millis + 500) / 1000
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
