//! Re-armable periodic ticker.
//!
//! Background tasks whose period comes from configuration (the staleness
//! sweeper and the weather poller) keep one [`Ticker`] for their lifetime and
//! re-arm it when a reload changes the period, instead of rebuilding timers
//! inside the loop body.

use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Shortest period a ticker accepts; smaller values are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

/// A periodic ticker whose period can change at runtime.
///
/// The first tick completes immediately. Missed ticks are delayed, not
/// bursted, so a slow tick never triggers a catch-up storm.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    interval: Interval,
}

impl Ticker {
    /// Create a ticker that fires now and then every `period`.
    pub fn new(period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        Self {
            period,
            interval: build(Instant::now(), period),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    /// Change the period.
    ///
    /// When the period actually changes the ticker is re-armed: the next
    /// tick fires one new period from now. Returns whether it was re-armed.
    pub fn set_period(&mut self, period: Duration) -> bool {
        let period = period.max(MIN_PERIOD);
        if period == self.period {
            return false;
        }
        self.period = period;
        self.interval = build(Instant::now() + period, period);
        true
    }

    /// Make the next tick fire immediately, keeping the period.
    pub fn fire_now(&mut self) {
        self.interval.reset_immediately();
    }
}

fn build(start: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
