//! Source of "now" for query windows.

use chrono::{DateTime, FixedOffset, Local};
use fit_history_client::TimeWindow;

pub trait Clock: Send + Sync + 'static {
    /// Window covering the last `lookback_days` local days up to now.
    fn window(&self, lookback_days: u32) -> TimeWindow;
}

/// Wall clock in the system's local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn window(&self, lookback_days: u32) -> TimeWindow {
        TimeWindow::last_days(&Local::now(), lookback_days)
    }
}

/// A clock stopped at one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn window(&self, lookback_days: u32) -> TimeWindow {
        TimeWindow::last_days(&self.0, lookback_days)
    }
}
