use std::time::Duration;

/// Window between liveness checks (spec default: 10 minutes).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);
/// Consecutive silent windows before we give up on an interface.
pub const DEFAULT_MISSED_THRESHOLD: u32 = 5;
/// Delay before retrying a reconfiguration that itself failed.
pub const ERROR_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Per-(interface, direction) liveness tracker.
///
/// The reactor arms a repeating timer at `window()` and calls `tick()` on
/// fire; `mark_received` is called from the capture dispatch path whenever
/// at least one packet came through. An interface that silently stops
/// producing packets (common when a link goes down without an error, e.g.
/// an unplugged cable on some drivers) is caught here rather than by
/// waiting for a read error that may never arrive.
pub struct Watchdog {
    window: Duration,
    missed_threshold: u32,
    received: bool,
    missed: u32,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_WINDOW, DEFAULT_MISSED_THRESHOLD)
    }

    pub fn with_params(window: Duration, missed_threshold: u32) -> Self {
        Watchdog {
            window,
            missed_threshold,
            received: false,
            missed: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn mark_received(&mut self) {
        self.received = true;
    }

    /// Advance one window. Returns `true` once `missed_threshold`
    /// consecutive silent windows have elapsed — the caller should request
    /// a full reconfiguration and then construct a fresh `Watchdog`.
    pub fn tick(&mut self) -> bool {
        if self.received {
            self.missed = 0;
        } else {
            self.missed = self.missed.saturating_add(1);
        }
        self.received = false;
        self.missed >= self.missed_threshold
    }

    pub fn missed_windows(&self) -> u32 {
        self.missed
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}
