//! ALRM-based stuck-plugin watchdog: the reactor rearms a ~60s alarm at
//! the start of every iteration and disarms it before returning to wait
//! for the next one. If the alarm ever actually fires, a plugin callback
//! (or the reactor itself) has been stuck in unsafe-to-interrupt code for
//! far longer than one iteration should ever take. Distinct from
//! `ucollect_capture::Watchdog`, which detects a silently dead interface
//! over a multi-minute window rather than a single wedged iteration.

use std::time::Duration;

/// Default rearm interval (spec.md §4.5: "~60s watchdog around each
/// reactor wait").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Abstracts `libc::alarm`/`setitimer` so the rearm/disarm protocol is
/// testable without depending on real OS timer delivery.
pub trait AlarmClock {
    /// Arm (or rearm) the alarm to fire after `timeout`. Returns the
    /// number of seconds remaining on any previously armed alarm, as
    /// `libc::alarm` does.
    fn arm(&mut self, timeout: Duration) -> u32;
    /// Disarm the alarm entirely.
    fn disarm(&mut self);
}

/// Real `libc::alarm`-backed clock. Second-granularity, matching the
/// original's own `alarm(2)` use.
pub struct SystemAlarmClock;

impl AlarmClock for SystemAlarmClock {
    fn arm(&mut self, timeout: Duration) -> u32 {
        let secs = timeout.as_secs().max(1) as u32;
        unsafe { libc::alarm(secs) }
    }

    fn disarm(&mut self) {
        unsafe {
            libc::alarm(0);
        }
    }
}

/// Rearms an [`AlarmClock`] at the start of each reactor iteration and
/// disarms it once the iteration completes cleanly. If the process is
/// ever killed by `SIGALRM` it means an iteration ran longer than
/// `timeout` without returning here.
pub struct IterationWatchdog<C: AlarmClock> {
    clock: C,
    timeout: Duration,
}

impl<C: AlarmClock> IterationWatchdog<C> {
    pub fn new(clock: C, timeout: Duration) -> Self {
        IterationWatchdog { clock, timeout }
    }

    pub fn begin_iteration(&mut self) {
        self.clock.arm(self.timeout);
    }

    pub fn end_iteration(&mut self) {
        self.clock.disarm();
    }
}

impl IterationWatchdog<SystemAlarmClock> {
    pub fn system(timeout: Duration) -> Self {
        IterationWatchdog::new(SystemAlarmClock, timeout)
    }
}
