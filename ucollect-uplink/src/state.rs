//! Connection lifecycle, reconnect backoff, login-failure lockout and the
//! per-second connection-attempt rate limit. All pure/time-parameterized so
//! it can be driven by tests without a real clock.

use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ConnectionState {
    #[default]
    NotStarted,
    Sent,
    Authenticated,
    Failed,
}

const RECONNECT_BASE: Duration = Duration::from_secs(2);
const RECONNECT_MAX: Duration = Duration::from_secs(5 * 60);
const RECONNECT_MULTIPLY: u32 = 2;
/// Forced backoff after the server explicitly rejects our login (`F`).
const RECONNECT_AUTH_FAILURE: Duration = Duration::from_secs(10 * 60);

/// Exponential reconnect backoff: 2s, 4s, 8s, ... capped at 5 minutes, with
/// a distinct 10-minute penalty when the previous attempt was explicitly
/// rejected rather than merely failing to connect.
pub struct ReconnectBackoff {
    /// `None` means no delay has been handed out yet, so the next one is
    /// the un-doubled base. `Some` holds the delay last returned.
    current: Option<Duration>,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        ReconnectBackoff { current: None }
    }

    /// Delay before the *next* connection attempt, given how the previous
    /// one ended.
    pub fn next_delay(&mut self, previous_state: ConnectionState) -> Duration {
        if previous_state == ConnectionState::Failed {
            return RECONNECT_AUTH_FAILURE;
        }
        let delay = match self.current {
            None => RECONNECT_BASE,
            Some(prev) => (prev * RECONNECT_MULTIPLY).min(RECONNECT_MAX),
        };
        self.current = Some(delay);
        delay
    }

    /// A session that reached `Authenticated` and saw real data resets the
    /// backoff to its base value on its *next* successful connection.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}

pub const LOGIN_FAILURE_LIMIT: u32 = 10;

/// Tracks consecutive login failures. Once the limit is reached, the
/// process is expected to abort entirely (spec.md §4.9) rather than keep
/// retrying a credential that will never work.
#[derive(Default)]
pub struct LoginFailureTracker {
    count: u32,
}

impl LoginFailureTracker {
    pub fn new() -> Self {
        LoginFailureTracker { count: 0 }
    }

    /// Record one more failure; returns `true` once the hard limit has been
    /// reached (caller should abort the process).
    pub fn record_failure(&mut self) -> bool {
        self.count += 1;
        self.count >= LOGIN_FAILURE_LIMIT
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

const MIN_ATTEMPT_INTERVAL: Duration = Duration::from_secs(1);

/// Caps connection attempts to at most one per second, independent of the
/// backoff delay (which can legitimately be shorter right after a reset).
pub struct AttemptRateLimiter {
    last_attempt: Option<Duration>,
}

impl AttemptRateLimiter {
    pub fn new() -> Self {
        AttemptRateLimiter { last_attempt: None }
    }

    /// `now` is a monotonic timestamp (e.g. milliseconds since some epoch).
    /// Returns whether a new attempt is allowed right now; if so, records
    /// `now` as the most recent attempt.
    pub fn allow(&mut self, now: Duration) -> bool {
        if let Some(last) = self.last_attempt {
            if now.saturating_sub(last) < MIN_ATTEMPT_INTERVAL {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }
}

impl Default for AttemptRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Socat (the original's transport helper) won't try both address
/// families itself, so the original alternates `pf=ip4`/`pf=ip6` on every
/// connection attempt rather than picking one — whichever family is
/// actually unreachable just fails every other attempt, which is accepted
/// as good enough (see ticket #3106 in the original). `AddressFamilyAlternator`
/// reproduces that toggle as a pure value the reactor consults before
/// dialing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddressFamily {
    V4,
    V6,
}

pub struct AddressFamilyAlternator {
    next: AddressFamily,
}

impl AddressFamilyAlternator {
    /// The original's `last_ipv6` starts false, so the very first attempt
    /// is IPv4.
    pub fn new() -> Self {
        AddressFamilyAlternator { next: AddressFamily::V4 }
    }

    /// Returns the family to use for the next attempt, then flips it for
    /// the one after.
    pub fn next_family(&mut self) -> AddressFamily {
        let family = self.next;
        self.next = match family {
            AddressFamily::V4 => AddressFamily::V6,
            AddressFamily::V6 => AddressFamily::V4,
        };
        family
    }
}

impl Default for AddressFamilyAlternator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_family_alternates_starting_with_v4() {
        let mut a = AddressFamilyAlternator::new();
        assert_eq!(a.next_family(), AddressFamily::V4);
        assert_eq!(a.next_family(), AddressFamily::V6);
        assert_eq!(a.next_family(), AddressFamily::V4);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut b = ReconnectBackoff::new();
        assert_eq!(b.next_delay(ConnectionState::NotStarted), Duration::from_secs(2));
        assert_eq!(b.next_delay(ConnectionState::NotStarted), Duration::from_secs(4));
        assert_eq!(b.next_delay(ConnectionState::NotStarted), Duration::from_secs(8));
        for _ in 0..10 {
            b.next_delay(ConnectionState::NotStarted);
        }
        assert_eq!(b.next_delay(ConnectionState::NotStarted), RECONNECT_MAX);
    }

    #[test]
    fn explicit_rejection_forces_the_ten_minute_penalty_regardless_of_backoff_state() {
        let mut b = ReconnectBackoff::new();
        assert_eq!(b.next_delay(ConnectionState::Failed), RECONNECT_AUTH_FAILURE);
    }

    #[test]
    fn reset_returns_to_base_delay() {
        let mut b = ReconnectBackoff::new();
        b.next_delay(ConnectionState::NotStarted);
        b.next_delay(ConnectionState::NotStarted);
        b.reset();
        assert_eq!(b.next_delay(ConnectionState::NotStarted), Duration::from_secs(2));
    }

    #[test]
    fn login_failures_trip_the_hard_limit_at_ten() {
        let mut t = LoginFailureTracker::new();
        for _ in 0..9 {
            assert!(!t.record_failure());
        }
        assert!(t.record_failure());
        assert_eq!(t.count(), 10);
    }

    #[test]
    fn login_failure_tracker_resets_on_success() {
        let mut t = LoginFailureTracker::new();
        t.record_failure();
        t.record_failure();
        t.reset();
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn rate_limiter_rejects_a_second_attempt_within_one_second() {
        let mut r = AttemptRateLimiter::new();
        assert!(r.allow(Duration::from_millis(0)));
        assert!(!r.allow(Duration::from_millis(500)));
        assert!(r.allow(Duration::from_millis(1000)));
    }
}
