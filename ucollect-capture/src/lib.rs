//! Opens one capture handle per (interface, direction), exposes a
//! selectable fd to the reactor, and tracks per-interface liveness via
//! [`Watchdog`].

mod error;
mod mock;
mod source;
mod watchdog;

pub use error::CaptureError;
pub use mock::MockCaptureSource;
pub use source::{
    CaptureSource, CaptureStats, PcapCaptureSource, DEFAULT_MAX_PACKETS_PER_CALL, DEFAULT_SNAPLEN,
    DEFAULT_TIMEOUT_MS,
};
pub use watchdog::{Watchdog, DEFAULT_MISSED_THRESHOLD, DEFAULT_WINDOW, ERROR_RETRY_DELAY};
