//! The reactor crate: the single-threaded process loop that owns the
//! plugin table, capture sources, fd table, timer heap and uplink
//! connection, and bridges them to the three host-facing traits the lower
//! crates define (`ucollect_plugin::PluginHost`, `ucollect_uplink::PluginDispatch`,
//! `ucollect_config::ConfigHost`) through one [`host::ReactorHost`].
//!
//! None of `ucollect-plugin`, `ucollect-uplink` or `ucollect-config`
//! depend on this crate — they only see the traits `ReactorHost`
//! implements.

pub mod fault;
pub mod fds;
pub mod host;
pub mod persistence;
pub mod reactor;
pub mod signals;
pub mod timers;
pub mod watchdog;

pub use fault::{current_plugin, run_guarded, GuardOutcome};
pub use fds::FdTable;
pub use host::{InterfaceHandle, PluginHandle, ReactorHost, UplinkRequest};
pub use persistence::FaultState;
pub use reactor::{run_on_single_worker, Reactor, ReactorError};
pub use signals::{install as install_signal_handlers, Signal};
pub use timers::TimerHeap;
pub use watchdog::{AlarmClock, IterationWatchdog, SystemAlarmClock, DEFAULT_TIMEOUT};
