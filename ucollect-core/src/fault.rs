//! Fault isolation around plugin callbacks.
//!
//! Rust cannot safely `longjmp` out of arbitrary in-flight frames, so
//! unlike the original's signal-based non-local return, a plugin fault is
//! recovered with `std::panic::catch_unwind`. `CURRENT_PLUGIN` records
//! which plugin (by registry index) is executing right now, so that a
//! genuine hardware fault (SIGSEGV/SIGBUS/SIGFPE/SIGILL), which cannot be
//! safely recovered from in-process, can at least be attributed in the
//! abort log before the process goes down.
//!
//! `ctx.reinit()` unwinds through the same `catch_unwind` boundary by
//! panicking with a [`PluginReinitRequest`] payload; `run_guarded`
//! downcasts the panic payload to tell a clean reinit request apart from
//! an actual bug, so the former is never counted against the plugin's
//! failure budget.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use ucollect_plugin::PluginReinitRequest;

thread_local! {
    /// Index of the plugin whose callback is currently executing, or
    /// `None` between callbacks. Only ever touched from the reactor
    /// thread; a signal handler reading it races harmlessly since it only
    /// ever reads, never writes, a `Cell<Option<usize>>`-sized value.
    pub static CURRENT_PLUGIN: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Outcome of a guarded plugin callback invocation.
#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The callback returned normally.
    Ok,
    /// The plugin asked to be reinitialized via `ctx.reinit()` — not a
    /// failure, don't count it against the failure budget.
    ReinitRequested,
    /// The callback panicked for any other reason — a real fault.
    Faulted,
}

/// Run `f` (a plugin callback invocation) with `CURRENT_PLUGIN` set to
/// `plugin_index`, catching any panic so one misbehaving plugin cannot
/// bring down the whole reactor.
pub fn run_guarded<F: FnOnce()>(plugin_index: usize, f: F) -> GuardOutcome {
    CURRENT_PLUGIN.with(|cell| cell.set(Some(plugin_index)));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CURRENT_PLUGIN.with(|cell| cell.set(None));

    match result {
        Ok(()) => GuardOutcome::Ok,
        Err(payload) => {
            if payload.downcast_ref::<PluginReinitRequest>().is_some() {
                GuardOutcome::ReinitRequested
            } else {
                GuardOutcome::Faulted
            }
        }
    }
}

/// Read-only accessor for signal handlers / diagnostics: which plugin (by
/// index) is currently executing, if any.
pub fn current_plugin() -> Option<usize> {
    CURRENT_PLUGIN.with(|cell| cell.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_clean_callback_reports_ok() {
        let outcome = run_guarded(0, || {});
        assert_eq!(outcome, GuardOutcome::Ok);
        assert_eq!(current_plugin(), None);
    }

    #[test]
    fn a_reinit_request_is_distinguished_from_a_fault() {
        let outcome = run_guarded(1, || panic::panic_any(PluginReinitRequest));
        assert_eq!(outcome, GuardOutcome::ReinitRequested);
    }

    #[test]
    fn an_ordinary_panic_is_reported_as_a_fault() {
        let outcome = run_guarded(2, || {
            let v: Vec<u8> = Vec::new();
            let _ = v[5];
        });
        assert_eq!(outcome, GuardOutcome::Faulted);
    }

    #[test]
    fn current_plugin_is_cleared_after_the_callback_returns() {
        assert_eq!(current_plugin(), None);
        run_guarded(3, || {
            assert_eq!(current_plugin(), Some(3));
        });
        assert_eq!(current_plugin(), None);
    }

    #[test]
    fn current_plugin_is_cleared_even_after_a_panic() {
        let _ = run_guarded(4, || panic!("boom"));
        assert_eq!(current_plugin(), None);
    }
}
