//! POSIX signal handling for the reactor, grounded on the original's
//! `startup.c`/`loop.c` dispatch table: SIGHUP requests a partial
//! reconfiguration, SIGUSR1 a full (reinit) reconfiguration, and
//! SIGINT/SIGQUIT/SIGTERM request a graceful stop. The terminating signals
//! are installed with `SA_RESETHAND`, so a second delivery during a stuck
//! shutdown falls through to the default handler and hard-kills the
//! process rather than hanging forever.
//!
//! The handler itself only writes a byte through an async-signal-safe
//! channel send; all actual reconfigure/shutdown logic runs on the reactor
//! thread once it observes the message.

use std::sync::OnceLock;

use crossbeam_channel::{Receiver, Sender};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Signal {
    Hup,
    Usr1,
    Int,
    Quit,
    Term,
}

static SENDER: OnceLock<Sender<Signal>> = OnceLock::new();

/// Pure mapping from a raw signal number to our [`Signal`], kept separate
/// from actual `sigaction` registration so it can be tested without
/// delivering real OS signals.
pub fn signal_for(sig: libc::c_int) -> Option<Signal> {
    match sig {
        libc::SIGHUP => Some(Signal::Hup),
        libc::SIGUSR1 => Some(Signal::Usr1),
        libc::SIGINT => Some(Signal::Int),
        libc::SIGQUIT => Some(Signal::Quit),
        libc::SIGTERM => Some(Signal::Term),
        _ => None,
    }
}

extern "C" fn handle(sig: libc::c_int) {
    if let Some(signal) = signal_for(sig) {
        if let Some(sender) = SENDER.get() {
            // A bounded, non-blocking send: if the channel is full the
            // reactor hasn't drained the last notification yet and
            // another one would be redundant.
            let _ = sender.try_send(signal);
        }
    }
}

/// Install handlers for HUP/USR1/INT/QUIT/TERM and return the receiving
/// end of the channel the reactor polls. Must be called at most once per
/// process.
pub fn install() -> Receiver<Signal> {
    let (tx, rx) = crossbeam_channel::bounded(16);
    SENDER.set(tx).ok().expect("signals::install called more than once");

    unsafe {
        register(libc::SIGHUP, false);
        register(libc::SIGUSR1, false);
        register(libc::SIGINT, true);
        register(libc::SIGQUIT, true);
        register(libc::SIGTERM, true);
    }

    rx
}

/// `reset_hand` installs `SA_RESETHAND`, so a second delivery of a
/// terminating signal reverts to `SIG_DFL` and kills the process outright
/// — the original's escape hatch for a reactor stuck in cleanup.
unsafe fn register(sig: libc::c_int, reset_hand: bool) {
    let mut action: libc::sigaction = std::mem::zeroed();
    action.sa_sigaction = handle as usize;
    libc::sigemptyset(&mut action.sa_mask);
    action.sa_flags = libc::SA_RESTART;
    if reset_hand {
        action.sa_flags |= libc::SA_RESETHAND;
    }
    libc::sigaction(sig, &action, std::ptr::null_mut());
}
