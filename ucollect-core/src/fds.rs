//! Registered-fd table for plugin-owned file descriptors.
//!
//! A plugin callback invoked while the reactor is part-way through
//! dispatching a batch of ready fds may itself unregister (or register a
//! replacement at the same number as) another fd still later in that same
//! batch. Removing an entry outright mid-batch would let a reused fd
//! number be mistaken for the one it replaced, so `unregister` only marks
//! an entry dead; actual removal happens at `reap`, called once per
//! iteration after the whole ready batch has been dispatched.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

struct Entry {
    /// Index of the plugin that registered this fd, so a readiness event
    /// can be routed back to `call_fd_ready` on the right instance.
    owner: usize,
    tag: u64,
    dead: bool,
}

#[derive(Default)]
pub struct FdTable {
    entries: HashMap<RawFd, Entry>,
}

impl FdTable {
    pub fn new() -> Self {
        FdTable::default()
    }

    pub fn register(&mut self, fd: RawFd, owner: usize, tag: u64) {
        self.entries.insert(fd, Entry { owner, tag, dead: false });
    }

    /// Mark `fd` for removal. It stays resolvable via `tag_of`/`owner_of`
    /// until the next `reap`, so a readiness event already queued for it
    /// in the current batch is not silently dropped or misattributed.
    pub fn unregister(&mut self, fd: RawFd) {
        if let Some(entry) = self.entries.get_mut(&fd) {
            entry.dead = true;
        }
    }

    /// The tag registered for `fd`, if it is still known (dead-but-not-
    /// yet-reaped entries still resolve).
    pub fn tag_of(&self, fd: RawFd) -> Option<u64> {
        self.entries.get(&fd).map(|e| e.tag)
    }

    /// The plugin index that owns `fd`, if it is still known.
    pub fn owner_of(&self, fd: RawFd) -> Option<usize> {
        self.entries.get(&fd).map(|e| e.owner)
    }

    /// Drop every registration belonging to `owner` — used when a plugin
    /// is torn down so its fds don't outlive it.
    pub fn unregister_all_owned_by(&mut self, owner: usize) {
        for entry in self.entries.values_mut() {
            if entry.owner == owner {
                entry.dead = true;
            }
        }
    }

    /// `true` if `fd` is registered and has not been unregistered.
    pub fn is_live(&self, fd: RawFd) -> bool {
        self.entries.get(&fd).is_some_and(|e| !e.dead)
    }

    /// All currently live fds, for building the poll set.
    pub fn live_fds(&self) -> Vec<RawFd> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.dead)
            .map(|(&fd, _)| fd)
            .collect()
    }

    /// Drop every entry unregistered since the last `reap`. Call once per
    /// reactor iteration, after dispatching the whole ready batch.
    pub fn reap(&mut self) {
        self.entries.retain(|_, e| !e.dead);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
