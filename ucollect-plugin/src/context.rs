use std::os::unix::io::RawFd;

use ucollect_mem::Arena;

/// Opaque handle for a timer registered through [`PluginContext::timeout_add`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimerId(pub u64);

/// Per-interface capture counters, mirroring libpcap's own stat triple
/// (`pcap_stats(3)`: packets received, dropped by the kernel buffer, and
/// dropped by the interface driver).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct InterfaceStats {
    pub received: u32,
    pub dropped: u32,
    pub if_dropped: u32,
}

/// Host-side operations a plugin callback may perform. Implemented by the
/// reactor (`ucollect-core`); `ucollect-plugin` only depends on the trait,
/// never on the reactor itself.
pub trait PluginHost {
    /// Allocate a new named arena for the plugin's own long-lived use,
    /// distinct from the host-managed permanent/temp arenas.
    fn pool_create(&mut self, name: &str) -> Arena;
    fn register_fd(&mut self, fd: RawFd, tag: u64);
    fn unregister_fd(&mut self, fd: RawFd);
    fn timeout_add(&mut self, delay_ms: u64, data: u64) -> TimerId;
    fn timeout_cancel(&mut self, id: TimerId);
    /// Monotonic time in milliseconds, same clock the reactor uses.
    fn now(&self) -> u64;
    fn option_get(&self, name: &str) -> Option<&[String]>;
    /// Send a message to the uplink on behalf of the current plugin.
    /// Returns `false` without sending anything if the plugin is inactive.
    fn send_message(&mut self, plugin_name: &str, bytes: &[u8]) -> bool;
    /// The addresses the uplink hostname currently resolves to, so a
    /// plugin can recognize traffic destined for the server itself
    /// (empty before the first successful resolution).
    fn resolved_addresses(&self) -> &[std::net::IpAddr];
    /// Current capture counters for every open interface, `(name, stats)`.
    fn capture_stats(&self) -> Vec<(String, InterfaceStats)>;
}

/// Marker panic payload for [`PluginContext::reinit`]. The host's
/// `catch_unwind` boundary around each plugin callback downcasts caught
/// panics to this type to distinguish "plugin asked to be reloaded" from
/// an actual fault — the former is not counted against the plugin's
/// failure budget.
pub struct PluginReinitRequest;

/// Per-callback handle given to a plugin. Borrows the plugin's temp arena
/// and a host implementation for the duration of one callback invocation.
pub struct PluginContext<'a> {
    name: &'a str,
    active: bool,
    temp_arena: &'a Arena,
    host: &'a mut dyn PluginHost,
}

impl<'a> PluginContext<'a> {
    pub fn new(name: &'a str, active: bool, temp_arena: &'a Arena, host: &'a mut dyn PluginHost) -> Self {
        PluginContext {
            name,
            active,
            temp_arena,
            host,
        }
    }

    pub fn get_name(&self) -> &str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn temp_arena(&self) -> &Arena {
        self.temp_arena
    }

    pub fn pool_create(&mut self, name: &str) -> Arena {
        self.host.pool_create(name)
    }

    pub fn register_fd(&mut self, fd: RawFd, tag: u64) {
        self.host.register_fd(fd, tag)
    }

    pub fn unregister_fd(&mut self, fd: RawFd) {
        self.host.unregister_fd(fd)
    }

    pub fn timeout_add(&mut self, delay_ms: u64, data: u64) -> TimerId {
        self.host.timeout_add(delay_ms, data)
    }

    pub fn timeout_cancel(&mut self, id: TimerId) {
        self.host.timeout_cancel(id)
    }

    pub fn now(&self) -> u64 {
        self.host.now()
    }

    pub fn option_get(&self, name: &str) -> Option<&[String]> {
        self.host.option_get(name)
    }

    pub fn resolved_addresses(&self) -> &[std::net::IpAddr] {
        self.host.resolved_addresses()
    }

    pub fn capture_stats(&self) -> Vec<(String, InterfaceStats)> {
        self.host.capture_stats()
    }

    pub fn send_message(&mut self, bytes: &[u8]) -> bool {
        self.host.send_message(self.name, bytes)
    }

    /// Request the host reinitialize this plugin. Never returns — it
    /// unwinds through the host's `catch_unwind` boundary, which treats
    /// the unwind as a clean reinit rather than a fault.
    pub fn reinit(&self) -> ! {
        std::panic::panic_any(PluginReinitRequest)
    }
}
