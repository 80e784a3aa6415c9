use std::os::unix::io::RawFd;

use ucollect_packet::PacketInfo;

use crate::context::PluginContext;

/// A unit of packet-processing logic. Every callback is optional — the
/// default implementation is a no-op, matching the original plugin vtable
/// where any callback pointer may be null.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Protocol version reported to the server. Not bumped on every code
    /// change, only when the server needs to know about a change.
    fn version(&self) -> u16 {
        0
    }

    fn packet(&mut self, _ctx: &mut PluginContext, _info: &PacketInfo) {}
    fn init(&mut self, _ctx: &mut PluginContext) {}
    fn finish(&mut self, _ctx: &mut PluginContext) {}
    fn uplink_connected(&mut self, _ctx: &mut PluginContext) {}
    fn uplink_disconnected(&mut self, _ctx: &mut PluginContext) {}
    fn uplink_data(&mut self, _ctx: &mut PluginContext, _data: &[u8]) {}
    fn fd_ready(&mut self, _ctx: &mut PluginContext, _fd: RawFd, _tag: u64) {}

    /// A timer registered through `ctx.timeout_add` has fired; `data` is
    /// whatever value was passed to that call.
    fn timer_fired(&mut self, _ctx: &mut PluginContext, _data: u64) {}

    /// Called when a candidate configuration should be validated. Read
    /// options via `ctx.option_get`; return whether they're acceptable.
    fn config_check(&mut self, _ctx: &mut PluginContext) -> bool {
        true
    }

    /// The configurator has decided whether the candidate configuration
    /// (the one `config_check` just saw) becomes active.
    fn config_finish(&mut self, _ctx: &mut PluginContext, _activate: bool) {}
}
