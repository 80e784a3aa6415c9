use std::os::unix::io::RawFd;

use sha2::{Digest, Sha256};
use ucollect_mem::Arena;
use ucollect_packet::PacketInfo;

use crate::context::{PluginContext, PluginHost};
use crate::plugin::Plugin;

/// Default threshold (consecutive fault-isolation teardowns) after which a
/// plugin is omitted instead of being re-added fresh.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Runtime state the host keeps for one loaded plugin: the plugin object
/// itself, its two arenas, activation flag, and fault-isolation failure
/// count. Not `Clone` — a plugin is either fully in the old configuration
/// or fully in the new one, never duplicated.
pub struct PluginInstance {
    plugin: Box<dyn Plugin>,
    name: String,
    identity: [u8; 32],
    version: u16,
    permanent_arena: Arena,
    temp_arena: Arena,
    active: bool,
    consecutive_failures: u32,
}

impl PluginInstance {
    /// `library_bytes` is whatever uniquely identifies this plugin build —
    /// for a statically linked plugin that's a stable identifier such as
    /// its name and version, standing in for the original's "bytes of the
    /// .so on disk" since nothing is loaded from disk here (see §9 of the
    /// pluglib resolver notes on replacing dynamic linking).
    pub fn new(plugin: Box<dyn Plugin>, library_bytes: &[u8]) -> Self {
        let name = plugin.name().to_string();
        let version = plugin.version();
        let identity = identity_hash(library_bytes);
        PluginInstance {
            plugin,
            name,
            identity,
            version,
            permanent_arena: Arena::create("plugin-permanent"),
            temp_arena: Arena::create("plugin-temp"),
            active: false,
            consecutive_failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &[u8; 32] {
        &self.identity
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn permanent_arena(&self) -> &Arena {
        &self.permanent_arena
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// The failure count belongs to the plugin, not to any one in-process
    /// object representing it — the host calls this to carry the count
    /// forward when it re-instantiates a plugin fresh after a fault.
    pub fn set_consecutive_failures(&mut self, count: u32) {
        self.consecutive_failures = count;
    }

    pub fn exceeds_failure_threshold(&self, threshold: u32) -> bool {
        self.consecutive_failures >= threshold
    }

    fn context<'a>(&'a self, host: &'a mut dyn PluginHost) -> PluginContext<'a> {
        PluginContext::new(&self.name, self.active, &self.temp_arena, host)
    }

    pub fn call_packet(&mut self, host: &mut dyn PluginHost, info: &PacketInfo) {
        let mut ctx = self.context(host);
        self.plugin.packet(&mut ctx, info);
        self.temp_arena.reset();
    }

    pub fn call_init(&mut self, host: &mut dyn PluginHost) {
        let mut ctx = self.context(host);
        self.plugin.init(&mut ctx);
        self.temp_arena.reset();
    }

    pub fn call_finish(&mut self, host: &mut dyn PluginHost) {
        let mut ctx = self.context(host);
        self.plugin.finish(&mut ctx);
        self.temp_arena.reset();
    }

    /// Does not reset the temp arena — matches the original's exception
    /// for uplink connect/disconnect notifications.
    pub fn call_uplink_connected(&mut self, host: &mut dyn PluginHost) {
        let mut ctx = self.context(host);
        self.plugin.uplink_connected(&mut ctx);
    }

    pub fn call_uplink_disconnected(&mut self, host: &mut dyn PluginHost) {
        let mut ctx = self.context(host);
        self.plugin.uplink_disconnected(&mut ctx);
    }

    pub fn call_uplink_data(&mut self, host: &mut dyn PluginHost, data: &[u8]) {
        let mut ctx = self.context(host);
        self.plugin.uplink_data(&mut ctx, data);
        self.temp_arena.reset();
    }

    pub fn call_fd_ready(&mut self, host: &mut dyn PluginHost, fd: RawFd, tag: u64) {
        let mut ctx = self.context(host);
        self.plugin.fd_ready(&mut ctx, fd, tag);
        self.temp_arena.reset();
    }

    pub fn call_timer_fired(&mut self, host: &mut dyn PluginHost, data: u64) {
        let mut ctx = self.context(host);
        self.plugin.timer_fired(&mut ctx, data);
        self.temp_arena.reset();
    }

    pub fn call_config_check(&mut self, host: &mut dyn PluginHost) -> bool {
        let mut ctx = self.context(host);
        let ok = self.plugin.config_check(&mut ctx);
        self.temp_arena.reset();
        ok
    }

    pub fn call_config_finish(&mut self, host: &mut dyn PluginHost, activate: bool) {
        let mut ctx = self.context(host);
        self.plugin.config_finish(&mut ctx, activate);
        self.temp_arena.reset();
    }
}

fn identity_hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        packets_seen: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl Plugin for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn packet(&mut self, _ctx: &mut PluginContext, _info: &PacketInfo) {
            self.packets_seen.set(self.packets_seen.get() + 1);
        }
    }

    struct NullHost;
    impl PluginHost for NullHost {
        fn pool_create(&mut self, name: &str) -> Arena {
            Arena::create(Box::leak(name.to_string().into_boxed_str()))
        }
        fn register_fd(&mut self, _fd: RawFd, _tag: u64) {}
        fn unregister_fd(&mut self, _fd: RawFd) {}
        fn timeout_add(&mut self, _delay_ms: u64, _data: u64) -> crate::context::TimerId {
            crate::context::TimerId(0)
        }
        fn timeout_cancel(&mut self, _id: crate::context::TimerId) {}
        fn now(&self) -> u64 {
            0
        }
        fn option_get(&self, _name: &str) -> Option<&[String]> {
            None
        }
        fn send_message(&mut self, _plugin_name: &str, _bytes: &[u8]) -> bool {
            true
        }
        fn resolved_addresses(&self) -> &[std::net::IpAddr] {
            &[]
        }
        fn capture_stats(&self) -> Vec<(String, crate::context::InterfaceStats)> {
            Vec::new()
        }
    }

    #[test]
    fn identity_hash_is_stable_and_content_sensitive() {
        let a = identity_hash(b"plugin-a-v1");
        let b = identity_hash(b"plugin-a-v1");
        let c = identity_hash(b"plugin-a-v2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn failure_threshold_tracks_consecutive_failures() {
        let counter = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut inst = PluginInstance::new(
            Box::new(Counting {
                packets_seen: counter,
            }),
            b"counting-v1",
        );
        assert!(!inst.exceeds_failure_threshold(DEFAULT_FAILURE_THRESHOLD));
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            inst.record_failure();
        }
        assert!(inst.exceeds_failure_threshold(DEFAULT_FAILURE_THRESHOLD));
        inst.reset_failures();
        assert!(!inst.exceeds_failure_threshold(DEFAULT_FAILURE_THRESHOLD));
    }

    #[test]
    fn call_packet_resets_temp_arena_but_preserves_plugin_state() {
        let counter = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut inst = PluginInstance::new(
            Box::new(Counting {
                packets_seen: counter.clone(),
            }),
            b"counting-v1",
        );
        let mut host = NullHost;
        // The reactor's per-iteration batch arena, separate from this
        // plugin's own permanent/temp arenas.
        let batch_arena = Arena::create("batch");
        let data = [0x45u8, 0, 0, 20];
        let info = ucollect_packet::parse(
            &batch_arena,
            &data,
            "eth0",
            ucollect_packet::Direction::In,
            ucollect_packet::LinkType::Raw,
        );
        inst.call_packet(&mut host, info);
        inst.call_packet(&mut host, info);
        assert_eq!(counter.get(), 2);
    }
}
