//! Rate-limited warnings for packets that look like a misconfigured
//! interface: unknown layer, unknown direction, or a PPPoE frame where
//! none is expected.

use ucollect_packet::{Direction, Layer, PacketInfo};
use ucollect_plugin::{Plugin, PluginContext};

/// Warn at most this often per warning kind, milliseconds.
const WARN_TIMEOUT_MS: u64 = 15 * 60 * 1000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WarnKind {
    Layer,
    Direction,
    Pppoe,
}

const WARN_KINDS: usize = 3;

pub struct BadconfPlugin {
    last_warned: [u64; WARN_KINDS],
}

impl BadconfPlugin {
    pub fn new() -> Self {
        BadconfPlugin {
            last_warned: [0; WARN_KINDS],
        }
    }

    fn warn(&mut self, ctx: &PluginContext, kind: WarnKind, message: std::fmt::Arguments<'_>) {
        let now = ctx.now();
        let slot = &mut self.last_warned[kind as usize];
        // Wrapping, not saturating: matches the original's unsigned
        // subtraction, which (intentionally or not) lets warnings through
        // freely during the process's first `WARN_TIMEOUT_MS` of uptime,
        // before enough real elapsed time exists to throttle against.
        if now.wrapping_sub(WARN_TIMEOUT_MS) <= *slot {
            return;
        }
        *slot = now;
        let rendered = ctx.temp_arena().render(message);
        tracing::warn!(interface = ctx.get_name(), "possible misconfiguration: {}", rendered);
    }

    fn handle_one(&mut self, ctx: &PluginContext, info: &PacketInfo) {
        if info.layer == Layer::Unknown {
            self.warn(ctx, WarnKind::Layer, format_args!("packet on unknown layer {:?}", info.layer_raw));
        }
        if info.direction == Direction::Unknown {
            self.warn(ctx, WarnKind::Direction, format_args!("packet of unknown direction"));
        }
        if info.app_protocol == 'P' {
            self.warn(ctx, WarnKind::Pppoe, format_args!("a PPPoE packet seen"));
        }
    }
}

impl Default for BadconfPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for BadconfPlugin {
    fn name(&self) -> &str {
        "Badconf"
    }

    fn packet(&mut self, ctx: &mut PluginContext, info: &PacketInfo) {
        let mut current = Some(info);
        while let Some(packet) = current {
            self.handle_one(ctx, packet);
            current = packet.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::RawFd;
    use ucollect_mem::Arena;
    use ucollect_plugin::{InterfaceStats, PluginHost, TimerId};

    struct ClockHost {
        now: u64,
    }

    impl PluginHost for ClockHost {
        fn pool_create(&mut self, name: &str) -> Arena {
            Arena::create(Box::leak(name.to_string().into_boxed_str()))
        }
        fn register_fd(&mut self, _fd: RawFd, _tag: u64) {}
        fn unregister_fd(&mut self, _fd: RawFd) {}
        fn timeout_add(&mut self, _delay_ms: u64, _data: u64) -> TimerId {
            TimerId(0)
        }
        fn timeout_cancel(&mut self, _id: TimerId) {}
        fn now(&self) -> u64 {
            self.now
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
        fn capture_stats(&self) -> Vec<(String, InterfaceStats)> {
            Vec::new()
        }
    }

    fn unknown_layer_packet<'a>(arena: &'a Arena) -> &'a PacketInfo<'a> {
        let data: [u8; 1] = [0];
        ucollect_packet::parse(arena, &data, "eth0", Direction::Unknown, ucollect_packet::LinkType::Other(-1))
    }

    #[test]
    fn warns_freely_during_the_process_first_timeout_window() {
        // Before `now` has accumulated past one full timeout window, the
        // wrapping subtraction keeps warnings un-throttled (see the note on
        // `warn`'s implementation).
        let arena = Arena::create("test");
        let info = unknown_layer_packet(&arena);
        let mut host = ClockHost { now: 0 };
        let mut plugin = BadconfPlugin::new();
        {
            let mut ctx = PluginContext::new("Badconf", true, &arena, &mut host);
            plugin.packet(&mut ctx, info);
        }
        assert_eq!(plugin.last_warned[WarnKind::Layer as usize], 0);

        host.now = 1000;
        {
            let mut ctx = PluginContext::new("Badconf", true, &arena, &mut host);
            plugin.packet(&mut ctx, info);
        }
        assert_eq!(plugin.last_warned[WarnKind::Layer as usize], 1000);
    }

    #[test]
    fn throttles_once_enough_real_time_has_passed() {
        let arena = Arena::create("test");
        let info = unknown_layer_packet(&arena);
        let mut host = ClockHost { now: WARN_TIMEOUT_MS + 1 };
        let mut plugin = BadconfPlugin::new();
        {
            let mut ctx = PluginContext::new("Badconf", true, &arena, &mut host);
            plugin.packet(&mut ctx, info);
        }
        assert_eq!(plugin.last_warned[WarnKind::Layer as usize], WARN_TIMEOUT_MS + 1);

        host.now += 1000; // well inside the next window
        {
            let mut ctx = PluginContext::new("Badconf", true, &arena, &mut host);
            plugin.packet(&mut ctx, info);
        }
        assert_eq!(plugin.last_warned[WarnKind::Layer as usize], WARN_TIMEOUT_MS + 1);

        host.now += WARN_TIMEOUT_MS;
        {
            let mut ctx = PluginContext::new("Badconf", true, &arena, &mut host);
            plugin.packet(&mut ctx, info);
        }
        assert_eq!(plugin.last_warned[WarnKind::Layer as usize], 2 * WARN_TIMEOUT_MS + 1001);
    }

    #[test]
    fn well_formed_packet_triggers_no_warnings() {
        let arena = Arena::create("test");
        let data = [0x45u8, 0, 0, 20];
        let info = ucollect_packet::parse(&arena, &data, "eth0", Direction::In, ucollect_packet::LinkType::Raw);
        let mut host = ClockHost { now: 0 };
        let mut plugin = BadconfPlugin::new();
        let mut ctx = PluginContext::new("Badconf", true, &arena, &mut host);
        plugin.packet(&mut ctx, info);
        assert_eq!(plugin.last_warned, [0, 0, 0]);
    }
}
