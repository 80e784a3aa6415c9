//! Aggregate packet/byte counters sliced by protocol, direction and a
//! handful of TCP flags. Reports the accumulated window to the uplink on
//! request and resets for the next one.

use std::net::IpAddr;

use ucollect_packet::{Direction, Layer, PacketInfo, TcpFlags};
use ucollect_plugin::{Plugin, PluginContext};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(usize)]
enum Selector {
    Any = 0,
    V4,
    V6,
    In,
    Out,
    Tcp,
    Udp,
    Icmp,
    LowPort,
    SynFlag,
    FinFlag,
    SynAckFlag,
    AckFlag,
    PushFlag,
    Server,
}

const SELECTOR_COUNT: usize = 15;

#[derive(Clone, Copy, Default)]
struct Counter {
    count: u32,
    size: u32,
}

struct UserData {
    timestamp: u64,
    data: [Counter; SELECTOR_COUNT],
}

impl Default for UserData {
    fn default() -> Self {
        UserData {
            timestamp: 0,
            data: [Counter::default(); SELECTOR_COUNT],
        }
    }
}

fn update(d: &mut UserData, selector: Selector, size: usize) {
    let slot = &mut d.data[selector as usize];
    slot.count += 1;
    slot.size += size as u32;
}

pub struct CountPlugin {
    data: UserData,
}

impl CountPlugin {
    pub fn new() -> Self {
        CountPlugin {
            data: UserData::default(),
        }
    }

    fn handle_internal(d: &mut UserData, ctx: &PluginContext, info: &PacketInfo, size: usize) {
        if let Some(next) = info.next {
            // Envelope around some other real packet; not interesting itself.
            Self::handle_internal(d, ctx, next, size);
            return;
        }
        update(d, Selector::Any, size);
        tracing::trace!(count = d.data[Selector::Any as usize].count, "new packet");
        match info.direction {
            Direction::In => update(d, Selector::In, size),
            Direction::Out => update(d, Selector::Out, size),
            Direction::Unknown => {}
        }
        if info.layer != Layer::Ip {
            // Not an IP packet (or not the recognized-IP leaf of the chain).
            return;
        }
        match info.ip_protocol {
            4 => update(d, Selector::V4, size),
            6 => update(d, Selector::V6, size),
            _ => {}
        }
        match info.app_protocol {
            'T' => {
                update(d, Selector::Tcp, size);
                if info.tcp_flags.contains(TcpFlags::SYN) {
                    update(d, Selector::SynFlag, size);
                }
                if info.tcp_flags.contains(TcpFlags::FIN) {
                    update(d, Selector::FinFlag, size);
                }
                if info.tcp_flags.contains(TcpFlags::ACK) && info.tcp_flags.contains(TcpFlags::SYN) {
                    update(d, Selector::SynAckFlag, size);
                }
                if info.tcp_flags.contains(TcpFlags::ACK) {
                    update(d, Selector::AckFlag, size);
                }
                if info.tcp_flags.contains(TcpFlags::PUSH) {
                    update(d, Selector::PushFlag, size);
                }
            }
            'U' => update(d, Selector::Udp, size),
            'i' | 'I' => update(d, Selector::Icmp, size),
            _ => {}
        }
        let Some(remote) = info.direction.remote_endpoint() else {
            return;
        };
        let port = info.port(remote);
        if port <= 1024 && port != 0 {
            update(d, Selector::LowPort, size);
        }
        if let Some(addr) = info.address(remote) {
            for resolved in ctx.resolved_addresses() {
                let matches = match resolved {
                    IpAddr::V4(v4) => info.addr_len == 4 && addr == v4.octets(),
                    IpAddr::V6(v6) => info.addr_len == 16 && addr == v6.octets(),
                };
                if matches && port != 22 {
                    // Count at most once, even if the address appears more
                    // than once in the resolved set.
                    update(d, Selector::Server, size);
                    break;
                }
            }
        }
    }

    fn communicate(&mut self, ctx: &mut PluginContext, data: &[u8]) {
        if data.len() != 8 {
            tracing::error!(len = data.len(), "invalid request from upstream to plugin Count");
            return;
        }
        let timestamp = u64::from_be_bytes(data.try_into().expect("checked length above"));

        let stats = ctx.capture_stats();
        let mut encoded = Vec::with_capacity(8 + 4 + 3 * stats.len() * 4 + 2 * SELECTOR_COUNT * 4);
        encoded.extend_from_slice(&self.data.timestamp.to_be_bytes());
        encoded.extend_from_slice(&(stats.len() as u32).to_be_bytes());
        for (_interface, s) in &stats {
            encoded.extend_from_slice(&s.received.to_be_bytes());
            encoded.extend_from_slice(&s.dropped.to_be_bytes());
            encoded.extend_from_slice(&s.if_dropped.to_be_bytes());
        }
        for (i, counter) in self.data.data.iter().enumerate() {
            encoded.extend_from_slice(&counter.count.to_be_bytes());
            encoded.extend_from_slice(&counter.size.to_be_bytes());
            tracing::trace!(selector = i, count = counter.count, size = counter.size, "sending count value");
        }
        ctx.send_message(&encoded);

        self.data = UserData {
            timestamp,
            ..UserData::default()
        };
    }
}

impl Default for CountPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CountPlugin {
    fn name(&self) -> &str {
        "Count"
    }

    fn init(&mut self, _ctx: &mut PluginContext) {
        self.data = UserData::default();
    }

    fn packet(&mut self, ctx: &mut PluginContext, info: &PacketInfo) {
        let size = info.data.len();
        Self::handle_internal(&mut self.data, ctx, info, size);
    }

    fn uplink_data(&mut self, ctx: &mut PluginContext, data: &[u8]) {
        self.communicate(ctx, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::RawFd;
    use ucollect_mem::Arena;
    use ucollect_plugin::{InterfaceStats, PluginHost, TimerId};

    struct TestHost {
        resolved: Vec<IpAddr>,
        stats: Vec<(String, InterfaceStats)>,
        sent: Vec<Vec<u8>>,
    }

    impl PluginHost for TestHost {
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
            0
        }
        fn option_get(&self, _name: &str) -> Option<&[String]> {
            None
        }
        fn send_message(&mut self, _plugin_name: &str, bytes: &[u8]) -> bool {
            self.sent.push(bytes.to_vec());
            true
        }
        fn resolved_addresses(&self) -> &[IpAddr] {
            &self.resolved
        }
        fn capture_stats(&self) -> Vec<(String, InterfaceStats)> {
            self.stats.clone()
        }
    }

    fn udp_packet() -> Vec<u8> {
        let mut p = vec![0u8; 20 + 8 + 4];
        p[0] = 0x45;
        p[9] = 17; // UDP
        p[12..16].copy_from_slice(&[10, 0, 0, 1]);
        p[16..20].copy_from_slice(&[192, 0, 2, 9]);
        p[20..22].copy_from_slice(&40000u16.to_be_bytes());
        p[22..24].copy_from_slice(&53u16.to_be_bytes());
        p
    }

    #[test]
    fn counts_any_in_and_udp_for_a_single_packet() {
        let arena = Arena::create("test");
        let data = udp_packet();
        let info = ucollect_packet::parse(&arena, &data, "eth0", Direction::In, ucollect_packet::LinkType::Raw);
        let mut host = TestHost {
            resolved: vec![],
            stats: vec![],
            sent: vec![],
        };
        let mut plugin = CountPlugin::new();
        let mut ctx = PluginContext::new("Count", true, &arena, &mut host);
        plugin.packet(&mut ctx, info);
        assert_eq!(plugin.data.data[Selector::Any as usize].count, 1);
        assert_eq!(plugin.data.data[Selector::In as usize].count, 1);
        assert_eq!(plugin.data.data[Selector::Udp as usize].count, 1);
        assert_eq!(plugin.data.data[Selector::V4 as usize].count, 1);
    }

    #[test]
    fn matching_resolved_address_counts_as_server_unless_port_22() {
        let arena = Arena::create("test");
        let data = udp_packet();
        let info = ucollect_packet::parse(&arena, &data, "eth0", Direction::In, ucollect_packet::LinkType::Raw);
        let mut host = TestHost {
            resolved: vec![IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1))],
            stats: vec![],
            sent: vec![],
        };
        let mut plugin = CountPlugin::new();
        let mut ctx = PluginContext::new("Count", true, &arena, &mut host);
        plugin.packet(&mut ctx, info);
        assert_eq!(plugin.data.data[Selector::Server as usize].count, 1);
    }

    #[test]
    fn communicate_resets_counters_and_adopts_new_timestamp() {
        let arena = Arena::create("test");
        let data = udp_packet();
        let info = ucollect_packet::parse(&arena, &data, "eth0", Direction::In, ucollect_packet::LinkType::Raw);
        let mut host = TestHost {
            resolved: vec![],
            stats: vec![("eth0".to_string(), InterfaceStats::default())],
            sent: vec![],
        };
        let mut plugin = CountPlugin::new();
        {
            let mut ctx = PluginContext::new("Count", true, &arena, &mut host);
            plugin.packet(&mut ctx, info);
        }
        let mut ctx = PluginContext::new("Count", true, &arena, &mut host);
        plugin.uplink_data(&mut ctx, &42u64.to_be_bytes());
        assert_eq!(plugin.data.timestamp, 42);
        assert_eq!(plugin.data.data[Selector::Any as usize].count, 0);
        assert_eq!(host.sent.len(), 1);
    }

    #[test]
    fn communicate_rejects_a_malformed_request() {
        let arena = Arena::create("test");
        let mut host = TestHost {
            resolved: vec![],
            stats: vec![],
            sent: vec![],
        };
        let mut plugin = CountPlugin::new();
        let mut ctx = PluginContext::new("Count", true, &arena, &mut host);
        plugin.uplink_data(&mut ctx, &[1, 2, 3]);
        assert!(host.sent.is_empty());
    }
}
