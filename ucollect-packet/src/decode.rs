//! Layer-by-layer packet decoding.
//!
//! Mirrors the dispatch table of the original C decoder (link layer ->
//! network layer -> transport layer), ported field-for-field including its
//! quirks (e.g. UDP sets `app_protocol` before checking the packet is long
//! enough to hold a UDP header; TCP checks first). Those orderings are
//! preserved exactly since they're externally observable behavior on short
//! or malformed packets, not incidental implementation detail.

use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;

use ucollect_mem::Arena;

use crate::types::{Direction, Endpoint, LinkType, PacketInfo, TcpFlags};

const UDP_HEADER_LEN: usize = 8;
/// `sport + dport + seq + ack + offset/reserved + flags`: the prefix TCP
/// and UDP headers share, abused as a stand-in for "enough bytes to read
/// ports and, if TCP, flags" without fully validating either header.
const PORT_HEADER_LEN: usize = 14;

/// Decode `data` captured with link-layer framing `link` on `interface`,
/// travelling in `direction`. Recurses into tunneled/embedded packets,
/// allocating each layer from `arena`.
pub fn parse<'a>(
    arena: &'a Arena,
    data: &'a [u8],
    interface: &'a str,
    direction: Direction,
    link: LinkType,
) -> &'a PacketInfo<'a> {
    let node = arena.alloc_value(PacketInfo::new(data, interface, direction));
    dispatch(node, arena, link);
    node
}

fn dispatch<'a>(packet: &mut PacketInfo<'a>, arena: &'a Arena, link: LinkType) {
    tracing::trace!(?link, len = packet.data.len(), "decoding packet");
    packet.layer_raw = link;
    match link {
        LinkType::Ethernet | LinkType::Ieee802 => {
            packet.layer = crate::types::Layer::Ethernet;
            parse_ethernet(packet, arena);
        }
        LinkType::Raw => {
            packet.layer = crate::types::Layer::Ip;
            parse_internal(packet, arena);
            postprocess(packet);
        }
        LinkType::LinuxCooked => {
            packet.layer = crate::types::Layer::Cooked;
            parse_cooked(packet, arena);
        }
        LinkType::Other(_) => {
            packet.layer = crate::types::Layer::Unknown;
        }
    }
}

fn parse_ethernet<'a>(packet: &mut PacketInfo<'a>, arena: &'a Arena) {
    let data = packet.data;
    if data.len() < 14 {
        return;
    }
    // Preamble/SFD and trailing FCS are not present in captured data.
    packet.addresses[Endpoint::Dst as usize] = Some(&data[0..6]);
    packet.addresses[Endpoint::Src as usize] = Some(&data[6..12]);
    packet.addr_len = 6;
    parse_type(packet, arena, &data[12..]);
}

fn parse_cooked<'a>(packet: &mut PacketInfo<'a>, arena: &'a Arena) {
    let data = packet.data;
    if data.len() < 16 {
        return;
    }
    let addr_len = u16::from_be_bytes([data[4], data[5]]) as u8;
    packet.addresses[Endpoint::Dst as usize] = None;
    packet.addresses[Endpoint::Src as usize] = Some(&data[6..14]);
    packet.addr_len = addr_len;
    parse_type(packet, arena, &data[14..]);
}

/// `data` points at the two-byte type/ethertype field, whatever framing
/// came before it (plain Ethernet or Linux cooked capture).
fn parse_type<'a>(packet: &mut PacketInfo<'a>, arena: &'a Arena, data: &'a [u8]) {
    if data.len() < 2 {
        return;
    }
    let raw_type = u16::from_be_bytes([data[0], data[1]]);
    let mut vlan_skip = 0usize;
    if raw_type == 0x8100 {
        // IEEE 802.1q
        vlan_skip = 4;
    }
    if raw_type == 0x88a8 {
        // IEEE 802.1ad
        vlan_skip = 8;
    }

    let frame_prefix = packet.data.len() - data.len();
    let skipped = frame_prefix + vlan_skip;
    if skipped >= packet.data.len() || data.len() < vlan_skip + 2 {
        return; // Give up, short packet.
    }
    let ethertype = u16::from_be_bytes([data[vlan_skip], data[vlan_skip + 1]]);
    tracing::trace!(ethertype = format_args!("{:04x}", ethertype), "ethernet type");
    let payload_start = skipped + 2;
    if payload_start > packet.data.len() {
        return;
    }
    let payload = &packet.data[payload_start..];

    packet.next = None;
    // An ethertype below 0x0800 is actually an IEEE 802.3 length field;
    // assume IP follows, same as the explicit 0x0800/0x86DD cases.
    if ethertype < 0x0800 || ethertype == 0x0800 || ethertype == 0x86DD {
        packet.app_protocol = 'I';
        let next = arena.alloc_value(PacketInfo::new(payload, packet.interface, packet.direction));
        dispatch(next, arena, LinkType::Raw);
        packet.next = Some(next);
        return;
    }
    match ethertype {
        0x8035 => packet.app_protocol = 'a', // Reverse ARP
        0x0806 => packet.app_protocol = 'A', // ARP
        0x0842 => packet.app_protocol = 'W', // Wake on LAN
        0x8137 | 0x8138 => packet.app_protocol = 'X', // IPX
        0x888E => packet.app_protocol = 'E', // EAP
        0x8863 | 0x8864 => packet.app_protocol = 'P', // PPPoE
        _ => {}
    }
}

fn parse_internal<'a>(packet: &mut PacketInfo<'a>, arena: &'a Arena) {
    packet.app_protocol_raw = 0xff;
    let data = packet.data;
    if data.is_empty() {
        packet.ip_protocol = 0;
        return;
    }
    // IPv4 and IPv6 share the version nibble's position, so we can peek at
    // it before committing to either header shape.
    let version = data[0] >> 4;
    match version {
        4 => {
            if data.len() < 20 {
                return; // ip_protocol stays 0: too short to trust the nibble.
            }
            let Some(ipv4) = Ipv4Packet::new(data) else {
                return;
            };
            packet.ip_protocol = version;
            packet.addresses[Endpoint::Src as usize] = Some(&data[12..16]);
            packet.addresses[Endpoint::Dst as usize] = Some(&data[16..20]);
            packet.addr_len = 4;
            packet.hdr_length = ipv4.get_header_length() as usize * 4;
            packet.app_protocol_raw = ipv4.get_next_level_protocol().0;
        }
        6 => {
            if data.len() < 40 {
                return; // ip_protocol stays 0: too short to trust the nibble.
            }
            let Some(ipv6) = Ipv6Packet::new(data) else {
                return;
            };
            packet.ip_protocol = version;
            packet.addresses[Endpoint::Src as usize] = Some(&data[8..24]);
            packet.addresses[Endpoint::Dst as usize] = Some(&data[24..40]);
            packet.addr_len = 16;
            packet.hdr_length = 40;
            packet.app_protocol_raw = ipv6.get_next_header().0;
        }
        _ => return, // Not IP. Don't try TCP/UDP. ip_protocol stays 0.
    }

    let below_start = packet.hdr_length.min(data.len());
    let below = &data[below_start..];
    packet.app_protocol = '?';
    match packet.app_protocol_raw {
        1 => {
            // ICMP
            packet.app_protocol = 'i';
        }
        4 | 41 => {
            // IPv4-in-IP or IPv6-in-IP tunneling.
            packet.app_protocol = if packet.app_protocol_raw == 4 { '4' } else { '6' };
            let next =
                arena.alloc_value(PacketInfo::new(below, packet.interface, packet.direction));
            dispatch(next, arena, LinkType::Raw);
            packet.next = Some(next);
        }
        6 => {
            // TCP — the length check happens before we commit to 'T', so a
            // too-short TCP-claiming packet is left with app_protocol '?'.
            if below.len() < PORT_HEADER_LEN {
                return;
            }
            packet.app_protocol = 'T';
            if let Some(tcp) = TcpPacket::new(below) {
                packet.hdr_length += tcp.get_data_offset() as usize * 4;
                packet.tcp_flags = TcpFlags::from_bits_truncate(tcp.get_flags());
                packet.ports[Endpoint::Src as usize] = tcp.get_source();
                packet.ports[Endpoint::Dst as usize] = tcp.get_destination();
            }
        }
        17 => {
            // UDP — app_protocol is set before the length check here,
            // unlike TCP above; this mirrors the original exactly.
            packet.app_protocol = 'U';
            if below.len() < UDP_HEADER_LEN {
                return;
            }
            packet.hdr_length += UDP_HEADER_LEN;
            if let Some(udp) = UdpPacket::new(below) {
                packet.ports[Endpoint::Src as usize] = udp.get_source();
                packet.ports[Endpoint::Dst as usize] = udp.get_destination();
            }
        }
        58 => {
            // ICMPv6
            packet.app_protocol = 'I';
        }
        _ => {} // Unknown protocol. Keep '?'.
    }
}

/// Zero or reset fields that don't make sense given other fields.
fn postprocess(packet: &mut PacketInfo) {
    let ip_known = packet.ip_protocol == 4 || packet.ip_protocol == 6;
    if !ip_known {
        packet.addresses = [None, None];
        packet.addr_len = 0;
        packet.app_protocol = '\0';
    }
    let has_ports = packet.app_protocol == 'T' || packet.app_protocol == 'U';
    if !has_ports {
        packet.ports = [0, 0];
        packet.hdr_length = 0;
    }
    let is_encapsulation = packet.app_protocol == '4' || packet.app_protocol == '6';
    if !is_encapsulation {
        packet.next = None;
    }
    if packet.app_protocol != 'T' {
        packet.tcp_flags = TcpFlags::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucollect_mem::Arena;

    fn ipv4_udp_packet() -> Vec<u8> {
        let mut p = vec![0u8; 20 + 8 + 4];
        p[0] = 0x45; // version 4, ihl 5
        p[9] = 17; // protocol UDP
        p[12..16].copy_from_slice(&[10, 0, 0, 1]);
        p[16..20].copy_from_slice(&[10, 0, 0, 2]);
        p[20..22].copy_from_slice(&1234u16.to_be_bytes());
        p[22..24].copy_from_slice(&53u16.to_be_bytes());
        p[24..26].copy_from_slice(&12u16.to_be_bytes()); // udp length
        p
    }

    #[test]
    fn decodes_raw_ipv4_udp() {
        let arena = Arena::create("test");
        let data = ipv4_udp_packet();
        let info = parse(&arena, &data, "eth0", Direction::In, LinkType::Raw);
        assert_eq!(info.ip_protocol, 4);
        assert_eq!(info.app_protocol, 'U');
        assert_eq!(info.addr_len, 4);
        assert_eq!(info.address(Endpoint::Src), Some(&[10, 0, 0, 1][..]));
        assert_eq!(info.port(Endpoint::Src), 1234);
        assert_eq!(info.port(Endpoint::Dst), 53);
        assert_eq!(info.hdr_length, 20 + 8);
    }

    #[test]
    fn short_ip_packet_is_rejected() {
        let arena = Arena::create("test");
        let data = [0x45u8, 0, 0, 0];
        let info = parse(&arena, &data, "eth0", Direction::In, LinkType::Raw);
        assert_eq!(info.ip_protocol, 0);
        assert_eq!(info.app_protocol, '\0');
    }

    #[test]
    fn ethernet_arp_is_tagged_without_ip_recursion() {
        let arena = Arena::create("test");
        let mut data = vec![0u8; 14];
        data[0..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        data[6..12].copy_from_slice(&[6, 5, 4, 3, 2, 1]);
        data[12..14].copy_from_slice(&0x0806u16.to_be_bytes());
        let info = parse(&arena, &data, "eth0", Direction::Unknown, LinkType::Ethernet);
        assert_eq!(info.app_protocol, 'A');
        assert!(info.next.is_none());
        assert_eq!(info.address(Endpoint::Dst), Some(&[1, 2, 3, 4, 5, 6][..]));
    }

    #[test]
    fn ethernet_vlan_tag_is_skipped() {
        let arena = Arena::create("test");
        let mut data = vec![0u8; 18 + 20];
        data[12..14].copy_from_slice(&0x8100u16.to_be_bytes());
        data[16..18].copy_from_slice(&0x0800u16.to_be_bytes());
        data[18] = 0x45;
        data[27] = 17; // UDP
        let info = parse(&arena, &data, "eth0", Direction::In, LinkType::Ethernet);
        assert_eq!(info.app_protocol, 'I');
        let inner = info.next.expect("ip layer present");
        assert_eq!(inner.ip_protocol, 4);
    }

    #[test]
    fn ipv4_in_ipv4_tunnel_recurses() {
        let arena = Arena::create("test");
        let inner = ipv4_udp_packet();
        let mut outer = vec![0u8; 20];
        outer[0] = 0x45;
        outer[9] = 4; // IPv4-in-IPv4
        outer[12..16].copy_from_slice(&[192, 168, 0, 1]);
        outer[16..20].copy_from_slice(&[192, 168, 0, 2]);
        outer.extend_from_slice(&inner);
        let info = parse(&arena, &outer, "eth0", Direction::In, LinkType::Raw);
        assert_eq!(info.app_protocol, '4');
        let tunneled = info.next.expect("tunneled packet present");
        assert_eq!(tunneled.app_protocol, 'U');
        assert_eq!(tunneled.port(Endpoint::Dst), 53);
    }

    #[test]
    fn too_short_tcp_keeps_unknown_protocol() {
        let arena = Arena::create("test");
        let mut data = vec![0u8; 20 + 4];
        data[0] = 0x45;
        data[9] = 6; // TCP, but only 4 bytes follow the IP header
        let info = parse(&arena, &data, "eth0", Direction::In, LinkType::Raw);
        assert_eq!(info.app_protocol, '?');
        assert_eq!(info.hdr_length, 0); // postprocess zeroes it: no ports recognized
    }
}
