use bitflags::bitflags;

/// Which endpoint of a communication an address/port field describes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Endpoint {
    Src,
    Dst,
}

pub const END_COUNT: usize = 2;

/// Direction the packet travelled relative to the monitored interface.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Direction {
    In,
    Out,
    #[default]
    Unknown,
}

impl Direction {
    /// Which endpoint is the *remote* one for this direction. `None` when
    /// the direction itself is unknown (can't say which side is remote).
    pub fn remote_endpoint(self) -> Option<Endpoint> {
        match self {
            Direction::In => Some(Endpoint::Src),
            Direction::Out => Some(Endpoint::Dst),
            Direction::Unknown => None,
        }
    }
}

bitflags! {
    /// TCP control bits, in the same bit positions as the wire byte (the
    /// ECE/CWR/NS bits are not tracked, matching the upstream 6-bit mask).
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct TcpFlags: u8 {
        const FIN   = 1 << 0;
        const SYN   = 1 << 1;
        const RESET = 1 << 2;
        const PUSH  = 1 << 3;
        const ACK   = 1 << 4;
        const URG   = 1 << 5;
    }
}

/// Which framing this packet was captured with.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Layer {
    Ethernet,
    /// Raw IP, no link-layer framing (used for tunnel payloads too).
    Ip,
    /// Linux "cooked" capture (`DLT_LINUX_SLL`).
    Cooked,
    #[default]
    Unknown,
}

/// libpcap link-layer type constants this crate understands, mirrored from
/// `<pcap/pcap.h>` (`DLT_*`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LinkType {
    /// `DLT_EN10MB` — Ethernet II.
    Ethernet,
    /// `DLT_IEEE802` — same wire format as Ethernet II for our purposes.
    Ieee802,
    /// `DLT_RAW` — no link layer, starts directly at an IP header.
    Raw,
    /// `DLT_LINUX_SLL` — Linux "cooked" capture.
    LinuxCooked,
    Other(i32),
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => LinkType::Ethernet,   // DLT_EN10MB
            6 => LinkType::Ieee802,    // DLT_IEEE802
            12 | 101 => LinkType::Raw, // DLT_RAW (BSD value 12, Linux value 101)
            113 => LinkType::LinuxCooked, // DLT_LINUX_SLL
            other => LinkType::Other(other),
        }
    }
}

/// One packet, decoded layer by layer. A single capture produces a chain of
/// these linked through `next` whenever one IP packet is tunneled inside
/// another (`app_protocol` `'4'`/`'6'`).
pub struct PacketInfo<'a> {
    pub data: &'a [u8],
    pub interface: &'a str,
    pub direction: Direction,

    pub layer: Layer,
    pub layer_raw: LinkType,

    /// Combined length of the IP and transport headers; used to locate the
    /// application payload. Zero unless both `ip_protocol` is 4/6 and
    /// `app_protocol` is `'T'`/`'U'`.
    pub hdr_length: usize,

    /// Source/destination addresses, raw bytes borrowed from `data`.
    /// Present only for Ethernet frames or IP packets.
    pub addresses: [Option<&'a [u8]>; END_COUNT],
    pub addr_len: u8,

    /// Source/destination ports, host byte order. Zero unless
    /// `app_protocol` is `'T'`/`'U'`.
    pub ports: [u16; END_COUNT],

    /// 4 or 6 for IPv4/IPv6, 0 if this layer isn't IP at all.
    pub ip_protocol: u8,
    /// The IP protocol number as carried on the wire (255 if `ip_protocol`
    /// is neither 4 nor 6).
    pub app_protocol_raw: u8,
    /// Friendly classification: 'T'/'U'/'i'/'I'/'4'/'6'/'?' on the IP
    /// layer, or 'I'/'A'/'W'/'X'/'E'/'P'/'a' on the Ethernet layer. Zero
    /// byte when nothing applicable.
    pub app_protocol: char,

    pub tcp_flags: TcpFlags,

    /// The packet tunneled inside this one, when `app_protocol` is
    /// `'4'`/`'6'`.
    pub next: Option<&'a PacketInfo<'a>>,
}

impl<'a> PacketInfo<'a> {
    pub(crate) fn new(data: &'a [u8], interface: &'a str, direction: Direction) -> Self {
        PacketInfo {
            data,
            interface,
            direction,
            layer: Layer::Unknown,
            layer_raw: LinkType::Other(-1),
            hdr_length: 0,
            addresses: [None, None],
            addr_len: 0,
            ports: [0, 0],
            ip_protocol: 0,
            app_protocol_raw: 0xff,
            app_protocol: '\0',
            tcp_flags: TcpFlags::empty(),
            next: None,
        }
    }

    pub fn address(&self, end: Endpoint) -> Option<&'a [u8]> {
        self.addresses[end as usize]
    }

    pub fn port(&self, end: Endpoint) -> u16 {
        self.ports[end as usize]
    }
}
