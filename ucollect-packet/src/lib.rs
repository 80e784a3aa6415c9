//! Link/network/transport layer packet decoding.
//!
//! Takes a raw capture buffer plus the libpcap link-layer type it was
//! captured with, and produces a [`PacketInfo`] tree: one node per IP
//! layer, chained through `next` whenever a packet tunnels another one.

mod decode;
mod types;

pub use decode::parse;
pub use types::{Direction, Endpoint, Layer, LinkType, PacketInfo, TcpFlags, END_COUNT};
