use std::os::unix::io::{AsRawFd, RawFd};

use ucollect_packet::{Direction, LinkType};

use crate::error::CaptureError;

pub const DEFAULT_SNAPLEN: i32 = 65535;
pub const DEFAULT_TIMEOUT_MS: i32 = 100;
pub const DEFAULT_MAX_PACKETS_PER_CALL: usize = 256;

/// Capture counters for one interface, mirroring `pcap_stats(3)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CaptureStats {
    pub received: u32,
    pub dropped: u32,
    pub if_dropped: u32,
}

/// One open capture handle for an (interface, direction) pair.
///
/// Implementors own a selectable fd the reactor polls for readability;
/// `dispatch` is called once the fd is readable and must not block for
/// longer than the source's own internal read timeout.
pub trait CaptureSource {
    fn interface(&self) -> &str;
    fn direction(&self) -> Direction;
    fn link_type(&self) -> LinkType;
    fn fd(&self) -> RawFd;

    /// Deliver up to `max_packets` frames to `on_packet`, returning how
    /// many were actually delivered. Bounding the batch keeps one very
    /// busy interface from starving the rest of the reactor.
    fn dispatch(
        &mut self,
        max_packets: usize,
        on_packet: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, CaptureError>;

    /// Current drop counters for this interface. Never fails — a source
    /// unable to read its own counters reports zeros and logs the cause.
    fn drop_counters(&mut self) -> CaptureStats;
}

/// A `CaptureSource` backed by libpcap, in non-blocking mode with a short
/// internal read timeout so a quiet interface never stalls the reactor.
pub struct PcapCaptureSource {
    interface: String,
    direction: Direction,
    link_type: LinkType,
    capture: pcap::Capture<pcap::Active>,
}

impl PcapCaptureSource {
    pub fn open(interface: &str, direction: Direction, promiscuous: bool) -> Result<Self, CaptureError> {
        let pcap_direction = match direction {
            Direction::In => pcap::Direction::In,
            Direction::Out => pcap::Direction::Out,
            Direction::Unknown => pcap::Direction::InOut,
        };

        let mut capture = pcap::Capture::from_device(interface)
            .map_err(|e| CaptureError::Open {
                interface: interface.to_string(),
                source: e,
            })?
            .promisc(promiscuous)
            .snaplen(DEFAULT_SNAPLEN)
            .timeout(DEFAULT_TIMEOUT_MS)
            .open()
            .map_err(|e| CaptureError::Activate {
                interface: interface.to_string(),
                source: e,
            })?;

        capture
            .set_nonblock()
            .map_err(|e| CaptureError::Activate {
                interface: interface.to_string(),
                source: e,
            })?;
        capture.direction(pcap_direction).map_err(|e| CaptureError::Activate {
            interface: interface.to_string(),
            source: e,
        })?;

        let link_type = LinkType::from_dlt(capture.get_datalink().0);
        tracing::info!(interface, ?direction, ?link_type, "capture source opened");

        Ok(PcapCaptureSource {
            interface: interface.to_string(),
            direction,
            link_type,
            capture,
        })
    }
}

impl CaptureSource for PcapCaptureSource {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn fd(&self) -> RawFd {
        self.capture.as_raw_fd()
    }

    fn dispatch(
        &mut self,
        max_packets: usize,
        on_packet: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, CaptureError> {
        let mut delivered = 0;
        while delivered < max_packets {
            match self.capture.next_packet() {
                Ok(packet) => {
                    on_packet(packet.data);
                    delivered += 1;
                }
                Err(pcap::Error::TimeoutExpired) => break,
                Err(pcap::Error::NoMorePackets) => break,
                Err(source) => {
                    return Err(CaptureError::Dispatch {
                        interface: self.interface.clone(),
                        source,
                    })
                }
            }
        }
        Ok(delivered)
    }

    fn drop_counters(&mut self) -> CaptureStats {
        match self.capture.stats() {
            Ok(stat) => CaptureStats {
                received: stat.received,
                dropped: stat.dropped,
                if_dropped: stat.if_dropped,
            },
            Err(source) => {
                tracing::warn!(interface = %self.interface, %source, "failed to read capture stats");
                CaptureStats::default()
            }
        }
    }
}
