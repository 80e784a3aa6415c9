use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use ucollect_packet::{Direction, LinkType};

use crate::error::CaptureError;
use crate::source::{CaptureSource, CaptureStats};

/// An in-memory `CaptureSource` for tests: frames are queued with `push`
/// and handed out in FIFO order by `dispatch`. Never exposes a real fd —
/// `fd()` returns `-1`, so this source can only be driven by calling
/// `dispatch` directly rather than through epoll.
pub struct MockCaptureSource {
    interface: String,
    direction: Direction,
    link_type: LinkType,
    queue: VecDeque<Vec<u8>>,
    fail_next: bool,
    stats: CaptureStats,
}

impl MockCaptureSource {
    pub fn new(interface: impl Into<String>, direction: Direction, link_type: LinkType) -> Self {
        MockCaptureSource {
            interface: interface.into(),
            direction,
            link_type,
            queue: VecDeque::new(),
            fail_next: false,
            stats: CaptureStats::default(),
        }
    }

    pub fn push(&mut self, frame: Vec<u8>) {
        self.queue.push_back(frame);
    }

    /// Set the counters the next `drop_counters()` call reports.
    pub fn set_stats(&mut self, stats: CaptureStats) {
        self.stats = stats;
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Make the next `dispatch` call return an error, simulating a
    /// capture-layer failure (e.g. the interface disappearing).
    pub fn fail_next_dispatch(&mut self) {
        self.fail_next = true;
    }
}

impl CaptureSource for MockCaptureSource {
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
        -1
    }

    fn dispatch(
        &mut self,
        max_packets: usize,
        on_packet: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, CaptureError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(CaptureError::Dispatch {
                interface: self.interface.clone(),
                source: pcap::Error::PcapError("simulated capture failure".into()),
            });
        }
        let mut delivered = 0;
        while delivered < max_packets {
            match self.queue.pop_front() {
                Some(frame) => {
                    on_packet(&frame);
                    delivered += 1;
                }
                None => break,
            }
        }
        Ok(delivered)
    }

    fn drop_counters(&mut self) -> CaptureStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_delivers_queued_frames_in_order() {
        let mut src = MockCaptureSource::new("eth0", Direction::In, LinkType::Raw);
        src.push(vec![1, 2, 3]);
        src.push(vec![4, 5, 6]);
        let mut seen = Vec::new();
        let n = src
            .dispatch(10, &mut |data| seen.push(data.to_vec()))
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(seen, vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(src.queued(), 0);
    }

    #[test]
    fn dispatch_respects_the_packets_per_call_cap() {
        let mut src = MockCaptureSource::new("eth0", Direction::In, LinkType::Raw);
        for i in 0..10u8 {
            src.push(vec![i]);
        }
        let mut count = 0;
        let n = src.dispatch(3, &mut |_| count += 1).unwrap();
        assert_eq!(n, 3);
        assert_eq!(count, 3);
        assert_eq!(src.queued(), 7);
    }

    #[test]
    fn drop_counters_reports_whatever_was_set() {
        let mut src = MockCaptureSource::new("eth0", Direction::In, LinkType::Raw);
        src.set_stats(CaptureStats {
            received: 10,
            dropped: 2,
            if_dropped: 1,
        });
        assert_eq!(
            src.drop_counters(),
            CaptureStats {
                received: 10,
                dropped: 2,
                if_dropped: 1,
            }
        );
    }

    #[test]
    fn fail_next_dispatch_surfaces_an_error_once() {
        let mut src = MockCaptureSource::new("eth0", Direction::In, LinkType::Raw);
        src.push(vec![1]);
        src.fail_next_dispatch();
        assert!(src.dispatch(10, &mut |_| {}).is_err());
        // The queued frame is still there and the next call succeeds.
        let mut count = 0;
        let n = src.dispatch(10, &mut |_| count += 1).unwrap();
        assert_eq!(n, 1);
        assert_eq!(count, 1);
    }
}
