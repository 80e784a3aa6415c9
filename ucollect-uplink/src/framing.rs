//! Wire framing: `length:u32 BE || type:u8 || payload`, streamed through a
//! long-lived zlib stream per direction (one `Compress`/`Decompress` object
//! for the whole connection, not per message).

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use thiserror::Error;

/// One logical message, already framed (header stripped/attached).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: u8, payload: Vec<u8>) -> Self {
        Frame { kind, payload }
    }
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("zlib stream corrupt: {0}")]
    Inflate(#[from] flate2::DecompressError),
    #[error("zlib stream error while deflating: {0}")]
    Deflate(#[from] flate2::CompressError),
}

/// Deflates outgoing frames into a single streaming zlib session. Each
/// frame is flushed with `Z_SYNC_FLUSH` so the peer can decode it as soon
/// as it arrives, while still sharing compression state across frames.
pub struct FrameWriter {
    compress: Compress,
}

impl FrameWriter {
    pub fn new() -> Self {
        FrameWriter {
            compress: Compress::new(Compression::default(), true),
        }
    }

    /// Deflate one frame's raw bytes (header + payload) and return the
    /// compressed bytes to send on the wire. The length prefix counts the
    /// type byte plus the payload, not the payload alone.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<Vec<u8>, FramingError> {
        let mut raw = Vec::with_capacity(5 + frame.payload.len());
        raw.extend_from_slice(&((frame.payload.len() + 1) as u32).to_be_bytes());
        raw.push(frame.kind);
        raw.extend_from_slice(&frame.payload);
        self.deflate_raw(&raw)
    }

    fn deflate_raw(&mut self, raw: &[u8]) -> Result<Vec<u8>, FramingError> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 4096];
        let mut consumed = 0;
        while consumed < raw.len() {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            self.compress
                .compress(&raw[consumed..], &mut chunk, FlushCompress::None)?;
            consumed += (self.compress.total_in() - before_in) as usize;
            out.extend_from_slice(&chunk[..(self.compress.total_out() - before_out) as usize]);
        }
        // Sync-flush so the peer's inflate can decode everything up to here.
        loop {
            let before_out = self.compress.total_out();
            let status = self.compress.compress(&[], &mut chunk, FlushCompress::Sync)?;
            out.extend_from_slice(&chunk[..(self.compress.total_out() - before_out) as usize]);
            if status == Status::Ok && self.compress.total_out() - before_out < chunk.len() as u64 {
                break;
            }
            if status == Status::BufError {
                break;
            }
        }
        Ok(out)
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    Length,
    Body { kind_and_len: Option<(u8, u32)> },
}

/// Inflates incoming bytes and reassembles frames. Feed raw (compressed)
/// bytes in with `feed`; pull completed frames out with `next_frame`.
pub struct FrameReader {
    decompress: Decompress,
    inflated: Vec<u8>,
    state: ReadState,
    pending_len: Option<u32>,
}

impl FrameReader {
    pub fn new() -> Self {
        FrameReader {
            decompress: Decompress::new(true),
            inflated: Vec::new(),
            state: ReadState::Length,
            pending_len: None,
        }
    }

    /// Feed freshly received (compressed) bytes into the stream.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), FramingError> {
        let mut out = vec![0u8; 4096];
        let mut offset = 0;
        while offset < data.len() {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(&data[offset..], &mut out, FlushDecompress::None)?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;
            self.inflated.extend_from_slice(&out[..produced]);
            offset += consumed;
            // Stuck without using any input or producing any output: wait
            // for the next `feed()` call rather than spin.
            if consumed == 0 && produced == 0 {
                break;
            }
            if status == Status::StreamEnd {
                break;
            }
        }
        Ok(())
    }

    /// Pop the next fully-reassembled frame, if enough inflated bytes have
    /// accumulated.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                ReadState::Length => {
                    if self.inflated.len() < 4 {
                        return None;
                    }
                    let len = u32::from_be_bytes(self.inflated[0..4].try_into().unwrap());
                    self.inflated.drain(0..4);
                    self.pending_len = Some(len);
                    self.state = ReadState::Body { kind_and_len: None };
                }
                ReadState::Body { .. } => {
                    // `len` counts the 1-byte type plus the payload.
                    let len = self.pending_len.expect("length read before body state") as usize;
                    if self.inflated.len() < len {
                        return None;
                    }
                    let kind = self.inflated[0];
                    let payload = self.inflated[1..len].to_vec();
                    self.inflated.drain(0..len);
                    self.state = ReadState::Length;
                    self.pending_len = None;
                    return Some(Frame::new(kind, payload));
                }
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
