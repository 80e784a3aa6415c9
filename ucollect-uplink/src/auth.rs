//! Challenge/response authentication. The original opens a real hardware
//! crypto chip over a local bus, reads its burned-in serial number, and
//! asks it to compute the HMAC response so the shared secret never has to
//! live in the collector's own memory. `HardwareCryptoChip` is the seam for
//! that; `SoftwareHmacChip` is the fallback for machines without the chip
//! (most development and CI environments), doing the same HMAC-SHA256 in
//! process with a compiled-in half-secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Half of the shared secret baked into the binary, concatenated with the
/// server-supplied half to form the full challenge. 16 bytes, matching the
/// original's `HALF_SIZE`/`PASSWD_HALF`.
pub const HALF_SIZE: usize = 16;
/// Total challenge length given to the chip, matching `CHALLENGE_LEN`.
pub const CHALLENGE_LEN: usize = 32;

/// Abstracts over "the thing that turns a challenge into a response and
/// also knows a serial number". A real implementation talks to hardware;
/// [`SoftwareHmacChip`] computes the same thing locally.
pub trait HardwareCryptoChip {
    /// The device's serial number, sent to the server as part of `L`.
    fn serial(&mut self) -> Vec<u8>;
    /// Compute the HMAC-style response to a full `CHALLENGE_LEN`-byte
    /// challenge.
    fn respond(&mut self, challenge: &[u8; CHALLENGE_LEN]) -> Vec<u8>;
}

/// In-process HMAC-SHA256 stand-in for the hardware chip. Fine for
/// development/test and for deployments that accept a software-only trust
/// model; real field devices supply their own `HardwareCryptoChip`.
pub struct SoftwareHmacChip {
    serial: Vec<u8>,
    key: Vec<u8>,
}

impl SoftwareHmacChip {
    pub fn new(serial: Vec<u8>, key: Vec<u8>) -> Self {
        SoftwareHmacChip { serial, key }
    }
}

impl HardwareCryptoChip for SoftwareHmacChip {
    fn serial(&mut self) -> Vec<u8> {
        self.serial.clone()
    }

    fn respond(&mut self, challenge: &[u8; CHALLENGE_LEN]) -> Vec<u8> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(challenge);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Build the full challenge the chip signs: our compiled-in half followed
/// by the server's bytes. Returns `None` if the server didn't send exactly
/// `CHALLENGE_LEN - HALF_SIZE` bytes.
pub fn build_challenge(local_half: &[u8; HALF_SIZE], server_bytes: &[u8]) -> Option<[u8; CHALLENGE_LEN]> {
    if server_bytes.len() != CHALLENGE_LEN - HALF_SIZE {
        return None;
    }
    let mut challenge = [0u8; CHALLENGE_LEN];
    challenge[..HALF_SIZE].copy_from_slice(local_half);
    challenge[HALF_SIZE..].copy_from_slice(server_bytes);
    Some(challenge)
}
