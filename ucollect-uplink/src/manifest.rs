//! The plugin version manifest (`V` frame), sent on every (re)connect and
//! whenever the plugin set or any plugin's activation changes.

use crate::opcode::Outgoing;
use crate::render::{encode_bool, encode_string, encode_u32};
use crate::framing::Frame;

/// Number of identity-hash bytes sent as the plugin's "library hash prefix"
/// — enough to disambiguate rebuilds without sending the full SHA-256.
pub const HASH_PREFIX_LEN: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginManifestEntry {
    pub name: String,
    pub version: u16,
    pub hash_prefix: [u8; HASH_PREFIX_LEN],
    /// Stands in for the original's "basename of the `.so` on disk" —
    /// plugins are statically linked here, so this is just the plugin's
    /// own name again, kept as a distinct field so the wire shape matches.
    pub basename: String,
    pub active: bool,
}

pub fn encode_manifest(entries: &[PluginManifestEntry]) -> Frame {
    let mut payload = Vec::new();
    encode_u32(&mut payload, entries.len() as u32);
    for entry in entries {
        encode_string(&mut payload, &entry.name);
        encode_u32(&mut payload, entry.version as u32);
        payload.extend_from_slice(&entry.hash_prefix);
        encode_string(&mut payload, &entry.basename);
        encode_bool(&mut payload, entry.active);
    }
    Frame::new(Outgoing::Manifest.byte(), payload)
}
