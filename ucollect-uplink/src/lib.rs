//! Protocol logic for the uplink connection to the aggregation server:
//! framing, challenge/response auth, connection lifecycle/backoff, plugin
//! data demultiplexing and the version manifest. Deliberately has no socket
//! or clock of its own — `ucollect-core`'s reactor owns the actual
//! transport fd and feeds bytes and timer ticks in.

pub mod auth;
pub mod dispatch;
pub mod framing;
pub mod manifest;
pub mod opcode;
pub mod render;
pub mod session;
pub mod state;
pub mod status;

pub use auth::{HardwareCryptoChip, SoftwareHmacChip, CHALLENGE_LEN, HALF_SIZE};
pub use dispatch::PluginDispatch;
pub use framing::{Frame, FramingError, FrameReader, FrameWriter};
pub use manifest::{encode_manifest, PluginManifestEntry, HASH_PREFIX_LEN};
pub use opcode::{ErrorKind, Incoming, Outgoing};
pub use session::{IncomingOutcome, PingOutcome, UplinkSession, PING_INTERVAL};
pub use state::{
    AddressFamily, AddressFamilyAlternator, AttemptRateLimiter, ConnectionState, LoginFailureTracker, ReconnectBackoff,
    LOGIN_FAILURE_LIMIT,
};
pub use status::{Status, StatusWriter};
