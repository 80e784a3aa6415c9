//! Frame type bytes, grounded on `original_source/src/core/uplink.c`'s
//! `uplink_send_message`/incoming-`switch` opcode literals.

/// Outgoing message types (client -> server).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outgoing {
    SessionId,
    LoginResponse,
    Hello,
    PluginData,
    Ping,
    Pong,
    Manifest,
    Error,
    ConfigRequest,
}

impl Outgoing {
    pub fn byte(self) -> u8 {
        match self {
            Outgoing::SessionId => b'S',
            Outgoing::LoginResponse => b'L',
            Outgoing::Hello => b'H',
            Outgoing::PluginData => b'R',
            Outgoing::Ping => b'P',
            Outgoing::Pong => b'p',
            Outgoing::Manifest => b'V',
            Outgoing::Error => b'E',
            Outgoing::ConfigRequest => b'C',
        }
    }
}

/// Incoming message types (server -> client).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Incoming {
    Challenge,
    PluginData,
    Ping,
    Pong,
    LoginRejected,
    Activation,
}

impl Incoming {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'C' => Some(Incoming::Challenge),
            b'R' => Some(Incoming::PluginData),
            b'P' => Some(Incoming::Ping),
            b'p' => Some(Incoming::Pong),
            b'F' => Some(Incoming::LoginRejected),
            b'A' => Some(Incoming::Activation),
            _ => None,
        }
    }
}

/// Sub-opcode carried in the first byte of an `Error` frame's payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// Referenced plugin is unknown, or present but not active.
    UnknownOrInactivePlugin,
}

impl ErrorKind {
    pub fn byte(self) -> u8 {
        match self {
            ErrorKind::UnknownOrInactivePlugin => b'P',
        }
    }
}
