//! Ties framing, rendering, auth, state and dispatch together into the
//! per-connection protocol logic. Deliberately has no socket of its own —
//! the reactor (`ucollect-core`) owns the actual child-transport fd and
//! feeds bytes in/out through [`crate::framing::FrameReader`]/[`FrameWriter`];
//! this struct only ever sees already-framed [`Frame`]s.

use std::net::IpAddr;
use std::time::Duration;

use crate::auth::{build_challenge, HardwareCryptoChip, HALF_SIZE};
use crate::dispatch::PluginDispatch;
use crate::framing::Frame;
use crate::manifest::encode_manifest;
use crate::opcode::{ErrorKind, Incoming, Outgoing};
use crate::render::{encode_string, encode_u32, Reader};
use crate::state::{
    AddressFamily, AddressFamilyAlternator, AttemptRateLimiter, ConnectionState, LoginFailureTracker, ReconnectBackoff,
};

/// Ping every 60s; two consecutive unanswered pings force a reconnect.
pub const PING_INTERVAL: Duration = Duration::from_secs(60);
const MAX_UNANSWERED_PINGS: u32 = 2;

pub struct UplinkSession {
    state: ConnectionState,
    backoff: ReconnectBackoff,
    login_failures: LoginFailureTracker,
    rate_limiter: AttemptRateLimiter,
    address_family: AddressFamilyAlternator,
    pings_unanswered: u32,
    saw_data_while_authenticated: bool,
    resolved_addresses: Vec<IpAddr>,
    session_id: u32,
    local_half: [u8; HALF_SIZE],
    proto_version: u8,
}

/// What the caller should do after feeding one incoming frame through
/// [`UplinkSession::on_incoming`].
#[derive(Default)]
pub struct IncomingOutcome {
    pub frames: Vec<Frame>,
    pub disconnect: bool,
    pub abort_process: bool,
}

pub enum PingOutcome {
    Send(Frame),
    ForceReconnect,
}

impl UplinkSession {
    pub fn new(session_id: u32, local_half: [u8; HALF_SIZE], proto_version: u8) -> Self {
        UplinkSession {
            state: ConnectionState::NotStarted,
            backoff: ReconnectBackoff::new(),
            login_failures: LoginFailureTracker::new(),
            rate_limiter: AttemptRateLimiter::new(),
            address_family: AddressFamilyAlternator::new(),
            pings_unanswered: 0,
            saw_data_while_authenticated: false,
            resolved_addresses: Vec::new(),
            session_id,
            local_half,
            proto_version,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn resolved_addresses(&self) -> &[IpAddr] {
        &self.resolved_addresses
    }

    pub fn set_resolved_addresses(&mut self, addrs: Vec<IpAddr>) {
        self.resolved_addresses = addrs;
    }

    /// Whether a new connection attempt is allowed right now (per-second
    /// rate limit).
    pub fn attempt_allowed(&mut self, now: Duration) -> bool {
        self.rate_limiter.allow(now)
    }

    /// Delay before the next reconnect attempt, given how this one ended.
    pub fn next_reconnect_delay(&mut self) -> Duration {
        let delay = self.backoff.next_delay(self.state);
        self.state = ConnectionState::NotStarted;
        delay
    }

    /// Address family to dial on the next connection attempt; alternates
    /// every call so a host with only one working family still gets
    /// through on every other attempt.
    pub fn next_address_family(&mut self) -> AddressFamily {
        self.address_family.next_family()
    }

    /// Called once a fresh transport connection is up, before any frames
    /// have been exchanged on it.
    pub fn on_connected(&mut self) {
        if self.saw_data_while_authenticated {
            self.backoff.reset();
        }
        self.saw_data_while_authenticated = false;
        self.pings_unanswered = 0;
    }

    /// Handle the server's `C` challenge: build `S`, `L`, `H` and move to
    /// `Sent`. Returns `None` (caller should disconnect) if the challenge
    /// is malformed.
    pub fn on_challenge(&mut self, server_bytes: &[u8], chip: &mut dyn HardwareCryptoChip) -> Option<Vec<Frame>> {
        let challenge = build_challenge(&self.local_half, server_bytes)?;
        let response = chip.respond(&challenge);
        let serial = chip.serial();

        let mut session_payload = Vec::new();
        encode_u32(&mut session_payload, self.session_id);

        let mut login_payload = Vec::new();
        encode_string_bytes(&mut login_payload, &serial);
        encode_string_bytes(&mut login_payload, &response);

        let hello = Frame::new(Outgoing::Hello.byte(), vec![self.proto_version]);

        self.state = ConnectionState::Sent;
        Some(vec![
            Frame::new(Outgoing::SessionId.byte(), session_payload),
            Frame::new(Outgoing::LoginResponse.byte(), login_payload),
            hello,
        ])
    }

    /// Handle any other incoming frame.
    pub fn on_incoming(&mut self, incoming: Incoming, payload: &[u8], dispatch: &mut dyn PluginDispatch) -> IncomingOutcome {
        let mut outcome = IncomingOutcome::default();
        match incoming {
            Incoming::Challenge => {
                // Handled by `on_challenge` — a caller routing through here
                // for `C` is a usage error, not a protocol one.
            }
            Incoming::PluginData => {
                self.mark_data_seen();
                let mut r = Reader::new(payload);
                let Some(name) = r.read_string() else {
                    outcome.disconnect = true;
                    return outcome;
                };
                let name = name.to_string();
                let rest = r.rest().to_vec();
                if dispatch.send_to_plugin(&name, &rest) {
                    // Status dump on successful delivery is the reactor's
                    // job (it owns the status writer + clock).
                } else {
                    tracing::warn!(plugin = %name, "uplink referenced a plugin that does not exist or is inactive");
                    outcome.frames.push(build_error_frame(ErrorKind::UnknownOrInactivePlugin, &name));
                }
            }
            Incoming::Ping => {
                self.mark_data_seen();
                outcome.frames.push(Frame::new(Outgoing::Pong.byte(), payload.to_vec()));
            }
            Incoming::Pong => {
                self.pings_unanswered = 0;
            }
            Incoming::LoginRejected => {
                tracing::error!("server rejected our authentication");
                self.state = ConnectionState::Failed;
                outcome.disconnect = true;
                if self.login_failures.record_failure() {
                    outcome.abort_process = true;
                }
            }
            Incoming::Activation => {
                self.mark_data_seen();
                // Activation-list parsing/application lives with the
                // configurator, which owns the plugin set; this layer just
                // hands the raw payload through via `outcome` if a caller
                // needs it (left to the reactor's own dispatch).
            }
        }
        outcome
    }

    fn mark_data_seen(&mut self) {
        self.login_failures.reset();
        if self.state == ConnectionState::Sent || self.state == ConnectionState::Authenticated {
            self.state = ConnectionState::Authenticated;
            self.saw_data_while_authenticated = true;
        }
    }

    /// Called on the 60s ping timer. Sends a ping unless two in a row have
    /// already gone unanswered, in which case the caller should force a
    /// reconnect instead.
    pub fn ping_tick(&mut self) -> PingOutcome {
        if self.pings_unanswered >= MAX_UNANSWERED_PINGS {
            return PingOutcome::ForceReconnect;
        }
        self.pings_unanswered += 1;
        PingOutcome::Send(Frame::new(Outgoing::Ping.byte(), Vec::new()))
    }

    pub fn build_manifest_frame(&self, dispatch: &dyn PluginDispatch) -> Frame {
        encode_manifest(&dispatch.manifest())
    }

    pub fn build_config_request(&self) -> Frame {
        Frame::new(Outgoing::ConfigRequest.byte(), Vec::new())
    }
}

fn encode_string_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn build_error_frame(kind: ErrorKind, plugin_name: &str) -> Frame {
    let mut payload = vec![kind.byte()];
    encode_string(&mut payload, plugin_name);
    Frame::new(Outgoing::Error.byte(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SoftwareHmacChip, CHALLENGE_LEN};
    use crate::dispatch::RecordingDispatch;
    use std::collections::HashSet;

    fn session() -> UplinkSession {
        UplinkSession::new(4242, [7u8; HALF_SIZE], 3)
    }

    #[test]
    fn challenge_produces_session_login_and_hello_in_order() {
        let mut s = session();
        let mut chip = SoftwareHmacChip::new(vec![1, 2, 3], vec![9; 16]);
        let server_bytes = vec![0u8; CHALLENGE_LEN - HALF_SIZE];
        let frames = s.on_challenge(&server_bytes, &mut chip).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].kind, Outgoing::SessionId.byte());
        assert_eq!(frames[1].kind, Outgoing::LoginResponse.byte());
        assert_eq!(frames[2].kind, Outgoing::Hello.byte());
        assert_eq!(frames[2].payload, vec![3]);
        assert_eq!(s.state(), ConnectionState::Sent);
    }

    #[test]
    fn malformed_challenge_is_rejected() {
        let mut s = session();
        let mut chip = SoftwareHmacChip::new(vec![1], vec![9]);
        let frames = s.on_challenge(&[0, 1, 2], &mut chip);
        assert!(frames.is_none());
    }

    #[test]
    fn plugin_data_to_an_active_plugin_is_delivered() {
        let mut s = session();
        s.state = ConnectionState::Sent;
        let mut dispatch = RecordingDispatch {
            active: HashSet::from(["Count".to_string()]),
            received: Vec::new(),
        };
        let mut payload = Vec::new();
        encode_string(&mut payload, "Count");
        payload.extend_from_slice(&[1, 2, 3]);
        let outcome = s.on_incoming(Incoming::PluginData, &payload, &mut dispatch);
        assert!(outcome.frames.is_empty());
        assert!(!outcome.disconnect);
        assert_eq!(dispatch.received, vec![("Count".to_string(), vec![1, 2, 3])]);
        assert_eq!(s.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn plugin_data_to_an_unknown_plugin_yields_an_error_frame() {
        let mut s = session();
        let mut dispatch = RecordingDispatch {
            active: HashSet::new(),
            received: Vec::new(),
        };
        let mut payload = Vec::new();
        encode_string(&mut payload, "Ghost");
        let outcome = s.on_incoming(Incoming::PluginData, &payload, &mut dispatch);
        assert_eq!(outcome.frames.len(), 1);
        assert_eq!(outcome.frames[0].kind, Outgoing::Error.byte());
        assert_eq!(outcome.frames[0].payload[0], ErrorKind::UnknownOrInactivePlugin.byte());
    }

    #[test]
    fn server_ping_is_echoed_as_pong() {
        let mut s = session();
        let mut dispatch = RecordingDispatch {
            active: HashSet::new(),
            received: Vec::new(),
        };
        let outcome = s.on_incoming(Incoming::Ping, &[1, 2], &mut dispatch);
        assert_eq!(outcome.frames, vec![Frame::new(Outgoing::Pong.byte(), vec![1, 2])]);
    }

    #[test]
    fn login_rejection_forces_failed_state_and_disconnect() {
        let mut s = session();
        let mut dispatch = RecordingDispatch {
            active: HashSet::new(),
            received: Vec::new(),
        };
        let outcome = s.on_incoming(Incoming::LoginRejected, &[], &mut dispatch);
        assert_eq!(s.state(), ConnectionState::Failed);
        assert!(outcome.disconnect);
        assert!(!outcome.abort_process);
    }

    #[test]
    fn ten_consecutive_rejections_abort_the_process() {
        let mut s = session();
        let mut dispatch = RecordingDispatch {
            active: HashSet::new(),
            received: Vec::new(),
        };
        let mut last = IncomingOutcome::default();
        for _ in 0..10 {
            last = s.on_incoming(Incoming::LoginRejected, &[], &mut dispatch);
        }
        assert!(last.abort_process);
    }

    #[test]
    fn ping_tick_forces_reconnect_after_two_unanswered() {
        let mut s = session();
        assert!(matches!(s.ping_tick(), PingOutcome::Send(_)));
        assert!(matches!(s.ping_tick(), PingOutcome::Send(_)));
        assert!(matches!(s.ping_tick(), PingOutcome::ForceReconnect));
    }

    #[test]
    fn pong_resets_the_unanswered_counter() {
        let mut s = session();
        let mut dispatch = RecordingDispatch {
            active: HashSet::new(),
            received: Vec::new(),
        };
        s.ping_tick();
        s.ping_tick();
        s.on_incoming(Incoming::Pong, &[], &mut dispatch);
        assert!(matches!(s.ping_tick(), PingOutcome::Send(_)));
    }

    #[test]
    fn address_family_alternates_across_reconnects() {
        let mut s = session();
        assert_eq!(s.next_address_family(), AddressFamily::V4);
        assert_eq!(s.next_address_family(), AddressFamily::V6);
    }

    #[test]
    fn backoff_resets_only_after_a_session_that_saw_data_while_authenticated() {
        let mut s = session();
        s.on_connected();
        let mut dispatch = RecordingDispatch {
            active: HashSet::from(["Count".to_string()]),
            received: Vec::new(),
        };
        s.state = ConnectionState::Sent;
        let mut payload = Vec::new();
        encode_string(&mut payload, "Count");
        s.on_incoming(Incoming::PluginData, &payload, &mut dispatch);
        assert!(s.saw_data_while_authenticated);
        // Simulate disconnect + reconnect.
        let delay_before_reset = s.next_reconnect_delay();
        assert_eq!(delay_before_reset, Duration::from_secs(4));
        s.on_connected();
        assert!(!s.saw_data_while_authenticated);
    }
}
