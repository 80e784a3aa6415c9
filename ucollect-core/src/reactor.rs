//! The event loop: one OS thread, one pass per iteration. Ties
//! [`ReactorHost`], [`Configurator`], [`UplinkSession`] and the installed
//! signal receiver together the way `ucollect_plugin`/`ucollect_uplink`
//! expect to be driven, without any of those crates knowing this type
//! exists.
//!
//! Readiness is polled with `libc::poll` over every live capture/plugin fd
//! plus the uplink socket, capped at a short maximum wait so the signal
//! channel (not itself fd-backed) still gets checked promptly even when
//! nothing is ready. A single-worker `monoio` runtime wraps the whole loop
//! so process startup/shutdown go through the same async entry point the
//! rest of the ambient stack uses, even though the per-iteration I/O below
//! is synchronous.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use ucollect_capture::CaptureSource;
use ucollect_config::{ConfigHost, Configurator, GatewayConfig, LoadError};
use ucollect_mem::Arena;
use ucollect_plugin::TimerId;
use ucollect_uplink::{
    AddressFamily, ConnectionState, Frame, FrameReader, FrameWriter, HardwareCryptoChip, Incoming, IncomingOutcome,
    Outgoing, PingOutcome, Status, StatusWriter, UplinkSession, PING_INTERVAL,
};

use crate::fault::{self, GuardOutcome};
use crate::host::{ReactorHost, UplinkRequest};
use crate::persistence::FaultState;
use crate::signals::{self, Signal};
use crate::watchdog::{IterationWatchdog, SystemAlarmClock};

/// Never let one interface's backlog starve every other fd in the batch.
const MAX_PACKETS_PER_DISPATCH: usize = 256;
/// Upper bound on one `poll(2)` wait, so the (non-fd-backed) signal channel
/// is still checked promptly even with no fds ready and no timer due.
const MAX_POLL_WAIT: Duration = Duration::from_millis(1000);
const FAILURE_THRESHOLD: u32 = ucollect_plugin::DEFAULT_FAILURE_THRESHOLD;

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
}

/// A timer the reactor armed for itself rather than on behalf of a plugin.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum InternalTimer {
    Ping,
    ReconnectAttempt,
    ReconfigureRetry,
    InterfaceWatchdog(usize),
}

pub struct Reactor {
    host: ReactorHost,
    configurator: Configurator<ReactorHost>,
    session: UplinkSession,
    crypto: Box<dyn HardwareCryptoChip>,
    frame_writer: FrameWriter,
    frame_reader: FrameReader,
    socket: Option<TcpStream>,
    uplink_host: String,
    uplink_service: String,
    status: StatusWriter,
    signals: crossbeam_channel::Receiver<Signal>,
    watchdog: IterationWatchdog<SystemAlarmClock>,
    batch_arena: Arena,
    internal_timers: HashMap<u64, InternalTimer>,
    config_dir: PathBuf,
    config_package: String,
    require_uplink: bool,
    pending_reconfigure: Option<bool>,
    running: bool,
    /// Per-plugin fault-isolation failure counts and permanent exclusions,
    /// persisted to disk. Consulted by `apply_config` so a later
    /// disk-driven reconfiguration (HUP/USR1, or a reconfigure-retry timer)
    /// doesn't just declare a permanently-omitted plugin right back from
    /// the config file.
    fault_state: FaultState,
}

impl Reactor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: ReactorHost,
        crypto: Box<dyn HardwareCryptoChip>,
        session_id: u32,
        local_half: [u8; ucollect_uplink::HALF_SIZE],
        proto_version: u8,
        status: StatusWriter,
        config_dir: PathBuf,
        config_package: String,
        require_uplink: bool,
    ) -> Self {
        let fault_state = FaultState::load(config_dir.join("fault-state.json"));
        Reactor {
            host,
            configurator: Configurator::new(),
            session: UplinkSession::new(session_id, local_half, proto_version),
            crypto,
            frame_writer: FrameWriter::new(),
            frame_reader: FrameReader::new(),
            socket: None,
            uplink_host: String::new(),
            uplink_service: String::new(),
            status,
            signals: signals::install(),
            watchdog: IterationWatchdog::system(crate::watchdog::DEFAULT_TIMEOUT),
            batch_arena: Arena::create("reactor-batch"),
            internal_timers: HashMap::new(),
            config_dir,
            config_package,
            require_uplink,
            pending_reconfigure: Some(false),
            running: true,
            fault_state,
        }
    }

    /// Run until a terminating signal (or the login-failure hard limit)
    /// asks the process to stop, then tear every plugin down cleanly.
    pub fn run(&mut self) -> Result<(), ReactorError> {
        self.arm_internal_timer(InternalTimer::Ping, PING_INTERVAL.as_millis() as u64);
        while self.running {
            self.step()?;
        }
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        tracing::info!("reactor shutting down");
        if self.configurator.in_transaction() {
            self.configurator.abort(&mut self.host);
        }
        self.status.write(Status::Offline, unix_now()).ok();
    }

    fn step(&mut self) -> Result<(), ReactorError> {
        self.watchdog.begin_iteration();
        self.drain_signals();

        if let Some(wipe) = self.pending_reconfigure.take() {
            if let Err(e) = self.reconfigure(wipe) {
                tracing::error!(error = %e, "reconfiguration failed, retrying later");
                self.arm_internal_timer(InternalTimer::ReconfigureRetry, ucollect_capture::ERROR_RETRY_DELAY.as_millis() as u64);
            }
        }

        self.maybe_attempt_connect();

        let wait = self.next_wait();
        let ready = self.poll_fds(wait);

        let now = self.host.now();
        let due = self.host.timers_mut().pop_due(now);
        if !due.is_empty() {
            for (id, data) in due {
                self.fire_timer(id, data);
            }
        } else {
            self.dispatch_ready(&ready);
        }

        self.host.fds_mut().reap();
        self.batch_arena.reset();
        self.drain_outgoing();
        self.watchdog.end_iteration();
        Ok(())
    }

    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            match signal {
                Signal::Hup => self.pending_reconfigure = Some(false),
                Signal::Usr1 => self.pending_reconfigure = Some(true),
                Signal::Int | Signal::Quit | Signal::Term => {
                    tracing::info!(?signal, "received shutdown signal");
                    self.running = false;
                }
            }
        }
    }

    /// `wipe` mirrors the original's USR1 handling: drop every plugin and
    /// interface and reload from scratch rather than carrying anything
    /// over.
    fn reconfigure(&mut self, wipe: bool) -> Result<(), ReactorError> {
        let config = ucollect_config::load_config_dir(&self.config_dir, &self.config_package, self.require_uplink)?;
        if wipe {
            // Starting a transaction already marks every existing plugin
            // and interface dead-unless-rescued; declaring nothing from an
            // empty candidate set and committing tears everything down, so
            // the next `apply_config` rebuilds from a clean slate.
            self.configurator.start();
            self.configurator.commit(&mut self.host);
        }
        self.apply_config(&config);
        if let Some(uplink) = &config.uplink {
            self.uplink_host = uplink.name.clone();
            self.uplink_service = uplink.service.clone();
        }
        Ok(())
    }

    fn apply_config(&mut self, config: &GatewayConfig) {
        self.configurator.start();
        for iface in &config.interfaces {
            self.configurator.declare_interface(&mut self.host, &iface.ifname, iface.promiscuous);
        }
        for plugin in &config.plugins {
            if self.fault_state.is_excluded(&plugin.libname) {
                continue;
            }
            self.configurator.declare_plugin(&mut self.host, &plugin.libname);
            for (key, value) in &plugin.options {
                self.configurator.add_plugin_option(&plugin.libname, key, value);
            }
            for (key, values) in &plugin.lists {
                for value in values {
                    self.configurator.add_plugin_option(&plugin.libname, key, value);
                }
            }
        }
        self.configurator.commit(&mut self.host);

        let windows: Vec<(usize, u64)> =
            self.host.interfaces_mut().map(|(i, s)| (i, s.watchdog.window().as_millis() as u64)).collect();
        for (index, window_ms) in windows {
            self.internal_timers.retain(|_, t| *t != InternalTimer::InterfaceWatchdog(index));
            self.arm_internal_timer(InternalTimer::InterfaceWatchdog(index), window_ms);
        }
    }

    fn maybe_attempt_connect(&mut self) {
        if self.socket.is_some() || self.uplink_host.is_empty() {
            return;
        }
        let now = Duration::from_millis(self.host.now());
        if !self.session.attempt_allowed(now) {
            return;
        }
        let family = self.session.next_address_family();
        match self.dial(family) {
            Ok(stream) => {
                tracing::info!(host = %self.uplink_host, ?family, "connected to uplink");
                self.frame_reader = FrameReader::new();
                self.frame_writer = FrameWriter::new();
                self.socket = Some(stream);
                self.session.on_connected();
                self.host_notify_connected();
                self.status.write(Status::Connecting, unix_now()).ok();
            }
            Err(e) => {
                tracing::warn!(host = %self.uplink_host, ?family, error = %e, "uplink connection attempt failed");
                let delay = self.session.next_reconnect_delay();
                self.arm_internal_timer(InternalTimer::ReconnectAttempt, delay.as_millis() as u64);
            }
        }
    }

    fn dial(&self, family: AddressFamily) -> std::io::Result<TcpStream> {
        let port: u16 = self
            .uplink_service
            .parse()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "uplink service is not a port number"))?;
        let chosen = (self.uplink_host.as_str(), port)
            .to_socket_addrs()?
            .find(|a| match family {
                AddressFamily::V4 => a.is_ipv4(),
                AddressFamily::V6 => a.is_ipv6(),
            })
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address of the requested family"))?;
        let stream = TcpStream::connect(chosen)?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    }

    fn disconnect(&mut self) {
        self.socket = None;
        self.host_notify_disconnected();
        let delay = self.session.next_reconnect_delay();
        self.arm_internal_timer(InternalTimer::ReconnectAttempt, delay.as_millis() as u64);
        self.status.write(Status::Offline, unix_now()).ok();
    }

    fn host_notify_connected(&mut self) {
        for index in 0..self.host.plugin_count() {
            self.host.with_current_plugin(index, |instance, host| {
                if instance.is_active() {
                    instance.call_uplink_connected(host);
                }
            });
        }
    }

    fn host_notify_disconnected(&mut self) {
        for index in 0..self.host.plugin_count() {
            self.host.with_current_plugin(index, |instance, host| {
                if instance.is_active() {
                    instance.call_uplink_disconnected(host);
                }
            });
        }
    }

    fn arm_internal_timer(&mut self, kind: InternalTimer, delay_ms: u64) {
        let id = self.host.timers_mut().add(self.host.now() + delay_ms.max(1), 0);
        self.internal_timers.insert(id.0, kind);
    }

    fn next_wait(&mut self) -> Duration {
        match self.host.timers_mut().next_deadline() {
            Some(deadline) => {
                let now = self.host.now();
                let remaining = deadline.saturating_sub(now);
                Duration::from_millis(remaining).min(MAX_POLL_WAIT)
            }
            None => MAX_POLL_WAIT,
        }
    }

    /// One `poll(2)` call over every live fd, returning the subset that
    /// came back readable. Bounded by `wait`; a timeout is not an error,
    /// it just means nothing was ready this iteration.
    fn poll_fds(&self, wait: Duration) -> Vec<RawFd> {
        let mut fds = self.host.fds().live_fds();
        for (_, slot) in self.host.interfaces() {
            fds.push(slot.source.fd());
        }
        if let Some(socket) = self.socket.as_ref() {
            fds.push(socket.as_raw_fd());
        }
        if fds.is_empty() {
            std::thread::sleep(wait.min(Duration::from_millis(50)));
            return Vec::new();
        }

        let mut pollfds: Vec<libc::pollfd> = fds
            .iter()
            .map(|&fd| libc::pollfd { fd, events: libc::POLLIN, revents: 0 })
            .collect();
        let timeout_ms = wait.as_millis().min(i32::MAX as u128) as i32;
        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if rc <= 0 {
            return Vec::new();
        }
        pollfds
            .into_iter()
            .filter(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
            .map(|p| p.fd)
            .collect()
    }

    fn fire_timer(&mut self, id: TimerId, data: u64) {
        if let Some(owner) = self.host.timer_owner(id) {
            let host = &mut self.host;
            let outcome = fault::run_guarded(owner, || {
                host.with_current_plugin(owner, |instance, h| instance.call_timer_fired(h, data));
            });
            self.handle_fault_outcome(owner, outcome);
            return;
        }
        match self.internal_timers.remove(&id.0) {
            Some(InternalTimer::Ping) => {
                self.on_ping_tick();
                self.arm_internal_timer(InternalTimer::Ping, PING_INTERVAL.as_millis() as u64);
            }
            Some(InternalTimer::ReconnectAttempt) => {
                // Nothing to do directly; `maybe_attempt_connect` on the
                // next iteration will see the socket is still absent and
                // try again now that the backoff delay has elapsed.
            }
            Some(InternalTimer::ReconfigureRetry) => {
                self.pending_reconfigure.get_or_insert(false);
            }
            Some(InternalTimer::InterfaceWatchdog(index)) => {
                self.on_interface_watchdog_tick(index);
            }
            None => {}
        }
    }

    fn on_ping_tick(&mut self) {
        if self.socket.is_none() {
            return;
        }
        match self.session.ping_tick() {
            PingOutcome::Send(frame) => self.send_frame(frame),
            PingOutcome::ForceReconnect => {
                tracing::warn!("uplink unresponsive to ping, forcing reconnect");
                self.disconnect();
            }
        }
    }

    fn on_interface_watchdog_tick(&mut self, index: usize) {
        let Some(slot) = self.host.interface_slot_mut(index) else {
            return;
        };
        let window_ms = slot.watchdog.window().as_millis() as u64;
        let tripped = slot.watchdog.tick();
        let name = slot.name.clone();
        if tripped {
            tracing::warn!(interface = %name, "interface silent too long, requesting reconfiguration");
            self.pending_reconfigure.get_or_insert(true);
        }
        self.arm_internal_timer(InternalTimer::InterfaceWatchdog(index), window_ms);
    }

    fn dispatch_ready(&mut self, ready: &[RawFd]) {
        let socket_fd = self.socket.as_ref().map(|s| s.as_raw_fd());
        for &fd in ready {
            if Some(fd) == socket_fd {
                self.service_socket();
                continue;
            }
            if let Some(owner) = self.host.fds().owner_of(fd) {
                if !self.host.fds().is_live(fd) {
                    continue;
                }
                if let Some(tag) = self.host.fds().tag_of(fd) {
                    let host = &mut self.host;
                    let outcome = fault::run_guarded(owner, || {
                        host.with_current_plugin(owner, |instance, h| instance.call_fd_ready(h, fd, tag));
                    });
                    self.handle_fault_outcome(owner, outcome);
                }
                continue;
            }
            self.dispatch_capture_fd(fd);
        }
    }

    fn dispatch_capture_fd(&mut self, fd: RawFd) {
        let Some(index) = self.host.interfaces().find(|(_, slot)| slot.source.fd() == fd).map(|(i, _)| i) else {
            return;
        };
        let Some(slot) = self.host.interface_slot_mut(index) else {
            return;
        };
        let interface_name = self.batch_arena.strdup(&slot.name);
        let direction = slot.source.direction();
        let link_type = slot.source.link_type();

        let mut packets: Vec<Vec<u8>> = Vec::new();
        let dispatched = slot
            .source
            .dispatch(MAX_PACKETS_PER_DISPATCH, &mut |data| packets.push(data.to_vec()))
            .unwrap_or_else(|e| {
                tracing::warn!(interface = %interface_name, error = %e, "capture dispatch failed");
                0
            });
        if dispatched > 0 {
            slot.watchdog.mark_received();
        }

        for raw in packets {
            let copied = self.batch_arena.alloc_copy(&raw);
            let info = ucollect_packet::parse(&self.batch_arena, copied, interface_name, direction, link_type);
            for plugin_index in 0..self.host.plugin_count() {
                let host = &mut self.host;
                let outcome = fault::run_guarded(plugin_index, || {
                    host.with_current_plugin(plugin_index, |instance, h| {
                        if instance.is_active() {
                            instance.call_packet(h, info);
                        }
                    });
                });
                self.handle_fault_outcome(plugin_index, outcome);
            }
        }
    }

    fn handle_fault_outcome(&mut self, plugin_index: usize, outcome: GuardOutcome) {
        match outcome {
            GuardOutcome::Ok => {}
            GuardOutcome::ReinitRequested => {
                tracing::info!(plugin = plugin_index, "plugin requested reinitialization");
                self.host.with_current_plugin(plugin_index, |instance, host| {
                    instance.call_finish(host);
                    instance.call_init(host);
                });
            }
            GuardOutcome::Faulted => {
                let libname = self.host.plugin_libname(plugin_index);
                // The persisted failure count is the source of truth: it
                // survives both the replacement `PluginInstance` created
                // below and a process restart, so an already-excluded
                // plugin stays excluded rather than getting a clean slate.
                let failures_after = match &libname {
                    Some(name) => self.fault_state.record_failure(name),
                    None => self.host.with_current_plugin(plugin_index, |instance, _host| {
                        instance.record_failure();
                        instance.consecutive_failures()
                    }),
                };
                let exceeded = failures_after >= FAILURE_THRESHOLD;
                tracing::error!(plugin = plugin_index, failures = failures_after, "plugin callback panicked, isolated");

                // The offending plugin is torn down regardless of failure
                // count (its `finish` is skipped, its fds/timers released);
                // the count only decides whether it comes back fresh or
                // stays omitted for good.
                if exceeded {
                    tracing::error!(
                        plugin = plugin_index,
                        libname = libname.as_deref().unwrap_or("?"),
                        "plugin exceeded failure threshold, omitting it permanently"
                    );
                    self.host.fault_tear_down(plugin_index);
                    if let Some(name) = &libname {
                        self.fault_state.mark_excluded(name);
                    }
                    self.host.notify_manifest_changed();
                } else {
                    tracing::warn!(
                        plugin = plugin_index,
                        libname = libname.as_deref().unwrap_or("?"),
                        "plugin faulted, re-instantiating fresh"
                    );
                    self.host.fault_reinstantiate(plugin_index, failures_after);
                }
            }
        }
    }

    fn service_socket(&mut self) {
        let Some(socket) = self.socket.as_mut() else { return };
        let mut buf = [0u8; 4096];
        match socket.read(&mut buf) {
            Ok(0) => {
                tracing::warn!("uplink connection closed by peer");
                self.disconnect();
                return;
            }
            Ok(n) => {
                if self.frame_reader.feed(&buf[..n]).is_err() {
                    tracing::error!("uplink stream corrupt, reconnecting");
                    self.disconnect();
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                tracing::warn!(error = %e, "uplink read failed");
                self.disconnect();
                return;
            }
        }

        let mut to_send = Vec::new();
        while let Some(frame) = self.frame_reader.next_frame() {
            if let Some(Incoming::Challenge) = Incoming::from_byte(frame.kind) {
                match self.session.on_challenge(&frame.payload, self.crypto.as_mut()) {
                    Some(frames) => to_send.extend(frames),
                    None => {
                        tracing::error!("malformed challenge from uplink");
                        self.disconnect();
                        return;
                    }
                }
                continue;
            }
            let Some(incoming) = Incoming::from_byte(frame.kind) else {
                tracing::warn!(kind = frame.kind, "ignoring frame of unknown type");
                continue;
            };
            let outcome: IncomingOutcome = self.session.on_incoming(incoming, &frame.payload, &mut self.host);
            to_send.extend(outcome.frames);
            if outcome.disconnect {
                for f in to_send {
                    self.send_frame(f);
                }
                if outcome.abort_process {
                    tracing::error!("login rejected too many times, aborting process");
                    self.status.write(Status::BadAuth, unix_now()).ok();
                    std::process::exit(1);
                }
                self.disconnect();
                return;
            }
        }
        for f in to_send {
            self.send_frame(f);
        }
        if matches!(self.session.state(), ConnectionState::Authenticated | ConnectionState::Sent) {
            self.status.write(Status::Online, unix_now()).ok();
        }
    }

    fn send_frame(&mut self, frame: Frame) {
        let Ok(bytes) = self.frame_writer.write_frame(&frame) else {
            tracing::error!("failed to deflate outgoing frame");
            return;
        };
        let Some(socket) = self.socket.as_mut() else { return };
        if let Err(e) = socket.write_all(&bytes) {
            tracing::warn!(error = %e, "uplink write failed");
            self.disconnect();
        }
    }

    fn drain_outgoing(&mut self) {
        if self.host.take_manifest_dirty() {
            let manifest = crate::host::build_manifest_frame(&self.host);
            self.send_frame(manifest);
        }
        for request in self.host.take_outgoing() {
            match request {
                UplinkRequest::PluginData { plugin_name, bytes } => {
                    let mut payload = Vec::new();
                    ucollect_uplink::render::encode_string(&mut payload, &plugin_name);
                    payload.extend_from_slice(&bytes);
                    self.send_frame(Frame::new(Outgoing::PluginData.byte(), payload));
                }
            }
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Spin up a single-worker `monoio` runtime and run the reactor inside it.
/// The per-iteration I/O is synchronous (see the module doc comment); this
/// just gives the process one consistent async entry/exit point, matching
/// how the rest of the ambient stack is wired.
pub fn run_on_single_worker(mut reactor: Reactor) -> Result<(), ReactorError> {
    let mut rt = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_all()
        .build()
        .expect("failed to build monoio runtime");
    rt.block_on(async move { reactor.run() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucollect_plugin::{Plugin, PluginContext, PluginRegistry};
    use ucollect_uplink::SoftwareHmacChip;

    struct PanicsOnTimer;

    impl Plugin for PanicsOnTimer {
        fn name(&self) -> &str {
            "panics.so"
        }

        fn timer_fired(&mut self, _ctx: &mut PluginContext, _data: u64) {
            panic!("simulated plugin fault");
        }
    }

    fn make_panicking_plugin() -> Box<dyn Plugin> {
        Box::new(PanicsOnTimer)
    }

    // `signals::install` may only run once per process (it sets a global
    // `OnceLock` sender), so every reactor-level behavior this module
    // wants to exercise is folded into this one test rather than one
    // `Reactor::new` call per test function.
    #[test]
    fn reactor_timer_and_poll_helpers() {
        let mut registry = PluginRegistry::new();
        registry.register("panics.so", make_panicking_plugin);
        let host = ReactorHost::new(registry);
        let crypto: Box<dyn HardwareCryptoChip> = Box::new(SoftwareHmacChip::new(vec![1, 2, 3], vec![4, 5, 6]));
        let mut reactor = Reactor::new(
            host,
            crypto,
            1,
            [0u8; ucollect_uplink::HALF_SIZE],
            1,
            StatusWriter::disabled(),
            PathBuf::from("/nonexistent"),
            "test".to_string(),
            false,
        );

        // No timers armed yet: waits the full cap.
        assert_eq!(reactor.next_wait(), MAX_POLL_WAIT);

        reactor.arm_internal_timer(InternalTimer::Ping, 50);
        assert!(reactor.next_wait() <= MAX_POLL_WAIT);

        // No fds registered and no socket: poll_fds degrades to a short
        // sleep instead of blocking for the full wait, and reports nothing
        // ready.
        assert!(reactor.poll_fds(Duration::from_millis(1)).is_empty());

        // Draining signals with none pending is a no-op; the reactor keeps
        // running and no reconfiguration gets queued.
        reactor.drain_signals();
        assert!(reactor.running);
        assert_eq!(reactor.pending_reconfigure, Some(false));

        // A timer fired for a plugin index nobody owns falls through to
        // the internal-timer table without panicking.
        reactor.fire_timer(TimerId(999_999), 0);

        // Fault isolation (spec's Scenario S6): a plugin whose callback
        // panics is torn down and re-instantiated fresh while its failure
        // count survives the replacement, until it exceeds the threshold
        // and gets permanently omitted.
        let handle = reactor.host.load_plugin("panics.so");
        reactor.host.config_finish(&handle, true);
        assert_eq!(reactor.host.plugin_count(), 1);

        let fault_once = |reactor: &mut Reactor| {
            let host = &mut reactor.host;
            let outcome = fault::run_guarded(handle.0, || {
                host.with_current_plugin(handle.0, |instance, h| instance.call_timer_fired(h, 0));
            });
            reactor.handle_fault_outcome(handle.0, outcome);
        };

        fault_once(&mut reactor);
        assert_eq!(reactor.fault_state.failures("panics.so"), 1);
        assert!(!reactor.fault_state.is_excluded("panics.so"));
        // Still present, re-instantiated at the same slot, active again.
        assert_eq!(reactor.host.plugin_count(), 1);

        for _ in 0..(FAILURE_THRESHOLD - 1) {
            fault_once(&mut reactor);
        }
        assert!(reactor.fault_state.is_excluded("panics.so"));
        assert_eq!(reactor.host.plugin_count(), 0);

        // A disk-driven reconfiguration must not bring an omitted plugin
        // back just because the config file still lists it.
        let config = GatewayConfig {
            plugins: vec![ucollect_config::PluginConfig {
                name: "panics".to_string(),
                libname: "panics.so".to_string(),
                options: HashMap::new(),
                lists: HashMap::new(),
            }],
            interfaces: Vec::new(),
            uplink: None,
        };
        reactor.apply_config(&config);
        assert_eq!(reactor.host.plugin_count(), 0);
    }
}
