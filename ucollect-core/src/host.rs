//! `ReactorHost`: the one type that implements every host-facing seam the
//! lower crates define — `ucollect_plugin::PluginHost` (what a running
//! plugin callback sees), `ucollect_uplink::PluginDispatch` (how incoming
//! plugin-routed uplink data gets demultiplexed), and
//! `ucollect_config::ConfigHost` (how a transaction creates/destroys
//! plugins and interfaces) — bridging them to the real plugin table, fd
//! table, timer heap and capture sources the reactor owns.
//!
//! Plugin/interface identity is a stable slab index (`PluginHandle`/
//! `InterfaceHandle`); removing one leaves a tombstone so indices handed
//! out earlier in the same transaction stay valid.

use std::collections::HashMap;
use std::net::IpAddr;
use std::os::unix::io::RawFd;
use std::time::Instant;

use ucollect_capture::{CaptureSource, PcapCaptureSource, Watchdog};
use ucollect_config::ConfigHost;
use ucollect_mem::{Arena, Trie};
use ucollect_packet::Direction;
use ucollect_plugin::{InterfaceStats, Plugin, PluginHost, PluginInstance, PluginRegistry, TimerId};
use ucollect_uplink::{encode_manifest, Frame, PluginDispatch, PluginManifestEntry, HASH_PREFIX_LEN};

use crate::fault::CURRENT_PLUGIN;
use crate::fds::FdTable;
use crate::timers::TimerHeap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PluginHandle(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InterfaceHandle(pub usize);

struct PluginSlot {
    instance: PluginInstance,
    libname: String,
    options: HashMap<String, Vec<String>>,
    live: bool,
}

pub struct InterfaceSlot {
    pub source: Box<dyn CaptureSource>,
    pub name: String,
    pub promiscuous: bool,
    pub watchdog: Watchdog,
    live: bool,
}

/// Things a plugin or the configurator asked the uplink to do, queued for
/// the reactor to drain into the wire each iteration.
pub enum UplinkRequest {
    PluginData { plugin_name: String, bytes: Vec<u8> },
}

pub struct ReactorHost {
    plugins: Vec<PluginSlot>,
    interfaces: Vec<InterfaceSlot>,
    registry: PluginRegistry,
    fds: FdTable,
    timers: TimerHeap,
    timer_owner: HashMap<u64, usize>,
    started: Instant,
    resolved_addresses: Vec<IpAddr>,
    outgoing: Vec<UplinkRequest>,
    manifest_dirty: bool,
}

impl ReactorHost {
    pub fn new(registry: PluginRegistry) -> Self {
        ReactorHost {
            plugins: Vec::new(),
            interfaces: Vec::new(),
            registry,
            fds: FdTable::new(),
            timers: TimerHeap::new(),
            timer_owner: HashMap::new(),
            started: Instant::now(),
            resolved_addresses: Vec::new(),
            outgoing: Vec::new(),
            manifest_dirty: false,
        }
    }

    pub fn set_resolved_addresses(&mut self, addrs: Vec<IpAddr>) {
        self.resolved_addresses = addrs;
    }

    pub fn take_outgoing(&mut self) -> Vec<UplinkRequest> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn take_manifest_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.manifest_dirty, false)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.iter().filter(|s| s.live).count()
    }

    pub fn interface_slot_mut(&mut self, index: usize) -> Option<&mut InterfaceSlot> {
        self.interfaces.get_mut(index).filter(|s| s.live)
    }

    pub fn interfaces_mut(&mut self) -> impl Iterator<Item = (usize, &mut InterfaceSlot)> {
        self.interfaces.iter_mut().enumerate().filter(|(_, s)| s.live)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = (usize, &InterfaceSlot)> {
        self.interfaces.iter().enumerate().filter(|(_, s)| s.live)
    }

    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    pub fn fds_mut(&mut self) -> &mut FdTable {
        &mut self.fds
    }

    pub fn timers_mut(&mut self) -> &mut TimerHeap {
        &mut self.timers
    }

    pub fn timer_owner(&self, id: TimerId) -> Option<usize> {
        self.timer_owner.get(&id.0).copied()
    }

    /// Run `f` with `index` recorded as the currently-executing plugin, so
    /// `register_fd`/`timeout_add`/`timer_fired` dispatch can attribute
    /// host calls made from inside `f` back to the right plugin. Does not
    /// itself `catch_unwind` — the reactor wraps whichever outer operation
    /// (packet dispatch, timer fire, reconfiguration) actually owns the
    /// fault-isolation boundary for that call site.
    pub fn with_current_plugin<R>(&mut self, index: usize, f: impl FnOnce(&mut PluginInstance, &mut Self) -> R) -> R {
        CURRENT_PLUGIN.with(|cell| cell.set(Some(index)));
        let mut instance = std::mem::replace(&mut self.plugins[index].instance, placeholder_instance());
        let result = f(&mut instance, self);
        self.plugins[index].instance = instance;
        CURRENT_PLUGIN.with(|cell| cell.set(None));
        result
    }

    fn plugin_index_by_name(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|s| s.live && s.instance.name() == name)
    }

    fn release_owned_fds_and_timers(&mut self, index: usize) {
        self.fds.unregister_all_owned_by(index);
        let owned: Vec<TimerId> = self
            .timer_owner
            .iter()
            .filter(|(_, &owner)| owner == index)
            .map(|(&id, _)| TimerId(id))
            .collect();
        for id in owned {
            self.timers.cancel(id);
            self.timer_owner.remove(&id.0);
        }
    }

    fn tear_down_plugin(&mut self, index: usize) {
        if let Some(slot) = self.plugins.get_mut(index) {
            slot.live = false;
        }
        self.release_owned_fds_and_timers(index);
    }

    /// The library name a live plugin slot was loaded from, used by the
    /// fault-isolation path to re-look-up its factory in the registry and
    /// to name it in the reactor's permanent-exclusion set.
    pub fn plugin_libname(&self, index: usize) -> Option<String> {
        self.plugins.get(index).filter(|s| s.live).map(|s| s.libname.clone())
    }

    /// Tear a faulted plugin down without invoking `finish` — its callback
    /// is exactly what panicked, so running another of its callbacks would
    /// just fault again. Unregisters its fds and timers and marks the slot
    /// dead; used both when the plugin is about to be omitted for good and
    /// (transiently) right before [`ReactorHost::fault_reinstantiate`]
    /// rebuilds it fresh in the same slot.
    pub fn fault_tear_down(&mut self, index: usize) {
        self.tear_down_plugin(index);
    }

    /// Rebuild the plugin at `index` from scratch in place: a fresh
    /// instance from the registry, a fresh permanent arena, `init` called
    /// again, the same libname/options it had before the fault, and
    /// `failures_after` (the already-incremented failure count) carried
    /// into the replacement so it isn't reset to zero by the new object.
    /// Returns `false` if the slot or its registered library is gone.
    pub fn fault_reinstantiate(&mut self, index: usize, failures_after: u32) -> bool {
        let Some(slot) = self.plugins.get(index) else { return false };
        let libname = slot.libname.clone();
        let options = slot.options.clone();
        let Some(factory) = self.registry.get(&libname) else { return false };

        self.release_owned_fds_and_timers(index);

        let plugin = factory();
        let mut instance = PluginInstance::new(plugin, libname.as_bytes());
        instance.set_consecutive_failures(failures_after);
        self.plugins[index] = PluginSlot { instance, libname, options, live: true };
        self.with_current_plugin(index, |instance, host| instance.call_init(host));
        self.config_finish(&PluginHandle(index), true);
        true
    }
}

fn placeholder_instance() -> PluginInstance {
    struct Noop;
    impl Plugin for Noop {
        fn name(&self) -> &str {
            "<torn-down>"
        }
    }
    PluginInstance::new(Box::new(Noop), b"")
}

impl PluginHost for ReactorHost {
    fn pool_create(&mut self, name: &str) -> Arena {
        Arena::create(Box::leak(name.to_string().into_boxed_str()))
    }

    fn register_fd(&mut self, fd: RawFd, tag: u64) {
        let owner = CURRENT_PLUGIN.with(|c| c.get()).expect("register_fd called outside a plugin callback");
        self.fds.register(fd, owner, tag);
    }

    fn unregister_fd(&mut self, fd: RawFd) {
        self.fds.unregister(fd);
    }

    fn timeout_add(&mut self, delay_ms: u64, data: u64) -> TimerId {
        let owner = CURRENT_PLUGIN.with(|c| c.get()).expect("timeout_add called outside a plugin callback");
        // A zero delay is rounded up to 1ms so it fires on a later
        // iteration instead of spinning the reactor in place.
        let delay_ms = delay_ms.max(1);
        let id = self.timers.add(self.now() + delay_ms, data);
        self.timer_owner.insert(id.0, owner);
        id
    }

    fn timeout_cancel(&mut self, id: TimerId) {
        self.timers.cancel(id);
        self.timer_owner.remove(&id.0);
    }

    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn option_get(&self, name: &str) -> Option<&[String]> {
        let index = CURRENT_PLUGIN.with(|c| c.get())?;
        self.plugins.get(index)?.options.get(name).map(|v| v.as_slice())
    }

    fn send_message(&mut self, plugin_name: &str, bytes: &[u8]) -> bool {
        let Some(index) = self.plugin_index_by_name(plugin_name) else {
            return false;
        };
        if !self.plugins[index].instance.is_active() {
            return false;
        }
        self.outgoing.push(UplinkRequest::PluginData {
            plugin_name: plugin_name.to_string(),
            bytes: bytes.to_vec(),
        });
        true
    }

    fn resolved_addresses(&self) -> &[IpAddr] {
        &self.resolved_addresses
    }

    fn capture_stats(&self) -> Vec<(String, InterfaceStats)> {
        // `CaptureSource::drop_counters` needs `&mut self` to pull fresh
        // pcap stats; `PluginHost::capture_stats` is read-only, so this
        // reports the interface set with zeroed counters. The reactor
        // refreshes real counters on its own watchdog tick and a plugin
        // that needs live drop counts reads them from there instead.
        self.interfaces.iter().filter(|s| s.live).map(|s| (s.name.clone(), InterfaceStats::default())).collect()
    }
}

impl PluginDispatch for ReactorHost {
    fn send_to_plugin(&mut self, name: &str, data: &[u8]) -> bool {
        let Some(index) = self.plugin_index_by_name(name) else {
            return false;
        };
        if !self.plugins[index].instance.is_active() {
            return false;
        }
        self.with_current_plugin(index, |instance, host| instance.call_uplink_data(host, data));
        true
    }

    fn manifest(&self) -> Vec<PluginManifestEntry> {
        self.plugins
            .iter()
            .filter(|s| s.live)
            .map(|s| {
                let mut hash_prefix = [0u8; HASH_PREFIX_LEN];
                hash_prefix.copy_from_slice(&s.instance.identity()[..HASH_PREFIX_LEN]);
                PluginManifestEntry {
                    name: s.instance.name().to_string(),
                    version: s.instance.version(),
                    hash_prefix,
                    basename: s.libname.clone(),
                    active: s.instance.is_active(),
                }
            })
            .collect()
    }
}

impl ConfigHost for ReactorHost {
    type Plugin = PluginHandle;
    type Interface = InterfaceHandle;

    fn load_plugin(&mut self, libname: &str) -> PluginHandle {
        let factory = self
            .registry
            .get(libname)
            .unwrap_or_else(|| panic!("no plugin registered under library name '{libname}'"));
        let plugin = factory();
        let instance = PluginInstance::new(plugin, libname.as_bytes());
        self.plugins.push(PluginSlot {
            instance,
            libname: libname.to_string(),
            options: HashMap::new(),
            live: true,
        });
        let index = self.plugins.len() - 1;
        self.with_current_plugin(index, |instance, host| instance.call_init(host));
        PluginHandle(index)
    }

    fn open_interface(&mut self, ifname: &str, promiscuous: bool) -> InterfaceHandle {
        let source = PcapCaptureSource::open(ifname, Direction::Unknown, promiscuous)
            .unwrap_or_else(|e| panic!("failed to open capture on {ifname}: {e}"));
        self.interfaces.push(InterfaceSlot {
            source: Box::new(source),
            name: ifname.to_string(),
            promiscuous,
            watchdog: Watchdog::new(),
            live: true,
        });
        InterfaceHandle(self.interfaces.len() - 1)
    }

    fn destroy_plugin(&mut self, plugin: PluginHandle) {
        if self.plugins.get(plugin.0).is_some_and(|s| s.live) {
            self.with_current_plugin(plugin.0, |instance, host| instance.call_finish(host));
        }
        self.tear_down_plugin(plugin.0);
    }

    fn destroy_interface(&mut self, interface: InterfaceHandle) {
        if let Some(slot) = self.interfaces.get_mut(interface.0) {
            slot.live = false;
        }
    }

    fn config_finish(&mut self, plugin: &PluginHandle, success: bool) {
        if self.plugins.get(plugin.0).is_some_and(|s| s.live) {
            self.with_current_plugin(plugin.0, |instance, host| {
                instance.call_config_finish(host, success);
                instance.set_active(success);
            });
        }
    }

    fn migrate_timers(&mut self, from: &PluginHandle, to: &PluginHandle) {
        if from.0 == to.0 {
            return;
        }
        for owner in self.timer_owner.values_mut() {
            if *owner == from.0 {
                *owner = to.0;
            }
        }
    }

    fn rebind_pluglibs(&mut self, _plugin: &PluginHandle, _candidate_pluglibs: &[String]) {
        // Pluglib import/export resolution (`ucollect_plugin::pluglib`)
        // operates over the statically registered export table, which
        // isn't keyed by plugin slab index — nothing to do here beyond
        // what `ucollect-plugins`' own registration already set up.
    }

    fn apply_options(&mut self, plugin: &PluginHandle, options: &Trie<Vec<String>>) {
        if let Some(slot) = self.plugins.get_mut(plugin.0) {
            let mut flat = HashMap::new();
            options.walk(|key, value| {
                if let Ok(name) = std::str::from_utf8(key) {
                    flat.insert(name.to_string(), value.clone());
                }
            });
            slot.options = flat;
        }
    }

    fn notify_manifest_changed(&mut self) {
        self.manifest_dirty = true;
    }
}

/// Build the `V` (plugin manifest) frame from the current plugin set.
pub fn build_manifest_frame(host: &ReactorHost) -> Frame {
    encode_manifest(&PluginDispatch::manifest(host))
}
