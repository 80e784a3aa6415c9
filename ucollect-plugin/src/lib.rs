//! The plugin trait, its host-facing context, the per-instance runtime
//! state wrapper, the static plugin registry, and the pluglib import/export
//! resolver.

mod context;
mod instance;
mod plugin;
mod pluglib;
mod registry;

pub use context::{InterfaceStats, PluginContext, PluginHost, PluginReinitRequest, TimerId};
pub use instance::{PluginInstance, DEFAULT_FAILURE_THRESHOLD};
pub use plugin::Plugin;
pub use pluglib::{
    check_functions, resolve_functions, select_pluglib, LoadedPluglib, Pluglib, PluglibExport,
    PluglibFn, PluglibImport, PluglibRequest, PluglibResolveError,
};
pub use registry::{PluginFactory, PluginRegistry};
