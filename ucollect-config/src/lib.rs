//! Configuration file parsing and transactional reconfiguration for the
//! collector: a UCI-style config file (`config TYPE 'NAME'` / `option` /
//! `list` sections) is parsed and validated into a [`GatewayConfig`], and
//! [`Configurator`] drives start/declare/commit-or-abort reconfiguration
//! against whatever host the reactor provides.

mod configurator;
mod schema;
mod uci;

pub use configurator::{ConfigHost, Configurator};
pub use schema::{GatewayConfig, InterfaceConfig, PluginConfig, UplinkConfig, ValidationError};
pub use uci::{parse, ParseError, RawConfig, RawSection};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("couldn't read configuration file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Load and validate `<dir>/<package>`, the same single-file layout the
/// original's `config_set_dir`/`config_set_package` pair selects.
pub fn load_config_dir(dir: &Path, package: &str, require_uplink: bool) -> Result<GatewayConfig, LoadError> {
    let path = dir.join(package);
    let text = std::fs::read_to_string(&path).map_err(|source| LoadError::Io { path: path.clone(), source })?;
    let raw = parse(&text)?;
    let config = schema::validate(&raw, require_uplink)?;
    Ok(config)
}
