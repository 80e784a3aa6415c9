//! `ucollect` — the on-device network telemetry agent binary. Parses the
//! config directory argument, wires the built-in plugins and a software
//! crypto chip into a [`ucollect_core::Reactor`], and runs it to
//! completion on a single-worker `monoio` runtime.

mod logging;

use std::path::PathBuf;

use clap::Parser;
use ucollect_core::{Reactor, ReactorHost};
use ucollect_plugin::PluginRegistry;
use ucollect_uplink::{SoftwareHmacChip, StatusWriter, HALF_SIZE};

/// Half of the shared secret compiled into the binary (the original's
/// `PASSWD_HALF`); concatenated with the server's challenge half during
/// authentication. Not a real secret — a deployment building this for
/// production replaces it (and the matching server-side half) with its
/// own, the same way the original is built per-deployment.
const LOCAL_HALF: [u8; HALF_SIZE] = *b"ucollect-rs-half";

/// Wire protocol version sent in the `H` (hello) frame.
const PROTOCOL_VERSION: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "ucollect", version, about = "ucollect — on-device network telemetry agent")]
struct Cli {
    /// Directory containing the UCI-style config file (named `--package`).
    #[arg(default_value = "/etc/config")]
    config_dir: PathBuf,

    /// Name of the config file inside `config_dir`.
    #[arg(long, default_value = "ucollect")]
    package: String,

    /// Log level, used unless `RUST_LOG` is set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also log to syslog (in addition to stderr).
    #[arg(long)]
    syslog: bool,

    /// Run without requiring an `uplink` section in the config (no
    /// server connection; capture and plugins still run).
    #[arg(long)]
    no_uplink: bool,

    /// Where to write the single-line connection status file. Omit to
    /// disable status-file writing entirely.
    #[arg(long)]
    status_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::install(&cli.log_level, cli.syslog)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ucollect starting");

    let mut registry = PluginRegistry::new();
    ucollect_plugins::register_builtin(&mut registry);
    tracing::info!(plugins = registry.len(), "built-in plugins registered");

    let host = ReactorHost::new(registry);
    let crypto = Box::new(SoftwareHmacChip::new(local_serial(), LOCAL_HALF.to_vec()));
    let status = match cli.status_file {
        Some(path) => StatusWriter::new(Some(path)),
        None => StatusWriter::disabled(),
    };

    let mut reactor = Reactor::new(
        host,
        crypto,
        std::process::id(),
        LOCAL_HALF,
        PROTOCOL_VERSION,
        status,
        cli.config_dir,
        cli.package,
        !cli.no_uplink,
    );

    ucollect_core::run_on_single_worker(reactor)?;
    tracing::info!("ucollect stopped cleanly");
    Ok(())
}

/// A stand-in for the hardware chip's burned-in serial number: the
/// machine id if one is available, else the hostname, else a fixed
/// placeholder. Real deployments with an actual crypto chip never call
/// this — they use its own `HardwareCryptoChip` implementation instead.
fn local_serial() -> Vec<u8> {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        return id.trim().as_bytes().to_vec();
    }
    if let Ok(hostname) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        return hostname.trim().as_bytes().to_vec();
    }
    b"unknown-device".to_vec()
}
