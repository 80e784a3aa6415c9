//! On-disk record of per-plugin fault-isolation state. Consecutive failure
//! counts and permanent exclusions survive a process restart, so a plugin
//! that already burned through its failure threshold in a previous run
//! doesn't get a clean slate just because the process restarted — matching
//! spec.md §4.5's "otherwise the plugin is omitted" as a durable outcome
//! rather than a per-process one.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PluginFaultRecord {
    consecutive_failures: u32,
    permanently_excluded: bool,
}

/// Keyed by plugin libname. Loaded once at startup; rewritten to disk after
/// every fault-isolation event that changes it.
#[derive(Default)]
pub struct FaultState {
    plugins: HashMap<String, PluginFaultRecord>,
    path: Option<PathBuf>,
}

impl FaultState {
    /// Load persisted state from `path`. A missing or unparseable file is
    /// not an error — it just means every plugin starts with a clean fault
    /// history, the same as a brand-new install.
    pub fn load(path: PathBuf) -> Self {
        let plugins = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        FaultState { plugins, path: Some(path) }
    }

    /// No backing file: state lives only for the process lifetime. Used by
    /// tests and by callers that don't want fault history to persist.
    pub fn in_memory() -> Self {
        FaultState { plugins: HashMap::new(), path: None }
    }

    /// Record one more fault for `libname` and return the new consecutive
    /// count.
    pub fn record_failure(&mut self, libname: &str) -> u32 {
        let entry = self.plugins.entry(libname.to_string()).or_default();
        entry.consecutive_failures += 1;
        let count = entry.consecutive_failures;
        self.save();
        count
    }

    /// Mark `libname` permanently excluded from future reconfiguration.
    pub fn mark_excluded(&mut self, libname: &str) {
        self.plugins.entry(libname.to_string()).or_default().permanently_excluded = true;
        self.save();
    }

    pub fn is_excluded(&self, libname: &str) -> bool {
        self.plugins.get(libname).is_some_and(|r| r.permanently_excluded)
    }

    pub fn failures(&self, libname: &str) -> u32 {
        self.plugins.get(libname).map(|r| r.consecutive_failures).unwrap_or(0)
    }

    fn save(&self) {
        let Some(path) = &self.path else { return };
        match serde_json::to_vec_pretty(&self.plugins) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(path, bytes) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist plugin fault state");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize plugin fault state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_failure_increments_and_persists() {
        let dir = std::env::temp_dir().join(format!("ucollect-fault-state-test-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&dir);

        let mut state = FaultState::load(dir.clone());
        assert_eq!(state.record_failure("example.so"), 1);
        assert_eq!(state.record_failure("example.so"), 2);
        assert_eq!(state.failures("example.so"), 2);
        assert_eq!(state.failures("other.so"), 0);

        let reloaded = FaultState::load(dir.clone());
        assert_eq!(reloaded.failures("example.so"), 2);

        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn mark_excluded_survives_a_reload() {
        let dir = std::env::temp_dir().join(format!("ucollect-fault-state-test-excl-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&dir);

        let mut state = FaultState::load(dir.clone());
        assert!(!state.is_excluded("bad.so"));
        state.mark_excluded("bad.so");
        assert!(state.is_excluded("bad.so"));

        let reloaded = FaultState::load(dir.clone());
        assert!(reloaded.is_excluded("bad.so"));

        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn missing_file_starts_clean() {
        let state = FaultState::load(PathBuf::from("/nonexistent/ucollect-fault-state.json"));
        assert_eq!(state.failures("anything.so"), 0);
        assert!(!state.is_excluded("anything.so"));
    }

    #[test]
    fn in_memory_state_never_touches_disk() {
        let mut state = FaultState::in_memory();
        state.record_failure("x.so");
        state.mark_excluded("x.so");
        assert!(state.is_excluded("x.so"));
    }
}
