use bumpalo::Bump;
use std::fmt::Write as _;
use std::sync::{Mutex, OnceLock};

/// A named, bump-allocated region.
///
/// `alloc` never fails — an out-of-memory condition aborts the process,
/// matching the allocator contract every owner in the reactor relies on
/// (no caller ever has to check for allocation failure). `reset` bulk-frees
/// every allocation made since the arena was created or last reset; callers
/// must not retain references past a `reset()` they did not themselves
/// perform (the host is responsible for enforcing that lifetime contract —
/// see `ucollect-core`'s per-iteration and per-callback resets).
pub struct Arena {
    name: &'static str,
    bump: Bump,
}

impl Arena {
    pub fn create(name: &'static str) -> Self {
        tracing::debug!(pool = name, "creating arena");
        register(name);
        Self {
            name,
            bump: Bump::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allocate `size` bytes, zero-initialized. Never returns an error —
    /// bumpalo aborts the process on true allocator exhaustion.
    pub fn alloc(&self, size: usize) -> &mut [u8] {
        self.bump.alloc_slice_fill_copy(size, 0u8)
    }

    /// Copy `bytes` into the arena and return a reference to the copy.
    pub fn alloc_copy<'a>(&'a self, bytes: &[u8]) -> &'a [u8] {
        self.bump.alloc_slice_copy(bytes)
    }

    /// Move a value into the arena and return a mutable reference to it.
    /// Used for the handful of tree-shaped structures (nested packet
    /// decode, trie nodes) that need a typed, arena-owned home rather
    /// than a raw byte slice. Destructors do not run on reset/drop — only
    /// use this for types whose `Drop` is a no-op.
    pub fn alloc_value<'a, T>(&'a self, value: T) -> &'a mut T {
        self.bump.alloc(value)
    }

    /// C-string-flavored helper: copy a `&str` into the arena.
    pub fn strdup<'a>(&'a self, s: &str) -> &'a str {
        self.bump.alloc_str(s)
    }

    /// `printf`-flavored helper: format into an arena-owned `&str`.
    pub fn render<'a>(&'a self, args: std::fmt::Arguments<'_>) -> &'a str {
        let mut tmp = String::new();
        let _ = tmp.write_fmt(args);
        self.strdup(&tmp)
    }

    /// Render `bytes` as a lowercase hex string, owned by the arena.
    pub fn hex<'a>(&'a self, bytes: &[u8]) -> &'a str {
        let mut tmp = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(tmp, "{:02x}", b);
        }
        self.strdup(&tmp)
    }

    /// Bulk-invalidate every allocation made from this arena.
    pub fn reset(&mut self) {
        tracing::trace!(pool = self.name, allocated = self.bump.allocated_bytes(), "resetting arena");
        self.bump.reset();
    }

    /// Bytes currently retained (chunk memory, not necessarily all in use).
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unregister(self.name);
    }
}

/// Process-wide registry of live arenas, for the `mem_pool_stats`
/// diagnostic (spec.md §4.1).
struct Registry {
    pools: Vec<PoolStat>,
}

#[derive(Clone, Debug)]
pub struct PoolStat {
    pub name: &'static str,
    pub live_count: u64,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry { pools: Vec::new() }))
}

fn register(name: &'static str) {
    let mut reg = registry().lock().unwrap();
    if let Some(p) = reg.pools.iter_mut().find(|p| p.name == name) {
        p.live_count += 1;
    } else {
        reg.pools.push(PoolStat { name, live_count: 1 });
    }
}

fn unregister(name: &'static str) {
    let mut reg = registry().lock().unwrap();
    if let Some(p) = reg.pools.iter_mut().find(|p| p.name == name) {
        p.live_count = p.live_count.saturating_sub(1);
    }
}

/// Snapshot of live arenas by name, for diagnostics.
pub fn mem_pool_stats() -> Vec<PoolStat> {
    registry().lock().unwrap().pools.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_requested_size() {
        let arena = Arena::create("test");
        let buf = arena.alloc(128);
        assert_eq!(buf.len(), 128);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn strdup_roundtrips() {
        let arena = Arena::create("test");
        let s = arena.strdup("hello world");
        assert_eq!(s, "hello world");
    }

    #[test]
    fn hex_matches_expected_encoding() {
        let arena = Arena::create("test");
        assert_eq!(arena.hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    /// Testable property 1 (spec.md §8): resetting an arena and re-allocating
    /// the same sequence of sizes must yield offsets identical to a fresh
    /// arena of the same name. We can't observe raw offsets through the safe
    /// API, so we verify the externally observable analogue: allocated byte
    /// count after the same sequence of allocations matches exactly.
    #[test]
    fn reset_purity() {
        let mut a = Arena::create("reset-test");
        let _ = a.alloc(16);
        let _ = a.alloc(32);
        let _ = a.alloc(8);
        let used_before_reset = a.allocated_bytes();

        a.reset();
        let _ = a.alloc(16);
        let _ = a.alloc(32);
        let _ = a.alloc(8);
        let used_after_reset = a.allocated_bytes();

        let mut fresh = Arena::create("reset-test-fresh");
        let _ = fresh.alloc(16);
        let _ = fresh.alloc(32);
        let _ = fresh.alloc(8);

        assert_eq!(used_after_reset, fresh.allocated_bytes());
        assert!(used_before_reset >= used_after_reset);
    }

    #[test]
    fn registry_tracks_live_arenas() {
        let before = mem_pool_stats()
            .into_iter()
            .find(|p| p.name == "registry-test")
            .map(|p| p.live_count)
            .unwrap_or(0);
        let a = Arena::create("registry-test");
        let after = mem_pool_stats()
            .into_iter()
            .find(|p| p.name == "registry-test")
            .map(|p| p.live_count)
            .unwrap_or(0);
        assert_eq!(after, before + 1);
        drop(a);
        let final_count = mem_pool_stats()
            .into_iter()
            .find(|p| p.name == "registry-test")
            .map(|p| p.live_count)
            .unwrap_or(0);
        assert_eq!(final_count, before);
    }
}
