//! Bump-allocated arenas and the insert-only radix trie built on top of
//! them. Every other crate in the workspace that needs scratch memory with
//! bulk-reset semantics — packet decoding, plugin option storage, uplink
//! message rendering — goes through `Arena`.

mod arena;
mod trie;

pub use arena::{mem_pool_stats, Arena, PoolStat};
pub use trie::Trie;
