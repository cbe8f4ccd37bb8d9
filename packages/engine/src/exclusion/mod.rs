// packages/engine/src/exclusion/mod.rs
//! Exclusion index for type names that must never be deeply serialized
//!
//! Serializing a connection pool, a logger or a half-consumed iterator is
//! either expensive, side-effecting or meaningless. The index holds namespace
//! prefixes for such families and answers "does any stored prefix start this
//! name" in time linear in the queried name.
//!
//! Names are matched in dotted form (`std.iter.Map`). Rust paths are rewritten
//! by [`normalize_type_name`] before lookup.

pub mod prefix_trie;

pub use prefix_trie::PrefixTrie;

use parking_lot::RwLock;
use std::borrow::Cow;
use tracing::debug;

/// Built-in exclusions. Crate namespaces end with `.` so that `log.` does not
/// swallow `logic.Rule`.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    // reflection, collection and runtime internals
    "std.any",
    "core.any",
    "std.iter",
    "core.iter",
    "std.sync",
    "std.thread",
    "std.io",
    "std.fs",
    "std.net",
    "std.process",
    "std.cell",
    "core.cell",
    "core.ptr",
    "alloc.vec.into_iter",
    "alloc.collections.btree.map.Iter",
    "std.collections.hash.map.Iter",
    "std.collections.hash.map.IntoIter",
    // clients, ORMs, connection pools
    "tokio.",
    "hyper.",
    "reqwest.",
    "tonic.",
    "sqlx.",
    "diesel.",
    "sea_orm.",
    "rusqlite.",
    "redis.",
    "mongodb.",
    "elasticsearch.",
    "aws_sdk_",
    "r2d2.",
    "deadpool.",
    "bb8.",
    // logging
    "tracing.",
    "tracing_subscriber.",
    "log.",
    "slog.",
    "env_logger.",
    // lazily evaluated sequences. Async producers are left out: the engine
    // correlates them instead of serializing them.
    "rayon.iter",
];

/// Rewrite Rust path separators to dots: `std::iter::Map<T>` → `std.iter.Map<T>`
pub fn normalize_type_name(name: &str) -> Cow<'_, str> {
    if name.contains("::") {
        Cow::Owned(name.replace("::", "."))
    } else {
        Cow::Borrowed(name)
    }
}

/// Concurrent prefix index over dotted type names
#[derive(Debug, Default)]
pub struct ExclusionIndex {
    trie: RwLock<PrefixTrie>,
}

impl ExclusionIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index pre-loaded with [`DEFAULT_EXCLUSIONS`]
    pub fn with_defaults() -> Self {
        let index = Self::new();
        index.load_defaults();
        index
    }

    /// Insert the built-in prefixes
    pub fn load_defaults(&self) {
        let mut trie = self.trie.write();
        for prefix in DEFAULT_EXCLUSIONS {
            trie.insert(prefix);
        }
        debug!("Loaded {} default exclusion prefixes", DEFAULT_EXCLUSIONS.len());
    }

    /// Add a prefix. Accepts Rust (`a::b`) or dotted (`a.b`) form.
    pub fn insert(&self, prefix: &str) {
        let normalized = normalize_type_name(prefix);
        if normalized.is_empty() {
            return;
        }
        self.trie.write().insert(&normalized);
    }

    /// Add several prefixes at once
    pub fn extend<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = self.trie.write();
        for prefix in prefixes {
            let normalized = normalize_type_name(prefix.as_ref());
            if !normalized.is_empty() {
                trie.insert(&normalized);
            }
        }
    }

    /// True iff a stored prefix starts `type_name`
    pub fn is_excluded(&self, type_name: &str) -> bool {
        let normalized = normalize_type_name(type_name);
        self.trie.read().has_prefix_of(&normalized)
    }

    /// Number of stored prefixes
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
