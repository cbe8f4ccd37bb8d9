// packages/engine/src/exclusion/prefix_trie.rs
//! Byte-level prefix trie answering "is any stored key a prefix of this query"

use std::collections::HashMap;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<u8, Node>,
    terminal: bool,
}

/// Prefix trie over byte strings
#[derive(Debug, Default)]
pub struct PrefixTrie {
    root: Node,
    len: usize,
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key. Returns false if it was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        let mut node = &mut self.root;
        for byte in key.bytes() {
            node = node.children.entry(byte).or_default();
        }
        if node.terminal {
            return false;
        }
        node.terminal = true;
        self.len += 1;
        true
    }

    /// True iff some stored key is a prefix of `query` (including `query` itself).
    /// Walks at most `query.len()` nodes and stops at the first terminal.
    pub fn has_prefix_of(&self, query: &str) -> bool {
        let mut node = &self.root;
        if node.terminal {
            return true;
        }
        for byte in query.bytes() {
            match node.children.get(&byte) {
                Some(next) => {
                    if next.terminal {
                        return true;
                    }
                    node = next;
                }
                None => return false,
            }
        }
        false
    }

    /// The first (shortest) stored key prefixing `query`
    pub fn first_prefix_of<'q>(&self, query: &'q str) -> Option<&'q str> {
        let mut node = &self.root;
        if node.terminal {
            return Some("");
        }
        for (i, byte) in query.bytes().enumerate() {
            node = node.children.get(&byte)?;
            if node.terminal {
                return query.get(..=i);
            }
        }
        None
    }

    /// Exact membership
    pub fn contains(&self, key: &str) -> bool {
        let mut node = &self.root;
        for byte in key.bytes() {
            match node.children.get(&byte) {
                Some(next) => node = next,
                None => return false,
            }
        }
        node.terminal
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keys_prefixing() {
        let mut trie = PrefixTrie::new();
        for i in 1..=6 {
            trie.insert(&format!("org.package{}.is", i));
        }

        assert!(trie.has_prefix_of("org.package4.is.not.a.real"));
        assert_eq!(
            trie.first_prefix_of("org.package4.is.not.a.real"),
            Some("org.package4.is")
        );

        assert!(!trie.has_prefix_of("org.pacage4.is.not.a.real"));
        assert_eq!(trie.first_prefix_of("org.pacage4.is.not.a.real"), None);
    }

    #[test]
    fn test_query_shorter_than_key() {
        let mut trie = PrefixTrie::new();
        trie.insert("java.util.stream");

        assert!(!trie.has_prefix_of("java.util"));
        assert!(trie.has_prefix_of("java.util.stream"));
        assert!(trie.has_prefix_of("java.util.stream.Stream"));
    }

    #[test]
    fn test_insert_duplicate() {
        let mut trie = PrefixTrie::new();
        assert!(trie.insert("a.b"));
        assert!(!trie.insert("a.b"));
        assert!(trie.insert("a"));
        assert_eq!(trie.len(), 2);
        assert!(trie.contains("a.b"));
        assert!(!trie.contains("a.b.c"));
    }

    #[test]
    fn test_empty_trie() {
        let trie = PrefixTrie::new();
        assert!(trie.is_empty());
        assert!(!trie.has_prefix_of("anything"));
        assert!(!trie.has_prefix_of(""));
    }

    proptest! {
        #[test]
        fn prop_matches_linear_scan(
            keys in proptest::collection::vec("[a-c.]{1,6}", 0..12),
            query in "[a-c.]{0,10}",
        ) {
            let mut trie = PrefixTrie::new();
            for key in &keys {
                trie.insert(key);
            }
            let expected = keys.iter().any(|k| query.starts_with(k.as_str()));
            prop_assert_eq!(trie.has_prefix_of(&query), expected);
        }
    }
}
