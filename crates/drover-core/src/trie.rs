//! Insert-only prefix index used for command and controllee autocomplete.
//!
//! A single [`Trie`] is shared behind an `Arc` between the registry (which
//! feeds controllee ids and aliases into it) and the editors that query it,
//! so lookups and inserts are internally synchronized.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    terminal: bool,
}

impl TrieNode {
    fn collect(&self, prefix: &str, out: &mut Vec<String>) {
        if self.terminal {
            out.push(prefix.to_string());
        }
        for (c, child) in &self.children {
            let mut next = String::with_capacity(prefix.len() + c.len_utf8());
            next.push_str(prefix);
            next.push(*c);
            child.collect(&next, out);
        }
    }
}

/// Insert-only prefix index. No removal; stale entries are tolerated by
/// callers (a dead suggestion fails the subsequent registry lookup).
#[derive(Default)]
pub struct Trie {
    root: Mutex<TrieNode>,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a string.
    pub fn add(&self, s: &str) {
        let mut node = self.root.lock().expect("trie lock poisoned");
        let mut cur = &mut *node;
        for c in s.chars() {
            cur = cur.children.entry(c).or_default();
        }
        cur.terminal = true;
    }

    /// All registered strings whose prefix equals `prefix`, including
    /// `prefix` itself when registered. Order is unspecified; callers sort.
    pub fn prefix_match(&self, prefix: &str) -> Vec<String> {
        let node = self.root.lock().expect("trie lock poisoned");
        let mut cur = &*node;
        for c in prefix.chars() {
            match cur.children.get(&c) {
                Some(child) => cur = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        cur.collect(prefix, &mut out);
        out
    }
}

impl std::fmt::Debug for Trie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie").finish_non_exhaustive()
    }
}
