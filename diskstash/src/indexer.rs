// Copyright 2026 diskstash Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use diskstash_common::{
    slab::{SlabLinkedList, Token},
    strict_assert, strict_assert_eq,
};
use hashbrown::HashMap;
use itertools::Itertools;

/// Metadata of a blob resident on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Encoded key, also the file name.
    pub key: String,
    /// On-disk size in bytes.
    pub size: u64,
    pub path: PathBuf,
}

/// Recency ordering plus usage counters.
///
/// The list runs from the least recently used entry at the front to the most recently used entry at the back.
/// `tokens` maps every key in the list to its node, and `bytes` is the sum of all entry sizes.
#[derive(Debug, Default)]
pub struct Indexer {
    tokens: HashMap<String, Token>,
    order: SlabLinkedList<Entry>,
    bytes: u64,
}

impl Indexer {
    /// Insert `entry` as the most recently used one, returning the entry it replaces, if any.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        let old = self.remove(&entry.key);

        self.bytes += entry.size;
        let key = entry.key.clone();
        let token = self.order.push_back(entry);
        self.tokens.insert(key, token);

        self.verify();
        old
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        let token = self.tokens.remove(key)?;
        let entry = self.order.remove(token);
        strict_assert!(entry.is_some(), "key {key} is indexed but not linked");
        let entry = entry?;
        self.bytes -= entry.size;

        self.verify();
        Some(entry)
    }

    /// Promote the entry to most recently used.
    pub fn touch(&mut self, key: &str) -> Option<&Entry> {
        let token = *self.tokens.get(key)?;
        self.order.move_to_back(token);
        self.order.get(token)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.tokens.get(key).and_then(|token| self.order.get(*token))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tokens.contains_key(key)
    }

    /// The least recently used entry, i.e. the next eviction candidate.
    pub fn lru(&self) -> Option<&Entry> {
        self.order.front()
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.order.iter()
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().map(|entry| entry.key.clone()).sorted_unstable().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.order.clear();
        self.bytes = 0;
    }

    /// Check the byte counter against every entry. O(n), run after bulk loads.
    pub fn verify_all(&self) {
        self.verify();
        strict_assert_eq!(self.bytes, self.iter().map(|entry| entry.size).sum::<u64>());
    }

    fn verify(&self) {
        strict_assert_eq!(self.tokens.len(), self.order.len());
    }
}
