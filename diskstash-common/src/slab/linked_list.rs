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

use super::{Slab, Token};

#[derive(Debug, Clone)]
struct Node<T> {
    val: T,

    prev: Option<Token>,
    next: Option<Token>,
}

/// Doubly-linked list whose nodes live in a [`Slab`].
///
/// Links are slab tokens instead of pointers, so a node can be unlinked or moved in O(1) given the token returned
/// by [`SlabLinkedList::push_back`].
#[derive(Debug, Clone)]
pub struct SlabLinkedList<T> {
    slab: Slab<Node<T>>,
    head: Option<Token>,
    tail: Option<Token>,
}

impl<T> Default for SlabLinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlabLinkedList<T> {
    /// Create an empty list.
    pub const fn new() -> Self {
        Self {
            slab: Slab::new(),
            head: None,
            tail: None,
        }
    }

    /// First value.
    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|token| self.get(token))
    }

    /// Get the value of the node the token refers to.
    pub fn get(&self, token: Token) -> Option<&T> {
        self.slab.get(token).map(|node| &node.val)
    }

    /// Append a value and return the token of its node.
    pub fn push_back(&mut self, val: T) -> Token {
        let token = self.slab.insert(Node {
            val,
            prev: None,
            next: None,
        });
        self.link_back(token);
        token
    }

    /// Remove the node the token refers to.
    pub fn remove(&mut self, token: Token) -> Option<T> {
        self.slab.get(token)?;
        self.unlink(token);
        self.slab.remove(token).map(|node| node.val)
    }

    /// Move the node the token refers to to the back of the list.
    ///
    /// Returns `false` if the token does not refer to a node.
    pub fn move_to_back(&mut self, token: Token) -> bool {
        if self.slab.get(token).is_none() {
            return false;
        }
        if self.tail != Some(token) {
            self.unlink(token);
            self.link_back(token);
        }
        true
    }

    /// Iterate from front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            token: self.head,
        }
    }

    /// Count of nodes.
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Returns `true` if the list has no node.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all nodes.
    pub fn clear(&mut self) {
        self.slab.clear();
        self.head = None;
        self.tail = None;
    }

    fn link_back(&mut self, token: Token) {
        let prev = self.tail;
        if let Some(node) = self.slab.get_mut(token) {
            node.prev = prev;
            node.next = None;
        }
        match prev.and_then(|prev| self.slab.get_mut(prev)) {
            Some(node) => node.next = Some(token),
            None => self.head = Some(token),
        }
        self.tail = Some(token);
    }

    fn unlink(&mut self, token: Token) {
        let (prev, next) = match self.slab.get_mut(token) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev.and_then(|prev| self.slab.get_mut(prev)) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        match next.and_then(|next| self.slab.get_mut(next)) {
            Some(node) => node.prev = prev,
            None => self.tail = prev,
        }
    }
}

/// Front-to-back iterator over a [`SlabLinkedList`].
pub struct Iter<'a, T> {
    list: &'a SlabLinkedList<T>,
    token: Option<Token>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.slab.get(self.token?)?;
        self.token = node.next;
        Some(&node.val)
    }
}
