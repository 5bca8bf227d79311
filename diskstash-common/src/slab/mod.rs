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

mod linked_list;

pub use linked_list::{Iter, SlabLinkedList};

/// Index-stable handle to a value stored in a [`Slab`].
///
/// A token stays valid until the value it refers to is removed. After that the slot may be reused, so holders
/// must drop their tokens together with the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(usize);

impl Token {
    /// Slot index of the token.
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Vacant { next_free: usize },
    Occupied(T),
}

/// Array of slots with an embedded free list.
#[derive(Debug, Clone)]
pub struct Slab<T> {
    slots: Vec<Slot<T>>,
    len: usize,
    next_free: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    /// Create an empty slab.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
            next_free: 0,
        }
    }

    /// Insert a value, reusing the most recently vacated slot if any.
    pub fn insert(&mut self, val: T) -> Token {
        let index = self.next_free;
        self.len += 1;

        if index == self.slots.len() {
            self.slots.push(Slot::Occupied(val));
            self.next_free = index + 1;
        } else {
            let slot = std::mem::replace(&mut self.slots[index], Slot::Occupied(val));
            match slot {
                Slot::Vacant { next_free } => self.next_free = next_free,
                Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
            }
        }

        Token(index)
    }

    /// Remove the value the token refers to.
    pub fn remove(&mut self, token: Token) -> Option<T> {
        let index = token.index();
        let next_free = self.next_free;
        let slot = self.slots.get_mut(index)?;
        if matches!(slot, Slot::Vacant { .. }) {
            return None;
        }

        let slot = std::mem::replace(slot, Slot::Vacant { next_free });
        self.next_free = index;
        self.len -= 1;

        match slot {
            Slot::Occupied(val) => Some(val),
            Slot::Vacant { .. } => unreachable!(),
        }
    }

    /// Get the value the token refers to.
    pub fn get(&self, token: Token) -> Option<&T> {
        match self.slots.get(token.index()) {
            Some(Slot::Occupied(val)) => Some(val),
            _ => None,
        }
    }

    /// Get the mutable value the token refers to.
    pub fn get_mut(&mut self, token: Token) -> Option<&mut T> {
        match self.slots.get_mut(token.index()) {
            Some(Slot::Occupied(val)) => Some(val),
            _ => None,
        }
    }

    /// Count of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove all values and release the free list.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.len = 0;
        self.next_free = 0;
    }
}
