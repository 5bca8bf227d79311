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

//! Mapping between cache keys and file names.
//!
//! Every byte outside `[A-Za-z0-9-_.~]` is percent-encoded, which makes the mapping injective and keeps path
//! separators out of file names. Two extra rules keep the result a plain file name:
//!
//! - A leading `.` is written as `%2E`, so `.` and `..` never name the directory itself or its parent.
//! - The empty key maps to `%`, a name percent-encoding never produces.
//!
//! Names longer than [`MAX_NAME_LEN`] bytes would hit filesystem limits. They are cut to a prefix and suffixed
//! with `%h` and the hex xxHash64 of the raw key. A `%` followed by `h` is never produced by percent-encoding,
//! so bounded names cannot collide with plain ones. Bounded names are not reversible.
//!
//! The encoded name doubles as the canonical key of the index. Raw keys that encode to the same name are the
//! same cache entry.

use std::{borrow::Cow, hash::Hasher};

use twox_hash::XxHash64;

/// Longest file name [`encode`] returns, in bytes.
pub const MAX_NAME_LEN: usize = 200;

const EMPTY: &str = "%";
const LEADING_DOT: &str = "%2E";
const HASHED: &str = "%h";
const HASH_LEN: usize = 16;

/// Map a cache key to the file name it is stored under.
pub fn encode(key: &str) -> String {
    if key.is_empty() {
        return EMPTY.to_string();
    }
    let encoded = urlencoding::encode(key);
    let encoded = match encoded.strip_prefix('.') {
        Some(rest) => format!("{LEADING_DOT}{rest}"),
        None => encoded.into_owned(),
    };
    if encoded.len() <= MAX_NAME_LEN {
        return encoded;
    }

    // The encoded name is ASCII. Back off so the cut does not split a `%XX` escape.
    let bytes = encoded.as_bytes();
    let mut cut = MAX_NAME_LEN - HASHED.len() - HASH_LEN;
    if bytes[cut - 1] == b'%' {
        cut -= 1;
    } else if bytes[cut - 2] == b'%' {
        cut -= 2;
    }

    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key.as_bytes());
    format!("{}{HASHED}{:0width$x}", &encoded[..cut], hasher.finish(), width = HASH_LEN)
}

/// Map a file name back to the key it was encoded from.
///
/// Returns `None` if the name does not decode to valid UTF-8 or is a bounded name of a long key. Names that were
/// not produced by [`encode`] may still decode, to a key that encodes to a different name.
pub fn decode(name: &str) -> Option<String> {
    if name == EMPTY {
        return Some(String::new());
    }
    if name.contains(HASHED) {
        return None;
    }
    urlencoding::decode(name).ok().map(Cow::into_owned)
}
