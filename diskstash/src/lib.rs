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

//! A disk-resident blob cache bounded by total bytes and total entry count.
//!
//! Every blob is a single file in the cache directory, named after its percent-encoded key (see [`naming`]).
//! Blobs may be compressed on disk with LZ4 or zstd. Budgets are enforced against the on-disk size. When a new
//! blob would exceed a budget, the least recently used blobs are evicted first.
//!
//! ```no_run
//! use std::io::Read;
//!
//! use diskstash::prelude::*;
//!
//! # fn main() -> diskstash::Result<()> {
//! let cache = CacheBuilder::new("/tmp/diskstash")
//!     .with_max_bytes(64 * 1024 * 1024)
//!     .with_max_entries(1024)
//!     .with_compression(Compression::Lz4)
//!     .build()?;
//! cache.warmup()?;
//!
//! cache.put("io/ioutil", b"Package ioutil implements some I/O utility functions.")?;
//!
//! let mut value = String::new();
//! cache.get("io/ioutil")?.read_to_string(&mut value)?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod compress;
mod indexer;
pub mod naming;
mod storage;

/// Re-exports of the commonly used types.
pub mod prelude;
pub use prelude::*;
