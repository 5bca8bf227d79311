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

use std::{
    fmt::Debug,
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use diskstash_common::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    compress::Compression,
    indexer::{Entry, Indexer},
    naming,
    storage::Storage,
};

/// Immutable configuration of a [`Cache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage directory.
    pub dir: PathBuf,
    /// Byte budget for the on-disk size of all blobs.
    pub max_bytes: u64,
    /// Budget for the count of blobs.
    pub max_entries: usize,
    /// Compression applied to blobs on disk.
    pub compression: Compression,
}

/// Snapshot of the usage counters of a [`Cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Sum of the on-disk sizes of all resident blobs.
    pub bytes: u64,
    /// Count of resident blobs.
    pub entries: usize,
    /// Configured byte budget.
    pub max_bytes: u64,
    /// Configured entry budget.
    pub max_entries: usize,
}

/// Builder for [`Cache`].
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    dir: PathBuf,
    max_bytes: u64,
    max_entries: usize,
    compression: Compression,
}

impl CacheBuilder {
    /// Default byte budget: 1 GiB.
    pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024;
    /// Default entry budget.
    pub const DEFAULT_MAX_ENTRIES: usize = 1024 * 1024;

    /// Create a builder for a cache stored in `dir`.
    ///
    /// The directory is neither created nor checked here. Problems surface on the first operation that touches
    /// the disk.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_bytes: Self::DEFAULT_MAX_BYTES,
            max_entries: Self::DEFAULT_MAX_ENTRIES,
            compression: Compression::None,
        }
    }

    /// Set the byte budget. Must be greater than zero.
    ///
    /// Default: 1 GiB.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the entry budget. Must be greater than zero.
    ///
    /// Default: 1 Mi entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the compression algorithm.
    ///
    /// The on-disk files do not record the algorithm, so a directory must be reopened with the same one.
    ///
    /// Default: [`Compression::None`].
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Validate the configuration and build the cache.
    ///
    /// The index starts empty. Call [`Cache::warmup`] to pick up blobs already in the directory.
    pub fn build(self) -> Result<Cache> {
        if self.dir.as_os_str().is_empty() {
            return Err(Error::config("bad directory").with_context("dir", self.dir.display()));
        }
        if self.max_bytes == 0 {
            return Err(Error::config("bad size").with_context("max_bytes", self.max_bytes));
        }
        if self.max_entries == 0 {
            return Err(Error::config("bad capacity").with_context("max_entries", self.max_entries));
        }

        // Collecting the components drops trailing separators.
        let dir = self.dir.components().collect::<PathBuf>();

        let config = CacheConfig {
            dir: dir.clone(),
            max_bytes: self.max_bytes,
            max_entries: self.max_entries,
            compression: self.compression,
        };
        tracing::debug!("[cache]: build cache with config: {config:?}");

        let inner = Inner {
            storage: Storage::new(dir, self.compression.codec()),
            indexer: RwLock::new(Indexer::default()),
            config,
        };
        Ok(Cache { inner: Arc::new(inner) })
    }
}

/// Readable stream over a cached blob, decoded if the cache compresses.
///
/// The underlying file is closed when the blob is dropped.
pub struct Blob {
    reader: Box<dyn Read + Send>,
}

impl Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob").finish_non_exhaustive()
    }
}

impl Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

struct Inner {
    config: CacheConfig,
    storage: Storage,
    indexer: RwLock<Indexer>,
}

/// A disk-resident blob cache bounded by total bytes and total entry count.
///
/// Least recently used blobs are evicted when a new blob would exceed either budget. Every operation holds the
/// index lock for its whole duration, file I/O included, so operations are mutually exclusive. `keys`, `len`,
/// `contains` and `usage` only take the lock in shared mode.
///
/// `Cache` is cheap to clone. Clones share the same index.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("config", &self.inner.config).finish()
    }
}

impl Cache {
    /// Create a cache stored in `dir` that holds at most `max_entries` blobs of `max_bytes` bytes in total.
    ///
    /// Blobs are LZ4 compressed on disk if `use_compression` is true.
    pub fn new(dir: impl AsRef<Path>, max_bytes: u64, max_entries: usize, use_compression: bool) -> Result<Self> {
        let compression = if use_compression {
            Compression::Lz4
        } else {
            Compression::None
        };
        CacheBuilder::new(dir)
            .with_max_bytes(max_bytes)
            .with_max_entries(max_entries)
            .with_compression(compression)
            .build()
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Rebuild the index from the files in the storage directory.
    ///
    /// The current index is discarded. Every regular file directly inside the directory becomes an entry keyed
    /// by its file name with its current size. Files are inserted from the oldest to the newest modification
    /// time, so the newest file ends up most recently used. Budgets are not enforced here; the next put evicts
    /// until they hold again.
    ///
    /// Returns the count of entries loaded. On error the index is left untouched.
    #[tracing::instrument(skip(self))]
    pub fn warmup(&self) -> Result<usize> {
        let mut indexer = self.inner.indexer.write();

        let mut files = self.inner.storage.scan()?;
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));

        indexer.clear();
        let count = files.len();
        for file in files {
            indexer.insert(Entry {
                key: file.name,
                size: file.size,
                path: file.path,
            });
        }
        indexer.verify_all();

        tracing::debug!(
            "[cache]: warmed up {count} entries, {} bytes, budget {} bytes / {} entries",
            indexer.bytes(),
            self.inner.config.max_bytes,
            self.inner.config.max_entries
        );
        Ok(count)
    }

    /// Store `value` under `key`.
    pub fn put(&self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_reader(key, value.as_ref())
    }

    /// Store the bytes read from `reader` under `key`.
    ///
    /// The bytes are written to disk before the budgets are checked. A blob whose on-disk size alone exceeds the
    /// byte budget is removed again and rejected with [`ErrorKind::TooLarge`](diskstash_common::error::ErrorKind).
    #[tracing::instrument(skip(self, reader))]
    pub fn put_reader(&self, key: &str, mut reader: impl Read) -> Result<()> {
        let name = naming::encode(key);
        let path = self.inner.storage.path(&name);

        let mut indexer = self.inner.indexer.write();
        let stored = self.inner.storage.store(&path, &mut reader);
        self.admit(&mut indexer, name, path, stored)
    }

    /// Move the file at `src` into the cache under `key`.
    ///
    /// The source file is consumed whether or not the blob is admitted.
    #[tracing::instrument(skip(self, src), fields(src = %src.as_ref().display()))]
    pub fn put_file(&self, key: &str, src: impl AsRef<Path>) -> Result<()> {
        let name = naming::encode(key);
        let path = self.inner.storage.path(&name);

        let mut indexer = self.inner.indexer.write();
        let stored = self.inner.storage.store_from_path(src.as_ref(), &path);
        self.admit(&mut indexer, name, path, stored)
    }

    /// Open the blob stored under `key` and mark it most recently used.
    ///
    /// The blob keeps reading the bytes it was opened on, even if the key is replaced or evicted meanwhile.
    #[tracing::instrument(skip(self))]
    pub fn get(&self, key: &str) -> Result<Blob> {
        let name = naming::encode(key);

        let mut indexer = self.inner.indexer.write();
        let path = match indexer.touch(&name) {
            Some(entry) => entry.path.clone(),
            None => {
                tracing::trace!("[cache]: miss {name}");
                return Err(Error::not_found(name));
            }
        };

        match self.inner.storage.open(&path) {
            Ok(reader) => {
                tracing::trace!("[cache]: hit {name}");
                Ok(Blob { reader })
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("[cache]: file of {name} is gone, drop the stale entry");
                indexer.remove(&name);
                Err(e.with_context("key", name))
            }
            Err(e) => Err(e.with_context("key", name)),
        }
    }

    /// Remove the blob stored under `key`.
    ///
    /// Returns `false` if the key is not cached. The entry stays indexed if its file cannot be removed.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, key: &str) -> Result<bool> {
        let name = naming::encode(key);

        let mut indexer = self.inner.indexer.write();
        let path = match indexer.get(&name) {
            Some(entry) => entry.path.clone(),
            None => return Ok(false),
        };
        self.inner
            .storage
            .remove(&path)
            .map_err(|e| e.with_context("key", &name))?;
        indexer.remove(&name);
        Ok(true)
    }

    /// Returns `true` if a blob is stored under `key`. Does not affect recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.indexer.read().contains(&naming::encode(key))
    }

    /// Encoded keys of all resident blobs, sorted lexicographically.
    ///
    /// See [`naming`] for the encoding.
    pub fn keys(&self) -> Vec<String> {
        self.inner.indexer.read().keys()
    }

    /// Count of resident blobs.
    pub fn len(&self) -> usize {
        self.inner.indexer.read().len()
    }

    /// Returns `true` if no blob is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a consistent snapshot of the usage counters.
    pub fn usage(&self) -> Usage {
        let indexer = self.inner.indexer.read();
        Usage {
            bytes: indexer.bytes(),
            entries: indexer.len(),
            max_bytes: self.inner.config.max_bytes,
            max_entries: self.inner.config.max_entries,
        }
    }

    /// Index the blob just written to `path`, evicting until both budgets hold.
    ///
    /// Whenever the blob is not admitted, its file is removed on a best-effort basis.
    fn admit(&self, indexer: &mut Indexer, name: String, path: PathBuf, stored: Result<u64>) -> Result<()> {
        let max_bytes = self.inner.config.max_bytes;
        let max_entries = self.inner.config.max_entries;

        // The file has been rewritten, so a previous entry for the key no longer describes it.
        if let Some(old) = indexer.remove(&name) {
            tracing::trace!("[cache]: replace {name}, old size: {}", old.size);
        }

        let size = match stored {
            Ok(size) => size,
            Err(e) => {
                self.discard(&path);
                return Err(e.with_context("key", name));
            }
        };

        if size > max_bytes {
            self.discard(&path);
            return Err(Error::too_large(size, max_bytes)
                .with_context("key", name)
                .with_context("path", path.display()));
        }

        while indexer.bytes() + size > max_bytes {
            if !self.evict(indexer).inspect_err(|_| self.discard(&path))? {
                break;
            }
        }
        while indexer.len() + 1 > max_entries {
            if !self.evict(indexer).inspect_err(|_| self.discard(&path))? {
                break;
            }
        }

        tracing::debug!("[cache]: admit {name}, size: {size}");
        indexer.insert(Entry { key: name, size, path });
        Ok(())
    }

    /// Evict the least recently used entry.
    ///
    /// The entry leaves the index only after its file is removed. Returns `false` if there is nothing to evict.
    fn evict(&self, indexer: &mut Indexer) -> Result<bool> {
        let (key, path) = match indexer.lru() {
            Some(entry) => (entry.key.clone(), entry.path.clone()),
            None => return Ok(false),
        };

        self.inner
            .storage
            .remove(&path)
            .map_err(|e| e.with_context("key", &key))?;
        if let Some(entry) = indexer.remove(&key) {
            tracing::debug!("[cache]: evict {key}, size: {}", entry.size);
        }
        Ok(true)
    }

    /// Remove a file that will not be indexed. Failures are logged, not returned.
    fn discard(&self, path: &Path) {
        if let Err(e) = self.inner.storage.remove(path) {
            tracing::warn!("[cache]: remove rejected file failed, it stays orphaned until the next warmup: {e}");
        }
    }
}
