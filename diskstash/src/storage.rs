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
    ffi::OsString,
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use diskstash_common::error::{Error, Result};

use crate::compress::Codec;

/// Prefix of in-flight files. Key encoding never produces a name starting with it.
const TEMP_PREFIX: &str = "%tmp-";

/// Counts the bytes that pass through to the wrapped writer.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A regular file found by [`Storage::scan`].
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// File operations on the storage directory.
///
/// All sizes reported are on-disk sizes, after the codec has been applied.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
    codec: Arc<dyn Codec>,
}

impl Storage {
    pub fn new(dir: PathBuf, codec: Arc<dyn Codec>) -> Self {
        Self { dir, codec }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Stream `reader` through the codec into a temporary sibling file, then rename it to `path`.
    ///
    /// Readers that opened the previous file at `path` keep reading the previous bytes. On failure `path` is
    /// left as it was and the temporary file is removed.
    pub fn store(&self, path: &Path, reader: &mut dyn Read) -> Result<u64> {
        let tmp = temp_path(path);
        let res = self
            .write(&tmp, reader)
            .and_then(|size| match fs::rename(&tmp, path) {
                Ok(()) => Ok(size),
                Err(e) => Err(io_error(e, "rename blob file failed", path)),
            });
        if res.is_err() {
            if let Err(e) = self.remove(&tmp) {
                tracing::warn!("[storage]: remove temporary file failed: {e}");
            }
        }
        res
    }

    fn write(&self, path: &Path, reader: &mut dyn Read) -> Result<u64> {
        let file = File::create(path).map_err(|e| io_error(e, "create blob file failed", path))?;
        let mut sink = CountingWriter {
            inner: BufWriter::new(file),
            written: 0,
        };

        let mut encoder = self
            .codec
            .encoder(Box::new(&mut sink))
            .map_err(|e| io_error(e, "create encoder failed", path))?;
        io::copy(reader, &mut *encoder).map_err(|e| io_error(e, "write blob failed", path))?;
        encoder.finish().map_err(|e| io_error(e, "flush blob failed", path))?;

        Ok(sink.written)
    }

    /// Move the file at `src` to `dst`.
    ///
    /// Renames when the codec leaves bytes untouched, otherwise streams `src` through the codec. Falls back to
    /// streaming when the rename fails, e.g. across filesystems. The source is removed in every case once this
    /// returns, whether or not the move succeeded.
    pub fn store_from_path(&self, src: &Path, dst: &Path) -> Result<u64> {
        if self.codec.is_identity() {
            match fs::rename(src, dst) {
                Ok(()) => return self.stat_size(dst),
                Err(e) => tracing::debug!(
                    "[storage]: rename {} to {} failed, fall back to copy: {e}",
                    src.display(),
                    dst.display()
                ),
            }
        }

        let res = File::open(src)
            .map_err(|e| io_error(e, "open source file failed", src))
            .and_then(|mut file| self.store(dst, &mut file));
        if let Err(e) = self.remove(src) {
            tracing::warn!("[storage]: remove consumed source file failed: {e}");
        }
        res
    }

    /// Open the file at `path` for reading decoded bytes.
    pub fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = File::open(path).map_err(|e| io_error(e, "open blob file failed", path))?;
        self.codec
            .decoder(Box::new(file))
            .map_err(|e| io_error(e, "create decoder failed", path))
    }

    /// Remove the file at `path`. A file that is already gone counts as removed.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e, "remove blob file failed", path)),
        }
    }

    pub fn stat_size(&self, path: &Path) -> Result<u64> {
        fs::metadata(path)
            .map(|metadata| metadata.len())
            .map_err(|e| io_error(e, "stat blob file failed", path))
    }

    /// List the regular files directly inside the storage directory.
    ///
    /// Names that are not valid UTF-8 cannot be cache keys and are skipped. Temporary files left by an
    /// interrupted store are removed.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        let dir = &self.dir;
        let mut files = vec![];

        for entry in fs::read_dir(dir).map_err(|e| io_error(e, "read storage directory failed", dir))? {
            let entry = entry.map_err(|e| io_error(e, "read storage directory failed", dir))?;
            let path = entry.path();
            let metadata = entry
                .metadata()
                .map_err(|e| io_error(e, "stat blob file failed", &path))?;
            if !metadata.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    tracing::warn!("[storage]: skip file with non UTF-8 name: {name:?}");
                    continue;
                }
            };
            if name.starts_with(TEMP_PREFIX) {
                tracing::debug!("[storage]: remove leftover temporary file {name}");
                if let Err(e) = self.remove(&path) {
                    tracing::warn!("[storage]: remove leftover temporary file failed: {e}");
                }
                continue;
            }
            files.push(ScannedFile {
                name,
                path,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        Ok(files)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(TEMP_PREFIX);
    name.push(path.file_name().unwrap_or_default());
    path.with_file_name(name)
}

fn io_error(e: io::Error, message: &str, path: &Path) -> Error {
    Error::io_error(e, message).with_context("path", path.display())
}
