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
    io::{self, Read, Write},
    sync::Arc,
};

use diskstash_common::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Compression algorithm applied to blobs on disk.
///
/// Files carry no header that tells the algorithm apart. A cache directory must always be opened with the
/// compression it was written with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// LZ4 frame format.
    Lz4,
    /// Zstd frame format.
    Zstd,
}

impl Compression {
    /// Get the codec that implements the compression algorithm.
    pub fn codec(&self) -> Arc<dyn Codec> {
        match self {
            Self::None => Arc::new(PassThrough),
            Self::Lz4 => Arc::new(Lz4Codec::default()),
            Self::Zstd => Arc::new(ZstdCodec::default()),
        }
    }
}

impl TryFrom<&str> for Compression {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            _ => Err(Error::config("unsupported compression algorithm").with_context("compression", value)),
        }
    }
}

/// A byte sink wrapped by a [`Codec`].
pub trait Encoder: Write {
    /// Flush all buffered codec state into the wrapped sink, then flush the sink.
    ///
    /// Dropping an encoder without finishing it may leave a truncated stream behind.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Streaming transform between blob bytes and on-disk bytes.
pub trait Codec: Send + Sync + Debug + 'static {
    /// Returns `true` if the on-disk bytes equal the blob bytes.
    fn is_identity(&self) -> bool {
        false
    }

    /// Wrap `sink` so that bytes written to the encoder reach `sink` encoded.
    fn encoder<'a>(&self, sink: Box<dyn Write + 'a>) -> io::Result<Box<dyn Encoder + 'a>>;

    /// Wrap `source` so that reads return decoded bytes.
    fn decoder(&self, source: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>>;
}

/// Codec that leaves bytes untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

struct PassThroughEncoder<'a> {
    sink: Box<dyn Write + 'a>,
}

impl Write for PassThroughEncoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl Encoder for PassThroughEncoder<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.sink.flush()
    }
}

impl Codec for PassThrough {
    fn is_identity(&self) -> bool {
        true
    }

    fn encoder<'a>(&self, sink: Box<dyn Write + 'a>) -> io::Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(PassThroughEncoder { sink }))
    }

    fn decoder(&self, source: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(source)
    }
}

/// LZ4 frame codec.
#[derive(Debug, Clone, Copy)]
pub struct Lz4Codec {
    level: u32,
}

impl Default for Lz4Codec {
    fn default() -> Self {
        Self { level: 1 }
    }
}

impl Lz4Codec {
    /// Create an LZ4 codec with the given compression level.
    pub fn with_level(level: u32) -> Self {
        Self { level }
    }
}

struct Lz4Encoder<'a> {
    inner: lz4::Encoder<Box<dyn Write + 'a>>,
}

impl Write for Lz4Encoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Encoder for Lz4Encoder<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let (mut sink, res) = self.inner.finish();
        res?;
        sink.flush()
    }
}

impl Codec for Lz4Codec {
    fn encoder<'a>(&self, sink: Box<dyn Write + 'a>) -> io::Result<Box<dyn Encoder + 'a>> {
        let inner = lz4::EncoderBuilder::new()
            .level(self.level)
            .checksum(lz4::ContentChecksum::ChecksumEnabled)
            .build(sink)?;
        Ok(Box::new(Lz4Encoder { inner }))
    }

    fn decoder(&self, source: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(lz4::Decoder::new(source)?))
    }
}

/// Zstd frame codec.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl ZstdCodec {
    /// Create a zstd codec with the given compression level.
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

struct ZstdEncoder<'a> {
    inner: zstd::Encoder<'static, Box<dyn Write + 'a>>,
}

impl Write for ZstdEncoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Encoder for ZstdEncoder<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut sink = self.inner.finish()?;
        sink.flush()
    }
}

impl Codec for ZstdCodec {
    fn encoder<'a>(&self, sink: Box<dyn Write + 'a>) -> io::Result<Box<dyn Encoder + 'a>> {
        let inner = zstd::Encoder::new(sink, self.level)?;
        Ok(Box::new(ZstdEncoder { inner }))
    }

    fn decoder(&self, source: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(zstd::Decoder::new(source)?))
    }
}
