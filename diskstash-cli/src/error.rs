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

use diskstash::Compression;

/// Errors raised by the command line front end itself.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unknown compression algorithm name.
    #[error("unsupported compression algorithm: {0}, expected one of none, lz4, zstd")]
    UnsupportedCompression(String),
    /// The requested key is not cached.
    #[error("key not found: {0}")]
    KeyNotFound(String),
}

/// Parse a compression algorithm name for `clap`.
pub fn parse_compression(s: &str) -> Result<Compression, Error> {
    Compression::try_from(s).map_err(|_| Error::UnsupportedCompression(s.to_string()))
}
