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

//! `diskstash` command line tool, operates on a cache directory.

mod error;

use std::{
    fs::{self, File},
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Context;
use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand};
use diskstash::{naming, Cache, CacheBuilder, Compression};
use error::{parse_compression, Error};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    cache: CacheArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CacheArgs {
    /// Cache directory. Created if missing.
    #[arg(short, long, global = true, default_value = ".diskstash")]
    dir: PathBuf,

    /// Byte budget of the cache.
    #[arg(long, global = true, default_value = "1GiB")]
    max_bytes: ByteSize,

    /// Entry budget of the cache.
    #[arg(long, global = true, default_value_t = 1024 * 1024)]
    max_entries: usize,

    /// Compression algorithm of the blobs on disk: none, lz4 or zstd.
    ///
    /// Must match the algorithm the directory was written with.
    #[arg(short, long, global = true, default_value = "none", value_parser = parse_compression)]
    compression: Compression,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a blob, read from a file or from stdin.
    Put {
        key: String,
        /// Read the blob from this file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Move the file into the cache instead of copying it.
        #[arg(long, requires = "file")]
        consume: bool,
    },
    /// Write a blob to stdout or to a file.
    Get {
        key: String,
        /// Write the blob to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove a blob.
    Remove { key: String },
    /// List the cached keys.
    Keys {
        /// Print the original keys instead of the file names.
    ///
    /// Names of long keys are hashed and printed as they are.
        #[arg(long)]
        decode: bool,
    },
    /// Print the usage counters as JSON.
    Stats,
}

fn open(args: &CacheArgs) -> anyhow::Result<Cache> {
    fs::create_dir_all(&args.dir).with_context(|| format!("create cache directory {}", args.dir.display()))?;

    let cache = CacheBuilder::new(&args.dir)
        .with_max_bytes(args.max_bytes.as_u64())
        .with_max_entries(args.max_entries)
        .with_compression(args.compression)
        .build()?;
    let entries = cache.warmup()?;
    tracing::debug!("[cli]: opened {} with {entries} entries", args.dir.display());

    Ok(cache)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cache = open(&cli.cache)?;

    match cli.command {
        Command::Put { key, file, consume } => match file {
            Some(path) if consume => cache.put_file(&key, &path)?,
            Some(path) => {
                let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
                cache.put_reader(&key, file)?;
            }
            None => cache.put_reader(&key, io::stdin().lock())?,
        },
        Command::Get { key, output } => {
            let mut blob = match cache.get(&key) {
                Ok(blob) => blob,
                Err(e) if e.is_not_found() => return Err(Error::KeyNotFound(key).into()),
                Err(e) => return Err(e.into()),
            };
            match output {
                Some(path) => {
                    let mut file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
                    io::copy(&mut blob, &mut file)?;
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    io::copy(&mut blob, &mut stdout)?;
                    stdout.flush()?;
                }
            }
        }
        Command::Remove { key } => {
            if !cache.remove(&key)? {
                return Err(Error::KeyNotFound(key).into());
            }
        }
        Command::Keys { decode } => {
            let mut stdout = io::stdout().lock();
            for name in cache.keys() {
                let line = if decode {
                    naming::decode(&name).unwrap_or_else(|| {
                        tracing::warn!("[cli]: {name} cannot be decoded, print it as is");
                        name.clone()
                    })
                } else {
                    name
                };
                writeln!(stdout, "{line}")?;
            }
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&cache.usage())?);
        }
    }

    Ok(())
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_line_number(true),
        )
        .with(EnvFilter::from_default_env())
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logger();

    run(Cli::parse())
}
