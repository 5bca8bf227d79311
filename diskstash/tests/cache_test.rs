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

//! Integration tests for the disk cache.

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::Path,
    thread,
    time::{Duration, SystemTime},
};

use diskstash::{naming, Cache, CacheBuilder, Compression, ErrorKind};

const BLOBS: &[(&str, &[u8])] = &[
    (
        "gopher",
        b"The Go gopher is an iconic mascot and one of the most distinctive features of the Go project.",
    ),
    ("io/ioutil", b"Package ioutil implements some I/O utility functions."),
    (
        "testing.go",
        b"Package testing provides support for automated testing of Go packages.",
    ),
    ("empty.txt", b""),
    ("hello-world", b"Hello, world!"),
    ("null", &[0]),
];

const COMPRESSIONS: [Compression; 3] = [Compression::None, Compression::Lz4, Compression::Zstd];

fn read(cache: &Cache, key: &str) -> Vec<u8> {
    let mut buf = vec![];
    cache.get(key).unwrap().read_to_end(&mut buf).unwrap();
    buf
}

/// Yields `len` bytes, then fails.
struct BrokenReader {
    len: usize,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.len == 0 {
            return Err(io::Error::other("connection reset"));
        }
        let n = self.len.min(buf.len());
        buf[..n].fill(b'x');
        self.len -= n;
        Ok(n)
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    names.sort();
    names
}

fn set_mtime(path: &Path, secs: u64) {
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    File::options().write(true).open(path).unwrap().set_modified(mtime).unwrap();
}

#[test]
fn test_new() {
    let dir = tempfile::tempdir().unwrap();

    for (d, bytes, entries, message) in [
        ("", 2048, 4, "bad directory"),
        (dir.path().to_str().unwrap(), 0, 0, "bad size"),
        (dir.path().to_str().unwrap(), 2048, 0, "bad capacity"),
    ] {
        let err = Cache::new(d, bytes, entries, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.message(), message);
    }
}

#[test_log::test]
fn test_put_get() {
    for compression in COMPRESSIONS {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheBuilder::new(dir.path())
            .with_max_bytes(2048000)
            .with_max_entries(40)
            .with_compression(compression)
            .build()
            .unwrap();

        for (key, blob) in BLOBS {
            cache.put(key, blob).unwrap();
        }
        assert_eq!(cache.len(), BLOBS.len());

        for (key, blob) in BLOBS {
            assert_eq!(&read(&cache, key), blob, "{compression:?} {key}");
        }

        if compression == Compression::None {
            for (key, blob) in BLOBS {
                assert_eq!(&fs::read(dir.path().join(naming::encode(key))).unwrap(), blob);
            }
        }

        let on_disk = BLOBS
            .iter()
            .map(|(key, _)| fs::metadata(dir.path().join(naming::encode(key))).unwrap().len())
            .sum::<u64>();
        assert_eq!(cache.usage().bytes, on_disk);
    }
}

#[test]
fn test_lz4_file_format() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048000, 40, true).unwrap();

    cache.put("key", b"value").unwrap();

    let file = File::open(dir.path().join("key")).unwrap();
    let mut decoded = vec![];
    lz4::Decoder::new(file).unwrap().read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, b"value");

    // A stream written by another lz4 encoder reads back through the cache.
    let file = File::create(dir.path().join("key")).unwrap();
    let mut encoder = lz4::EncoderBuilder::new().build(file).unwrap();
    encoder.write_all(b"rewritten").unwrap();
    let (_, res) = encoder.finish();
    res.unwrap();

    assert_eq!(read(&cache, "key"), b"rewritten");
}

#[test]
fn test_size_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 10, 40, false).unwrap();

    cache.put("a", b"abcdefgh").unwrap();
    cache.put("b", b"ij").unwrap();
    assert_eq!(cache.keys(), vec!["a", "b"]);

    cache.put("c", b"k").unwrap();
    assert_eq!(cache.keys(), vec!["b", "c"]);
    assert!(!dir.path().join("a").exists());

    cache.put("d", b"l").unwrap();
    assert_eq!(cache.keys(), vec!["b", "c", "d"]);

    cache.put("e", b"m").unwrap();
    assert_eq!(cache.keys(), vec!["b", "c", "d", "e"]);

    cache.put("f", b"nopqrstuvw").unwrap();
    assert_eq!(cache.keys(), vec!["f"]);
    assert_eq!(cache.usage().bytes, 10);
}

#[test]
fn test_count_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 3, false).unwrap();

    cache.put("a", b"abcdefg").unwrap();
    cache.put("b", b"hi").unwrap();
    assert_eq!(cache.keys(), vec!["a", "b"]);

    cache.put("c", b"k").unwrap();
    assert_eq!(cache.keys(), vec!["a", "b", "c"]);

    cache.put("d", b"l").unwrap();
    assert_eq!(cache.keys(), vec!["b", "c", "d"]);

    cache.put("e", b"m").unwrap();
    assert_eq!(cache.keys(), vec!["c", "d", "e"]);

    cache.put("f", b"nopqrstuv").unwrap();
    assert_eq!(cache.keys(), vec!["d", "e", "f"]);

    let usage = cache.usage();
    assert_eq!(usage.entries, 3);
    assert_eq!(usage.bytes, 11);
}

#[test]
fn test_get_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 3, false).unwrap();

    for key in ["a", "b", "c"] {
        cache.put(key, key).unwrap();
    }
    assert_eq!(read(&cache, "a"), b"a");

    // `keys` and `contains` leave recency alone.
    assert_eq!(cache.keys(), cache.keys());
    assert!(cache.contains("b"));

    cache.put("d", b"d").unwrap();
    assert_eq!(cache.keys(), vec!["a", "c", "d"]);
}

#[test]
fn test_replace() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 2, false).unwrap();

    cache.put("a", b"12345").unwrap();
    cache.put("b", b"1").unwrap();
    cache.put("a", b"123").unwrap();

    let usage = cache.usage();
    assert_eq!(usage.entries, 2);
    assert_eq!(usage.bytes, 4);
    assert_eq!(read(&cache, "a"), b"123");

    // The replaced key became most recently used.
    cache.put("c", b"1").unwrap();
    assert_eq!(cache.keys(), vec!["a", "c"]);
}

#[test_log::test]
fn test_too_large() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 10, 40, false).unwrap();

    cache.put("a", b"ab").unwrap();

    let err = cache.put("big", b"abcdefghijk").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooLarge);
    assert_eq!(err.context_value("size"), Some("11"));
    assert_eq!(err.context_value("capacity"), Some("10"));
    assert_eq!(err.context_value("key"), Some("big"));

    assert!(!dir.path().join("big").exists());
    assert_eq!(cache.keys(), vec!["a"]);
    assert_eq!(cache.usage().bytes, 2);
}

#[test]
fn test_put_file() {
    for compression in COMPRESSIONS {
        let dir = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let cache = CacheBuilder::new(dir.path())
            .with_max_bytes(2048000)
            .with_max_entries(40)
            .with_compression(compression)
            .build()
            .unwrap();

        let src = src_dir.path().join("putfile");
        fs::write(&src, b"abcdefgh").unwrap();

        cache.put_file("file", &src).unwrap();
        assert!(!src.exists(), "{compression:?}");
        assert_eq!(read(&cache, "file"), b"abcdefgh");
        assert_eq!(
            cache.usage().bytes,
            fs::metadata(dir.path().join("file")).unwrap().len()
        );
        if compression == Compression::None {
            assert_eq!(fs::read(dir.path().join("file")).unwrap(), b"abcdefgh");
        }
    }
}

#[test]
fn test_put_file_too_large() {
    let dir = tempfile::tempdir().unwrap();
    let src_dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 4, 40, false).unwrap();

    let src = src_dir.path().join("putfile");
    fs::write(&src, b"abcdefgh").unwrap();

    let err = cache.put_file("file", &src).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooLarge);
    assert!(!src.exists());
    assert!(!dir.path().join("file").exists());
    assert!(cache.is_empty());
}

#[test]
fn test_put_file_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    let err = cache.put_file("file", dir.path().join("missing")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(cache.is_empty());
}

#[test]
fn test_put_reader() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 1024 * 1024, 40, true).unwrap();

    let data = (0..100_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    cache.put_reader("stream", &data[..]).unwrap();
    assert_eq!(read(&cache, "stream"), data);
}

#[test_log::test]
fn test_warmup() {
    let dir = tempfile::tempdir().unwrap();
    for (key, blob) in BLOBS {
        fs::write(dir.path().join(naming::encode(key)), blob).unwrap();
    }
    // Directories are not blobs.
    fs::create_dir(dir.path().join("nested")).unwrap();

    let cache = Cache::new(dir.path(), 2048000, 40, false).unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.warmup().unwrap(), BLOBS.len());

    for (key, blob) in BLOBS {
        assert_eq!(&read(&cache, key), blob);
    }
    let total = BLOBS.iter().map(|(_, blob)| blob.len() as u64).sum::<u64>();
    assert_eq!(cache.usage().bytes, total);
    assert!(!cache.contains("nested"));
}

#[test]
fn test_warmup_after_restart() {
    for compression in COMPRESSIONS {
        let dir = tempfile::tempdir().unwrap();
        let builder = CacheBuilder::new(dir.path())
            .with_max_bytes(2048000)
            .with_max_entries(40)
            .with_compression(compression);

        let cache = builder.clone().build().unwrap();
        for (key, blob) in BLOBS {
            cache.put(key, blob).unwrap();
        }
        let usage = cache.usage();
        drop(cache);

        let cache = builder.build().unwrap();
        cache.warmup().unwrap();
        assert_eq!(cache.usage(), usage);
        for (key, blob) in BLOBS {
            assert_eq!(&read(&cache, key), blob, "{compression:?} {key}");
        }
    }
}

#[test]
fn test_warmup_orders_by_mtime() {
    let dir = tempfile::tempdir().unwrap();
    for (key, secs) in [("a", 2000), ("b", 3000), ("c", 1000)] {
        let path = dir.path().join(key);
        fs::write(&path, key).unwrap();
        set_mtime(&path, secs);
    }

    let cache = Cache::new(dir.path(), 2048, 3, false).unwrap();
    cache.warmup().unwrap();

    // `c` has the oldest mtime, so it is the least recently used.
    cache.put("d", b"d").unwrap();
    assert_eq!(cache.keys(), vec!["a", "b", "d"]);
    cache.put("e", b"e").unwrap();
    assert_eq!(cache.keys(), vec!["b", "d", "e"]);
}

#[test]
fn test_warmup_ignores_budgets_until_next_put() {
    let dir = tempfile::tempdir().unwrap();
    for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
        let path = dir.path().join(key);
        fs::write(&path, b"1234").unwrap();
        set_mtime(&path, 1000 + i as u64);
    }

    let cache = Cache::new(dir.path(), 10, 40, false).unwrap();
    assert_eq!(cache.warmup().unwrap(), 4);
    assert_eq!(cache.usage().bytes, 16);

    cache.put("e", b"1").unwrap();
    assert_eq!(cache.keys(), vec!["c", "d", "e"]);
    assert_eq!(cache.usage().bytes, 9);
}

#[test]
fn test_warmup_replaces_index() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    cache.put("a", b"a").unwrap();
    cache.put("b", b"b").unwrap();
    fs::remove_file(dir.path().join("a")).unwrap();

    assert_eq!(cache.warmup().unwrap(), 1);
    assert_eq!(cache.keys(), vec!["b"]);
}

#[test]
fn test_warmup_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path().join("missing"), 2048, 40, false).unwrap();
    assert!(cache.warmup().unwrap_err().is_not_found());
}

#[test_log::test]
fn test_eviction_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 10, 40, false).unwrap();

    cache.put("a", b"abcdefgh").unwrap();

    // Swap the file of `a` for a directory that cannot be removed as a file.
    fs::remove_file(dir.path().join("a")).unwrap();
    fs::create_dir(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a").join("inner"), b"x").unwrap();

    let err = cache.put("b", b"ijk").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.context_value("key"), Some("a"));

    assert_eq!(cache.keys(), vec!["a"]);
    assert_eq!(cache.usage().bytes, 8);
    assert!(!dir.path().join("b").exists());
}

#[test]
fn test_eviction_failure_on_replace() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 10, 40, false).unwrap();

    cache.put("a", b"abcdefgh").unwrap();
    cache.put("k", b"1").unwrap();

    fs::remove_file(dir.path().join("a")).unwrap();
    fs::create_dir(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a").join("inner"), b"x").unwrap();

    // The new `k` only fits once `a` is evicted, which fails.
    let err = cache.put("k", b"12345").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.context_value("key"), Some("a"));

    // The old `k` was overwritten, so the key is gone along with its file.
    assert_eq!(cache.keys(), vec!["a"]);
    assert_eq!(cache.usage().bytes, 8);
    assert!(!dir.path().join("k").exists());
}

#[test]
fn test_store_failure_on_replace() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    cache.put("j", b"ij").unwrap();
    cache.put("k", b"abcdefg").unwrap();

    let err = cache.put_reader("k", BrokenReader { len: 5 }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.context_value("key"), Some("k"));

    assert_eq!(cache.keys(), vec!["j"]);
    let usage = cache.usage();
    assert_eq!(usage.bytes, 2);
    assert_eq!(usage.entries, 1);
    assert_eq!(file_names(dir.path()), vec!["j"]);
    assert_eq!(read(&cache, "j"), b"ij");
}

#[test_log::test]
fn test_cleanup_failure_is_not_returned() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    // An untracked non-empty directory sits where the blob of `k` goes, so neither the store nor the cleanup of
    // the rejected blob can succeed.
    fs::create_dir(dir.path().join("k")).unwrap();
    fs::write(dir.path().join("k").join("inner"), b"x").unwrap();

    let err = cache.put("k", b"value").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.message(), "rename blob file failed");
    assert_eq!(err.context_value("key"), Some("k"));

    assert!(cache.is_empty());
    assert!(dir.path().join("k").is_dir());
    assert_eq!(file_names(dir.path()), vec!["k"]);

    // The cache stays usable.
    cache.put("other", b"value").unwrap();
    assert_eq!(read(&cache, "other"), b"value");
}

#[test]
fn test_open_blob_survives_replace() {
    for compression in COMPRESSIONS {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheBuilder::new(dir.path()).with_compression(compression).build().unwrap();

        cache.put("k", b"0123456789").unwrap();
        let mut blob = cache.get("k").unwrap();
        cache.put("k", b"AB").unwrap();

        let mut buf = vec![];
        blob.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"0123456789", "{compression:?}");
        assert_eq!(read(&cache, "k"), b"AB");
    }
}

#[test]
fn test_long_keys() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048000, 40, true).unwrap();

    let keys = ["a".repeat(300), "é".repeat(50), "é".repeat(200), format!("{}/x", "dir/".repeat(80))];
    for key in &keys {
        cache.put(key, key).unwrap();
    }
    for key in &keys {
        assert!(cache.contains(key));
        assert_eq!(read(&cache, key), key.as_bytes());
    }
    for name in cache.keys() {
        assert!(name.len() <= naming::MAX_NAME_LEN, "{name}");
    }

    // Names are derived from the key alone, so they are found again after a restart.
    let cache = Cache::new(dir.path(), 2048000, 40, true).unwrap();
    assert_eq!(cache.warmup().unwrap(), keys.len());
    for key in &keys {
        assert_eq!(read(&cache, key), key.as_bytes());
    }
    assert!(cache.remove(&keys[0]).unwrap());
    assert_eq!(cache.len(), keys.len() - 1);
}

#[test]
fn test_get_missing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    let err = cache.get("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.context_value("key"), Some("missing"));
}

#[test]
fn test_get_vanished_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    cache.put("a", b"abc").unwrap();
    fs::remove_file(dir.path().join("a")).unwrap();

    assert!(cache.get("a").unwrap_err().is_not_found());
    assert!(!cache.contains("a"));
    assert_eq!(cache.usage().bytes, 0);
}

#[test]
fn test_remove() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    cache.put("io/ioutil", b"abc").unwrap();
    cache.put("b", b"de").unwrap();

    assert!(cache.remove("io/ioutil").unwrap());
    assert!(!dir.path().join("io%2Fioutil").exists());
    assert!(!cache.remove("io/ioutil").unwrap());

    let usage = cache.usage();
    assert_eq!(usage.entries, 1);
    assert_eq!(usage.bytes, 2);
}

#[test]
fn test_special_keys() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();

    for key in ["", ".", "..", "../escape", "a/b/c"] {
        cache.put(key, key).unwrap();
    }
    for key in ["", ".", "..", "../escape", "a/b/c"] {
        assert_eq!(read(&cache, key), key.as_bytes());
    }

    // Every blob is a plain file inside the cache directory.
    let files = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 5);
    assert!(!dir.path().parent().unwrap().join("escape").exists());
}

#[test]
fn test_clone_shares_index() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), 2048, 40, false).unwrap();
    let other = cache.clone();

    cache.put("a", b"a").unwrap();
    assert!(other.contains("a"));
    assert!(other.remove("a").unwrap());
    assert!(cache.is_empty());
}

#[test]
fn test_concurrent() {
    const THREADS: usize = 8;
    const KEYS: usize = 64;
    const MAX_BYTES: u64 = 4096;
    const MAX_ENTRIES: usize = 24;

    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path(), MAX_BYTES, MAX_ENTRIES, false).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..KEYS {
                    let key = format!("{t}-{i}");
                    let value = vec![t as u8; 64 + (i % 7) * 16];
                    cache.put(&key, &value).unwrap();

                    // Keys are owned by a single thread, so a hit always reads the value this thread wrote.
                    let probe = format!("{t}-{}", i / 2);
                    match cache.get(&probe) {
                        Ok(mut blob) => {
                            let mut buf = vec![];
                            blob.read_to_end(&mut buf).unwrap();
                            assert!(buf.iter().all(|b| *b == t as u8));
                        }
                        Err(e) => assert!(e.is_not_found()),
                    }
                }
            });
        }
    });

    let usage = cache.usage();
    assert!(usage.bytes <= MAX_BYTES);
    assert!(usage.entries <= MAX_ENTRIES);

    let files = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().metadata().unwrap().len())
        .collect::<Vec<_>>();
    assert_eq!(files.len(), usage.entries);
    assert_eq!(files.iter().sum::<u64>(), usage.bytes);
}
