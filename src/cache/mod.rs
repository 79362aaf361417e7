//! Content-addressed store of captured output streams.
//!
//! Each entry is two files named after the unit's content hash. Entries are
//! never expired; they live until cleared by hand.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::error::Result;

const STDOUT_EXT: &str = "stdout";
const STDERR_EXT: &str = "stderr";

/// Captured streams of one recorded run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open the store, creating its directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the stdout and stderr files for `hash`.
    pub fn paths(&self, hash: &str) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{}.{}", hash, STDOUT_EXT)),
            self.dir.join(format!("{}.{}", hash, STDERR_EXT)),
        )
    }

    /// An entry exists when at least one of its stream files does.
    pub fn exists(&self, hash: &str) -> bool {
        let (out, err) = self.paths(hash);
        out.exists() || err.exists()
    }

    pub fn read(&self, hash: &str) -> Result<Option<CacheEntry>> {
        if !self.exists(hash) {
            return Ok(None);
        }
        let (out, err) = self.paths(hash);
        Ok(Some(CacheEntry {
            stdout: read_or_empty(&out)?,
            stderr: read_or_empty(&err)?,
        }))
    }

    /// Persist both streams. Each file is replaced atomically, so concurrent
    /// writers of the same hash end with one complete capture.
    pub fn write(&self, hash: &str, entry: &CacheEntry) -> Result<()> {
        let (out, err) = self.paths(hash);
        self.write_atomic(&out, &entry.stdout)?;
        self.write_atomic(&err, &entry.stderr)?;
        Ok(())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Hashes of stored entries, oldest first.
    pub fn list(&self) -> Vec<String> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(STDOUT_EXT)
                || p.extension().and_then(|s| s.to_str()) == Some(STDERR_EXT))
            .collect();
        files.sort_by_key(|p| fs::metadata(p).and_then(|m| m.modified()).ok());

        let mut hashes: Vec<String> = Vec::new();
        for p in files {
            if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
                if !hashes.iter().any(|h| h == stem) {
                    hashes.push(stem.to_string());
                }
            }
        }
        hashes
    }

    /// Remove every entry; returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let hashes = self.list();
        for hash in &hashes {
            let (out, err) = self.paths(hash);
            remove_if_present(&out)?;
            remove_if_present(&err)?;
        }
        Ok(hashes.len())
    }
}

fn read_or_empty(path: &Path) -> io::Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(out: &str, err: &str) -> CacheEntry {
        CacheEntry { stdout: out.as_bytes().to_vec(), stderr: err.as_bytes().to_vec() }
    }

    #[test]
    fn open_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("cache");
        CacheStore::open(&dir).unwrap();
        CacheStore::open(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        assert!(!store.exists("abc"));
        assert_eq!(store.read("abc").unwrap(), None);

        store.write("abc", &entry("out\n", "err\n")).unwrap();
        assert!(store.exists("abc"));
        assert_eq!(store.read("abc").unwrap(), Some(entry("out\n", "err\n")));
    }

    #[test]
    fn one_stream_file_is_enough() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        let (_, err) = store.paths("h1");
        fs::write(&err, b"only stderr").unwrap();
        assert!(store.exists("h1"));
        assert_eq!(store.read("h1").unwrap(), Some(entry("", "only stderr")));
    }

    #[test]
    fn last_writer_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        store.write("h", &entry("first", "")).unwrap();
        store.write("h", &entry("second", "e")).unwrap();
        assert_eq!(store.read("h").unwrap(), Some(entry("second", "e")));
    }

    #[test]
    fn list_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(tmp.path()).unwrap();
        store.write("one", &entry("1", "")).unwrap();
        store.write("two", &entry("2", "")).unwrap();
        fs::write(tmp.path().join("unrelated.txt"), b"x").unwrap();

        let mut listed = store.list();
        listed.sort();
        assert_eq!(listed, vec!["one".to_string(), "two".to_string()]);

        assert_eq!(store.clear().unwrap(), 2);
        assert!(!store.exists("one"));
        assert!(tmp.path().join("unrelated.txt").exists());
    }
}
