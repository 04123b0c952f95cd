//! the content-addressed store
//!
//! content is hashed, the digest is sharded into a relative path and the bytes
//! are written there once. the filesystem layout is the only persisted state:
//! an address is always re-derived from the digest and the store's sharding.

mod repair;

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;

use tracing::debug;

use crate::address::{HashAddress, Key};
use crate::config::CasConfig;
use crate::error::{Error, Result};
use crate::fs::{dirname, normalize, open_fs, Filesystem, LocalFs};
use crate::hash::{compute_hash, Algorithm, CHUNK_SIZE};
use crate::shard::{shard_path, unshard};

pub use repair::Misplaced;

/// content-addressed store over one filesystem handle
#[derive(Debug)]
pub struct Store<F: Filesystem = Box<dyn Filesystem>> {
    fs: F,
    config: CasConfig,
}

impl Store<Box<dyn Filesystem>> {
    /// open a store from a connection string, see [`open_fs`]
    pub fn from_uri(uri: &str, config: CasConfig) -> Result<Self> {
        config.validate()?;
        Self::new(open_fs(uri)?, config)
    }
}

impl Store<LocalFs> {
    /// store rooted at an existing local directory
    pub fn at_path(path: impl Into<PathBuf>, config: CasConfig) -> Result<Self> {
        config.validate()?;
        Self::new(LocalFs::new(path)?, config)
    }
}

impl<F: Filesystem> Store<F> {
    /// wrap a filesystem handle; fails on an invalid configuration
    pub fn new(fs: F, config: CasConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { fs, config })
    }

    /// the filesystem underneath
    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn config(&self) -> &CasConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.config.depth
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    /// store everything `content` yields from its current position
    ///
    /// the stream is read twice: once to hash, once to write. if a file already
    /// sits at the derived path the write is skipped and the address is marked
    /// as a duplicate; equal digests are taken to mean equal bytes unless
    /// `verify_duplicates` is set.
    pub fn put<R: Read + Seek>(&self, mut content: R) -> Result<HashAddress> {
        let start = content.stream_position().map_err(Error::Read)?;
        let id = compute_hash(&mut content, self.config.algorithm)?;
        let relpath = self.hashid_to_path(&id);
        content.seek(SeekFrom::Start(start)).map_err(Error::Read)?;

        let is_duplicate = if self.fs.is_file(&relpath) {
            if self.config.verify_duplicates {
                self.verify_duplicate(&relpath, &mut content)?;
            }
            true
        } else {
            self.make_dirs(dirname(&relpath))?;
            self.fs.write(&relpath, &mut content)?;
            false
        };

        debug!(id = %id, relpath = %relpath, duplicate = is_duplicate, "put");
        Ok(HashAddress::written(id, relpath, is_duplicate))
    }

    /// store an in-memory buffer
    pub fn put_bytes(&self, data: &[u8]) -> Result<HashAddress> {
        self.put(Cursor::new(data))
    }

    /// resolve a digest, relative path or address; `None` when nothing is stored there
    pub fn get<K: Key + ?Sized>(&self, key: &K) -> Option<HashAddress> {
        let path = self.fs_path(key.key())?;
        Some(HashAddress::new(unshard(&path), path))
    }

    /// open stored content for reading
    pub fn open<K: Key + ?Sized>(&self, key: &K) -> Result<Box<dyn Read + Send>> {
        let key = key.key();
        let path = self
            .fs_path(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        self.fs.open(&path)
    }

    /// remove stored content and any directories left empty by it.
    /// deleting absent content is not an error.
    pub fn delete<K: Key + ?Sized>(&self, key: &K) -> Result<()> {
        let Some(path) = self.fs_path(key.key()) else {
            return Ok(());
        };

        match self.fs.remove(&path) {
            Ok(()) => {}
            // a concurrent delete got there first
            Err(Error::ResourceNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        }
        debug!(relpath = %path, "delete");

        self.remove_empty(dirname(&path))
    }

    pub fn exists<K: Key + ?Sized>(&self, key: &K) -> bool {
        self.fs_path(key.key()).is_some()
    }

    /// relative paths of every stored file, in no particular order
    pub fn files(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.fs.walk().filter_map(|entry| match entry {
            Ok(entry) if entry.is_file() => Some(Ok(entry.path)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }

    /// directories that directly hold at least one file
    ///
    /// directories holding only subdirectories are not reported. the root is
    /// reported as `""` when files sit directly in it.
    pub fn folders(&self) -> impl Iterator<Item = Result<String>> + '_ {
        let mut seen = HashSet::new();
        self.files().filter_map(move |path| match path {
            Ok(path) => {
                let dir = dirname(&path);
                if seen.contains(dir) {
                    None
                } else {
                    seen.insert(dir.to_string());
                    Some(Ok(dir.to_string()))
                }
            }
            Err(e) => Some(Err(e)),
        })
    }

    /// number of stored files
    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for path in self.files() {
            path?;
            count += 1;
        }
        Ok(count)
    }

    /// total bytes of all stored files
    pub fn size(&self) -> Result<u64> {
        let mut total = 0;
        for entry in self.fs.walk() {
            let entry = entry?;
            if entry.is_file() {
                total += entry.size;
            }
        }
        Ok(total)
    }

    /// OS path of stored content, when the filesystem has one
    pub fn syspath<K: Key + ?Sized>(&self, key: &K) -> Option<PathBuf> {
        let path = self.fs_path(key.key())?;
        self.fs.syspath(&path)
    }

    /// relative path a digest is stored at under the current sharding
    pub fn hashid_to_path(&self, id: &str) -> String {
        shard_path(id, self.config.depth, self.config.width)
    }

    /// the key as an existing path, else the key as a digest
    fn fs_path(&self, key: &str) -> Option<String> {
        if self.fs.is_file(key) {
            return normalize(key).ok();
        }

        let path = self.hashid_to_path(key);
        if self.fs.is_file(&path) {
            return Some(path);
        }

        None
    }

    fn make_dirs(&self, dir: &str) -> Result<()> {
        if dir.is_empty() {
            return Ok(());
        }
        self.fs.make_dirs(dir, self.config.dir_mode, true)
    }

    /// remove `dir` and then each parent while they are empty, stopping below the root
    fn remove_empty(&self, dir: &str) -> Result<()> {
        let mut dir = dir;
        while !dir.is_empty() {
            match self.fs.remove_dir(dir) {
                Ok(()) => {}
                Err(Error::DirectoryNotEmpty(_)) => return Ok(()),
                // already pruned
                Err(Error::ResourceNotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            }
            dir = dirname(dir);
        }
        Ok(())
    }

    fn verify_duplicate(&self, relpath: &str, content: &mut dyn Read) -> Result<()> {
        let mut stored = self.fs.open(relpath)?;
        if same_bytes(&mut *stored, content)? {
            Ok(())
        } else {
            Err(Error::DigestCollision(relpath.to_string()))
        }
    }
}

/// compare two streams chunk by chunk
fn same_bytes(a: &mut dyn Read, b: &mut dyn Read) -> Result<bool> {
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];
    loop {
        let n_a = fill(a, &mut buf_a)?;
        let n_b = fill(b, &mut buf_b)?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// read until `buf` is full or the stream ends
fn fill(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Read(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use crate::hash::hash_bytes;
    use tempfile::{tempdir, TempDir};

    fn mem_store() -> Store<MemoryFs> {
        Store::new(MemoryFs::new(), CasConfig::default()).unwrap()
    }

    fn disk_store() -> (TempDir, Store<LocalFs>) {
        let dir = tempdir().unwrap();
        let store = Store::at_path(dir.path(), CasConfig::default()).unwrap();
        (dir, store)
    }

    fn read_content<F: Filesystem, K: Key + ?Sized>(store: &Store<F>, key: &K) -> Vec<u8> {
        let mut out = Vec::new();
        store.open(key).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    fn check_put_get<F: Filesystem>(store: &Store<F>) {
        let ak = store.put_bytes(b"content").unwrap();

        assert_eq!(ak.id.len(), 64);
        assert!(ak.id.starts_with("ed7"));
        assert_eq!(ak.relpath, format!("{}/{}/{}", &ak.id[..2], &ak.id[2..4], &ak.id[4..]));
        assert_eq!(ak.is_duplicate, Some(false));

        // any of the three key forms resolves to the same address
        assert_eq!(store.get(&ak), Some(ak.clone()));
        assert_eq!(store.get(&ak.id), Some(ak.clone()));
        assert_eq!(store.get(ak.relpath.as_str()), Some(ak.clone()));
        assert_eq!(store.get(&ak).unwrap().is_duplicate, None);
        assert!(store.exists(&ak));

        assert_eq!(read_content(store, &ak.id), b"content");
        assert_eq!(read_content(store, &ak), b"content");
    }

    #[test]
    fn test_put_get_memory() {
        check_put_get(&mem_store());
    }

    #[test]
    fn test_put_get_disk() {
        let (_dir, store) = disk_store();
        check_put_get(&store);
    }

    #[test]
    fn test_get_missing() {
        let store = mem_store();
        assert_eq!(store.get("random"), None);
        assert_eq!(store.get(""), None);
        assert!(!store.exists("random"));
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let store = mem_store();
        assert!(matches!(
            store.open("random"),
            Err(Error::NotFound(k)) if k == "random"
        ));
    }

    #[test]
    fn test_put_deduplicates() {
        let store = mem_store();
        let a = store.put_bytes(b"A").unwrap();
        let b = store.put_bytes(b"A").unwrap();

        assert_eq!(a, b);
        assert!(!a.is_duplicate());
        assert!(b.is_duplicate());
        assert_eq!(store.count().unwrap(), 1);

        // deleting through one address removes the shared content
        store.delete(&a).unwrap();
        assert!(!store.exists(&b));
    }

    #[test]
    fn test_put_from_stream_position() {
        let store = mem_store();
        let mut cursor = Cursor::new(b"skip:payload".to_vec());
        cursor.seek(SeekFrom::Start(5)).unwrap();

        let addr = store.put(&mut cursor).unwrap();
        assert_eq!(addr.id, hash_bytes(b"payload", Algorithm::Sha256));
        assert_eq!(read_content(&store, &addr), b"payload");
    }

    #[test]
    fn test_delete_and_stats() {
        let (_dir, store) = disk_store();
        let ak = store.put_bytes(b"content").unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.size().unwrap(), 7);

        store.delete(&ak).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.size().unwrap(), 0);
        assert!(!store.exists(&ak));

        // shard directories were pruned back to the root
        assert_eq!(store.fs().walk().count(), 0);

        // deleting again is a no-op
        store.delete(&ak).unwrap();
        store.delete("random").unwrap();

        assert!(matches!(store.open(&ak), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_keeps_shared_shard_dirs() {
        let store = Store::new(MemoryFs::new(), CasConfig::with_sharding(1, 1)).unwrap();
        // with one-char buckets, find two contents that share a bucket
        let mut by_bucket = std::collections::HashMap::new();
        let mut pair = None;
        for i in 0..64 {
            let data = format!("item {i}");
            let id = hash_bytes(data.as_bytes(), Algorithm::Sha256);
            if let Some(prev) = by_bucket.insert(id[..1].to_string(), data.clone()) {
                pair = Some((prev, data));
                break;
            }
        }
        let (first, second) = pair.unwrap();

        let a = store.put_bytes(first.as_bytes()).unwrap();
        let b = store.put_bytes(second.as_bytes()).unwrap();
        store.delete(&a).unwrap();

        assert!(store.exists(&b));
        assert!(store.fs().is_dir(dirname(&b.relpath)));
    }

    #[test]
    fn test_files_and_folders() {
        let store = mem_store();
        let a = store.put_bytes(b"A").unwrap();
        let b = store.put_bytes(b"B").unwrap();
        let c = store.put_bytes(b"C").unwrap();

        let files: HashSet<String> = store.files().collect::<Result<_>>().unwrap();
        let expected: HashSet<String> = [a.relpath, b.relpath, c.relpath].into_iter().collect();
        assert_eq!(files, expected);

        // only leaf directories hold files; first-level buckets are never reported
        let folders: Vec<String> = store.folders().collect::<Result<_>>().unwrap();
        assert_eq!(folders.len(), 3);
        assert!(folders.iter().all(|f| f.len() == 5 && f.contains('/')));
    }

    #[test]
    fn test_two_contents_two_folders() {
        let store = mem_store();
        store.put_bytes(b"A").unwrap();
        store.put_bytes(b"B").unwrap();
        assert_eq!(store.folders().count(), 2);
    }

    #[test]
    fn test_flat_store_reports_root_folder() {
        let store = Store::new(MemoryFs::new(), CasConfig::with_sharding(0, 2)).unwrap();
        let addr = store.put_bytes(b"flat").unwrap();
        assert_eq!(addr.relpath, addr.id);
        let folders: Vec<String> = store.folders().collect::<Result<_>>().unwrap();
        assert_eq!(folders, vec![String::new()]);
    }

    #[test]
    fn test_invalid_sharding_rejected_at_construction() {
        let result = Store::new(MemoryFs::new(), CasConfig::with_sharding(16, 4));
        assert!(matches!(result, Err(Error::InvalidSharding { .. })));
    }

    #[test]
    fn test_unreachable_root_rejected_at_construction() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            Store::at_path(&missing, CasConfig::default()),
            Err(Error::RootNotFound(_))
        ));
        assert!(matches!(
            Store::from_uri("random://face", CasConfig::default()),
            Err(Error::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_open_by_uri() {
        let store = Store::from_uri("temp://face", CasConfig::default()).unwrap();
        let addr = store.put_bytes(b"A").unwrap();
        assert_eq!(read_content(&store, &addr), b"A");
    }

    #[test]
    fn test_syspath() {
        let (dir, disk) = disk_store();
        let addr = disk.put_bytes(b"A").unwrap();
        let path = disk.syspath(&addr).unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"A");

        let mem = mem_store();
        let addr = mem.put_bytes(b"A").unwrap();
        assert_eq!(mem.syspath(&addr), None);
        assert_eq!(disk.syspath("random"), None);
    }

    #[test]
    fn test_blocked_shard_dir_is_consistency_violation() {
        let store = mem_store();
        let id = hash_bytes(b"A", Algorithm::Sha256);
        // a stray file occupies the first-level bucket
        store.fs().write(&id[..2], &mut Cursor::new(b"junk")).unwrap();

        let err = store.put_bytes(b"A").unwrap_err();
        assert!(err.is_consistency_violation());
        assert!(matches!(err, Error::DirectoryExpected(p) if p == id[..2]));
    }

    #[test]
    fn test_remove_empty_missing_dir_is_noop() {
        let store = mem_store();
        store.remove_empty("ab/cd").unwrap();
    }

    #[test]
    fn test_verify_duplicates() {
        let store = Store::new(
            MemoryFs::new(),
            CasConfig::default().verify_duplicates(true),
        )
        .unwrap();
        let addr = store.put_bytes(b"A").unwrap();
        assert!(store.put_bytes(b"A").unwrap().is_duplicate());

        // simulate a collision: different bytes at A's address
        store
            .fs()
            .write(&addr.relpath, &mut Cursor::new(b"not A"))
            .unwrap();
        assert!(matches!(
            store.put_bytes(b"A"),
            Err(Error::DigestCollision(_))
        ));

        // the default fast path trusts the digest
        let trusting = Store::new(store.fs().clone(), CasConfig::default()).unwrap();
        assert!(trusting.put_bytes(b"A").unwrap().is_duplicate());
    }

    #[test]
    fn test_same_bytes() {
        let big: Vec<u8> = (0..CHUNK_SIZE * 2 + 5).map(|i| i as u8).collect();
        let mut other = big.clone();
        assert!(same_bytes(&mut Cursor::new(&big), &mut Cursor::new(&other)).unwrap());
        *other.last_mut().unwrap() ^= 1;
        assert!(!same_bytes(&mut Cursor::new(&big), &mut Cursor::new(&other)).unwrap());
        assert!(!same_bytes(&mut Cursor::new(&big[..10]), &mut Cursor::new(&big)).unwrap());
    }

    #[test]
    fn test_other_algorithms() {
        let store = Store::new(
            MemoryFs::new(),
            CasConfig::with_sharding(3, 3).algorithm(Algorithm::Blake3),
        )
        .unwrap();
        let addr = store.put_bytes(b"content").unwrap();
        assert_eq!(addr.id, hash_bytes(b"content", Algorithm::Blake3));
        assert_eq!(addr.relpath.split('/').count(), 4);
        assert_eq!(store.get(&addr.id), Some(addr));
    }
}
