//! filesystem backends a store can sit on
//!
//! paths handed to a [`Filesystem`] are `/`-separated and relative to its root.
//! a leading `/` and `.` segments are ignored, `..` is rejected so no path can
//! escape the root. the root itself is the empty path.

mod local;
mod memory;

use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::hash::CHUNK_SIZE;

pub use local::LocalFs;
pub use memory::MemoryFs;

/// lazy sequence of walk entries
pub type Walk<'a> = Box<dyn Iterator<Item = Result<Entry>> + 'a>;

/// kind of node found while walking
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// one node of a filesystem walk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    /// byte length for files, zero for directories
    pub size: u64,
}

impl Entry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// primitives a store needs from the filesystem underneath it
pub trait Filesystem: fmt::Debug + Send + Sync {
    /// open a file for reading
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// write everything `content` yields to a file, replacing any existing file.
    /// the parent directory must already exist.
    fn write(&self, path: &str, content: &mut dyn Read) -> Result<u64>;

    fn is_file(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// remove a file
    fn remove(&self, path: &str) -> Result<()>;

    /// remove an empty directory
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// move a file, replacing any file at `dst`. the parent of `dst` must exist.
    fn rename(&self, src: &str, dst: &str) -> Result<()>;

    /// create `path` and every missing ancestor with permission bits `mode`.
    /// fails with `DirectoryExpected` when an existing file is in the way.
    fn make_dirs(&self, path: &str, mode: u32, recreate: bool) -> Result<()>;

    /// every file and directory below the root, parents before children
    fn walk(&self) -> Walk<'_>;

    /// real OS path of a file, for backends that have one
    fn syspath(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

impl<F: Filesystem + ?Sized> Filesystem for Box<F> {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        (**self).open(path)
    }

    fn write(&self, path: &str, content: &mut dyn Read) -> Result<u64> {
        (**self).write(path, content)
    }

    fn is_file(&self, path: &str) -> bool {
        (**self).is_file(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        (**self).is_dir(path)
    }

    fn remove(&self, path: &str) -> Result<()> {
        (**self).remove(path)
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        (**self).remove_dir(path)
    }

    fn rename(&self, src: &str, dst: &str) -> Result<()> {
        (**self).rename(src, dst)
    }

    fn make_dirs(&self, path: &str, mode: u32, recreate: bool) -> Result<()> {
        (**self).make_dirs(path, mode, recreate)
    }

    fn walk(&self) -> Walk<'_> {
        (**self).walk()
    }

    fn syspath(&self, path: &str) -> Option<PathBuf> {
        (**self).syspath(path)
    }
}

/// open a filesystem from a connection string
///
/// - `mem://` a fresh in-memory filesystem
/// - `temp://[prefix]` a temporary directory, removed when the handle drops
/// - `file://path`, `osfs://path` or a bare path: an existing local directory
pub fn open_fs(uri: &str) -> Result<Box<dyn Filesystem>> {
    match uri.split_once("://") {
        Some(("mem", _)) => Ok(Box::new(MemoryFs::new())),
        Some(("temp", prefix)) => Ok(Box::new(LocalFs::temp(prefix)?)),
        Some(("file" | "osfs", path)) => Ok(Box::new(LocalFs::new(path)?)),
        Some((scheme, _)) => Err(Error::UnsupportedProtocol(scheme.to_string())),
        None => Ok(Box::new(LocalFs::new(uri)?)),
    }
}

/// copy every file of `src` into `dst` at the same relative paths
pub fn copy_fs<S, D>(src: &S, dst: &D, dir_mode: u32) -> Result<usize>
where
    S: Filesystem + ?Sized,
    D: Filesystem + ?Sized,
{
    let mut copied = 0;
    for entry in src.walk() {
        let entry = entry?;
        match entry.kind {
            EntryKind::Dir => dst.make_dirs(&entry.path, dir_mode, true)?,
            EntryKind::File => {
                let parent = dirname(&entry.path);
                if !parent.is_empty() {
                    dst.make_dirs(parent, dir_mode, true)?;
                }
                let mut reader = src.open(&entry.path)?;
                dst.write(&entry.path, &mut reader)?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// canonical form of a relative path
pub fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(Error::InvalidPath(path.to_string())),
            _ => parts.push(part),
        }
    }
    Ok(parts.join("/"))
}

/// parent of a normalized path, empty for top-level entries
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// every proper ancestor of a normalized path, outermost first
pub(crate) fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

/// stream `reader` into `writer`, keeping read and write failures apart
pub(crate) fn copy_stream(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    path: impl Into<PathBuf>,
) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Read(e)),
        };
        if let Err(source) = writer.write_all(&buf[..n]) {
            return Err(Error::Io {
                path: path.into(),
                source,
            });
        }
        total += n as u64;
    }
    Ok(total)
}
