use std::fs::{self, File, Permissions};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::stat::Mode;
use tempfile::TempDir;
use walkdir::WalkDir;

use super::{ancestors, copy_stream, dirname, normalize, Entry, EntryKind, Filesystem, Walk};
use crate::error::{Error, IoResultExt, Result};

/// filesystem rooted at a directory on local disk
#[derive(Clone, Debug)]
pub struct LocalFs {
    root: PathBuf,
    // keeps a `temp://` root alive for as long as any handle exists
    _temp: Option<Arc<TempDir>>,
}

impl LocalFs {
    /// use an existing directory as the root
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::RootNotFound(root));
        }
        Ok(Self { root, _temp: None })
    }

    /// root in a fresh temporary directory, deleted with the last handle
    pub fn temp(prefix: &str) -> Result<Self> {
        let prefix = if prefix.is_empty() { "casfs" } else { prefix };
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .with_path(std::env::temp_dir())?;
        Ok(Self {
            root: dir.path().to_path_buf(),
            _temp: Some(Arc::new(dir)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(rel))
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Filesystem for LocalFs {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(Error::FileExpected(path.to_string()));
        }
        let file = File::open(&full).map_err(|e| not_found_or_io(e, path, &full))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &str, content: &mut dyn Read) -> Result<u64> {
        let rel = normalize(path)?;
        let full = self.resolve(&rel)?;
        if rel.is_empty() || full.is_dir() {
            return Err(Error::FileExpected(path.to_string()));
        }
        let dir = self.resolve(dirname(&rel))?;
        if !dir.is_dir() {
            return Err(Error::ResourceNotFound(dirname(&rel).to_string()));
        }

        // atomic write: temp file -> fsync -> rename
        let tmp_path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let written = write_file(&tmp_path, content);
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&tmp_path, &full) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Io {
                path: full,
                source: e,
            });
        }
        fsync_dir(&dir)?;

        Ok(written)
    }

    fn is_file(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(Error::FileExpected(path.to_string()));
        }
        fs::remove_file(&full).map_err(|e| not_found_or_io(e, path, &full))
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Err(Error::InvalidPath("cannot remove the filesystem root".to_string()));
        }
        let full = self.resolve(&rel)?;
        if !full.exists() {
            return Err(Error::ResourceNotFound(rel));
        }
        if !full.is_dir() {
            return Err(Error::DirectoryExpected(rel));
        }
        let mut entries = fs::read_dir(&full).with_path(&full)?;
        if entries.next().is_some() {
            return Err(Error::DirectoryNotEmpty(rel));
        }
        fs::remove_dir(&full).map_err(|e| not_found_or_io(e, &rel, &full))
    }

    fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        if !from.is_file() {
            return Err(Error::ResourceNotFound(src.to_string()));
        }
        let dst_rel = normalize(dst)?;
        let to = self.resolve(&dst_rel)?;
        if dst_rel.is_empty() || to.is_dir() {
            return Err(Error::FileExpected(dst.to_string()));
        }
        if !self.is_dir(dirname(&dst_rel)) {
            return Err(Error::ResourceNotFound(dirname(&dst_rel).to_string()));
        }
        fs::rename(&from, &to).with_path(&to)
    }

    fn make_dirs(&self, path: &str, mode: u32, recreate: bool) -> Result<()> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Ok(());
        }

        let full = self.resolve(&rel)?;
        if full.is_dir() {
            return if recreate {
                Ok(())
            } else {
                Err(Error::DirectoryExists(rel))
            };
        }

        for prefix in ancestors(&rel).chain(std::iter::once(rel.as_str())) {
            let dir = self.root.join(prefix);
            if dir.is_dir() {
                continue;
            }
            if dir.exists() {
                return Err(Error::DirectoryExpected(prefix.to_string()));
            }

            let bits = Mode::from_bits_truncate(mode as nix::libc::mode_t);
            match nix::unistd::mkdir(&dir, bits) {
                Ok(()) => {
                    // mkdir is filtered by the umask; apply the configured mode as given
                    fs::set_permissions(&dir, Permissions::from_mode(mode & 0o7777))
                        .with_path(&dir)?;
                }
                // lost a race with another writer creating the same shard
                Err(Errno::EEXIST) if dir.is_dir() => {}
                Err(Errno::EEXIST) => return Err(Error::DirectoryExpected(prefix.to_string())),
                Err(errno) => {
                    return Err(Error::Io {
                        path: dir,
                        source: std::io::Error::from(errno),
                    })
                }
            }
        }

        Ok(())
    }

    fn walk(&self) -> Walk<'_> {
        let iter = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(move |entry| {
                let entry = entry.map_err(|e| {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    Error::Io {
                        path,
                        source: e.into_io_error().unwrap_or_else(|| {
                            std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
                        }),
                    }
                })?;

                let path = self.relative(entry.path());
                if entry.file_type().is_dir() {
                    return Ok(Entry {
                        path,
                        kind: EntryKind::Dir,
                        size: 0,
                    });
                }

                let meta = entry.metadata().map_err(|e| Error::Io {
                    path: entry.path().to_path_buf(),
                    source: e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
                    }),
                })?;
                Ok(Entry {
                    path,
                    kind: EntryKind::File,
                    size: meta.len(),
                })
            });
        Box::new(iter)
    }

    fn syspath(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok().filter(|p| p.exists())
    }
}

fn write_file(path: &Path, content: &mut dyn Read) -> Result<u64> {
    let mut file = File::create(path).with_path(path)?;
    let written = copy_stream(content, &mut file, path)?;
    file.sync_all().with_path(path)?;
    Ok(written)
}

/// fsync a directory
fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}

fn not_found_or_io(e: std::io::Error, rel: &str, full: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::ResourceNotFound(rel.to_string())
    } else {
        Error::Io {
            path: full.to_path_buf(),
            source: e,
        }
    }
}
