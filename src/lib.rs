//! casfs - content-addressable file store
//!
//! stores arbitrary bytes once, under a path derived from their digest, on top of
//! any [`Filesystem`]: a local directory, an in-memory tree, or another backend
//! implementing the trait.
//!
//! # Layout
//!
//! a digest is split into `depth` directories of `width` characters, the rest of
//! the digest is the filename. with the defaults (depth 2, width 2, sha256):
//!
//! ```text
//! ed/70/02b439e9ac845f22357d822bac1444730fbdb6016d3ec9432297b9ec9f73
//! ```
//!
//! nothing else is persisted; the layout is the state. a store reopened with
//! different sharding finds existing content by path and can move it into its
//! own layout with [`Store::repair`].
//!
//! # Example usage
//!
//! ```no_run
//! use casfs::{CasConfig, MemoryFs, Store};
//! use std::io::Read;
//!
//! let store = Store::new(MemoryFs::new(), CasConfig::default()).unwrap();
//!
//! let addr = store.put_bytes(b"a content").unwrap();
//! assert_eq!(store.get(&addr.id), Some(addr.clone()));
//! assert_eq!(store.get("random"), None);
//!
//! let mut content = Vec::new();
//! store.open(&addr).unwrap().read_to_end(&mut content).unwrap();
//! assert_eq!(content, b"a content");
//!
//! store.delete(&addr).unwrap();
//! assert_eq!(store.count().unwrap(), 0);
//! ```

mod address;
mod config;
mod error;
mod hash;
mod shard;
mod store;

pub mod fs;

pub use address::{HashAddress, Key};
pub use config::{CasConfig, DEFAULT_DEPTH, DEFAULT_DIR_MODE, DEFAULT_WIDTH};
pub use error::{Error, Result};
pub use fs::{copy_fs, open_fs, Entry, EntryKind, Filesystem, LocalFs, MemoryFs};
pub use hash::{compute_hash, hash_bytes, Algorithm, Hasher};
pub use shard::{shard, shard_path, unshard};
pub use store::{Misplaced, Store};
