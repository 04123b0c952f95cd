use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// location of a piece of content inside a store
///
/// two addresses are equal when `id` and `relpath` match; `is_duplicate` is a
/// per-call signal from `put` and takes no part in equality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HashAddress {
    /// hex digest of the content
    pub id: String,
    /// path relative to the store root
    pub relpath: String,
    /// set by `put`: whether the content was already stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
}

impl HashAddress {
    /// address resolved by a lookup
    pub fn new(id: impl Into<String>, relpath: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            relpath: relpath.into(),
            is_duplicate: None,
        }
    }

    /// address returned by a write
    pub fn written(id: impl Into<String>, relpath: impl Into<String>, is_duplicate: bool) -> Self {
        Self {
            id: id.into(),
            relpath: relpath.into(),
            is_duplicate: Some(is_duplicate),
        }
    }

    /// true only when `put` found the content already stored
    pub fn is_duplicate(&self) -> bool {
        self.is_duplicate.unwrap_or(false)
    }
}

impl PartialEq for HashAddress {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.relpath == other.relpath
    }
}

impl Eq for HashAddress {}

impl Hash for HashAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.relpath.hash(state);
    }
}

impl fmt::Display for HashAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.relpath)
    }
}

/// anything a store can resolve: a digest, a relative path or an address
pub trait Key {
    fn key(&self) -> &str;
}

impl Key for str {
    fn key(&self) -> &str {
        self
    }
}

impl Key for String {
    fn key(&self) -> &str {
        self
    }
}

/// addresses resolve through their stored location
impl Key for HashAddress {
    fn key(&self) -> &str {
        &self.relpath
    }
}

impl<K: Key + ?Sized> Key for &K {
    fn key(&self) -> &str {
        (**self).key()
    }
}
