use std::path::PathBuf;

/// error type for casfs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid sharding: depth {depth} x width {width} leaves no filename in a {digest_len} char digest")]
    InvalidSharding {
        depth: usize,
        width: usize,
        digest_len: usize,
    },

    #[error("unsupported filesystem protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("filesystem root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("content not found: {0}")]
    NotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("consistency violation: expected a directory at {0}, found a file")]
    DirectoryExpected(String),

    #[error("consistency violation: stored content at {0} differs from new content with the same digest")]
    DigestCollision(String),

    #[error("expected a file at {0}")]
    FileExpected(String),

    #[error("directory already exists: {0}")]
    DirectoryExists(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read content stream: {0}")]
    Read(#[source] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// true for the errors raised when configuring a store
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedAlgorithm(_)
                | Error::InvalidSharding { .. }
                | Error::UnsupportedProtocol(_)
                | Error::RootNotFound(_)
                | Error::Config(_)
        )
    }

    /// true when the filesystem holds something this layer cannot reconcile
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Error::DirectoryExpected(_) | Error::DigestCollision(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
