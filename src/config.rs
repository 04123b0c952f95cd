use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::Algorithm;

pub const DEFAULT_DEPTH: usize = 2;
pub const DEFAULT_WIDTH: usize = 2;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// store configuration, optionally kept in a TOML file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    /// number of nested directories above each stored file
    pub depth: usize,
    /// digest characters consumed by each directory level
    pub width: usize,
    /// hash function deriving content ids
    pub algorithm: Algorithm,
    /// permission bits for directories the store creates
    pub dir_mode: u32,
    /// compare bytes with the stored copy when `put` finds an existing digest
    pub verify_duplicates: bool,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            width: DEFAULT_WIDTH,
            algorithm: Algorithm::default(),
            dir_mode: DEFAULT_DIR_MODE,
            verify_duplicates: false,
        }
    }
}

impl CasConfig {
    /// config with the given sharding and defaults for everything else
    pub fn with_sharding(depth: usize, width: usize) -> Self {
        Self {
            depth,
            width,
            ..Self::default()
        }
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    pub fn verify_duplicates(mut self, verify: bool) -> Self {
        self.verify_duplicates = verify;
        self
    }

    /// check that every digest leaves a non-empty leaf filename
    pub fn validate(&self) -> Result<()> {
        let digest_len = self.algorithm.hex_len();
        if self.depth != 0
            && self.width != 0
            && self.depth.saturating_mul(self.width) >= digest_len
        {
            return Err(Error::InvalidSharding {
                depth: self.depth,
                width: self.width,
                digest_len,
            });
        }
        Ok(())
    }

    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: CasConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}
