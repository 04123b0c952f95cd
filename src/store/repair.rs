//! reconcile stored files with the paths their digests map to
//!
//! files end up away from their derived path when a store is reopened with
//! different sharding, or when the raw files of another store are copied in.
//! repair is a maintenance pass: it assumes no concurrent writers.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::Store;
use crate::address::HashAddress;
use crate::error::Result;
use crate::fs::{dirname, Filesystem};
use crate::hash::compute_hash;

/// a stored file found away from the path its digest maps to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Misplaced {
    /// where the file actually is
    pub path: String,
    /// where its content belongs under the store's sharding
    pub expected: HashAddress,
}

impl<F: Filesystem> Store<F> {
    /// list every misplaced file without touching anything
    pub fn corrupted(&self) -> Result<Vec<Misplaced>> {
        let mut found = Vec::new();

        for path in self.files() {
            let path = path?;
            let id = {
                let mut reader = self.fs.open(&path)?;
                compute_hash(&mut reader, self.config.algorithm)?
            };

            let expected = self.hashid_to_path(&id);
            if expected != path {
                found.push(Misplaced {
                    path,
                    expected: HashAddress::new(id, expected),
                });
            }
        }

        Ok(found)
    }

    /// move misplaced files to their derived paths, dropping redundant copies
    ///
    /// returns the files acted on; correctly placed files are not reported.
    /// directories emptied along the way are pruned.
    pub fn repair(&self) -> Result<Vec<Misplaced>> {
        let misplaced = self.corrupted()?;
        let mut moved = 0usize;

        for item in &misplaced {
            let expected = &item.expected.relpath;
            if self.fs.is_file(expected) {
                // content already at home, this copy is redundant
                self.fs.remove(&item.path)?;
                debug!(path = %item.path, id = %item.expected.id, "removed redundant copy");
            } else {
                self.make_dirs(dirname(expected))?;
                self.fs.rename(&item.path, expected)?;
                moved += 1;
                debug!(from = %item.path, to = %expected, "moved");
            }
        }

        let touched: BTreeSet<&str> = misplaced.iter().map(|m| dirname(&m.path)).collect();
        for dir in touched {
            self.remove_empty(dir)?;
        }

        info!(
            repaired = misplaced.len(),
            moved,
            removed = misplaced.len() - moved,
            "repair finished"
        );
        Ok(misplaced)
    }
}
