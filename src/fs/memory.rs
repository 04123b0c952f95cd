use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ancestors, copy_stream, dirname, normalize, Entry, EntryKind, Filesystem, Walk};
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
enum Node {
    Dir,
    File(Arc<[u8]>),
}

/// in-memory filesystem
///
/// clones are handles onto the same tree. directory modes are accepted and ignored.
#[derive(Clone, Debug, Default)]
pub struct MemoryFs {
    nodes: Arc<RwLock<BTreeMap<String, Node>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// true when both handles refer to the same tree
    pub fn same_tree(&self, other: &MemoryFs) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }
}

fn parent_is_dir(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    let parent = dirname(path);
    parent.is_empty() || matches!(nodes.get(parent), Some(Node::Dir))
}

fn has_children(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    let prefix = format!("{}/", path);
    nodes
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&prefix))
}

impl Filesystem for MemoryFs {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let rel = normalize(path)?;
        match self.nodes.read().get(&rel) {
            Some(Node::File(data)) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            Some(Node::Dir) => Err(Error::FileExpected(rel)),
            None if rel.is_empty() => Err(Error::FileExpected(rel)),
            None => Err(Error::ResourceNotFound(rel)),
        }
    }

    fn write(&self, path: &str, content: &mut dyn Read) -> Result<u64> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Err(Error::FileExpected(path.to_string()));
        }

        // buffer outside the lock so slow readers never block other handles
        let mut data = Vec::new();
        let written = copy_stream(content, &mut data, &rel)?;

        let mut nodes = self.nodes.write();
        if matches!(nodes.get(&rel), Some(Node::Dir)) {
            return Err(Error::FileExpected(rel));
        }
        if !parent_is_dir(&nodes, &rel) {
            return Err(Error::ResourceNotFound(dirname(&rel).to_string()));
        }
        nodes.insert(rel, Node::File(Arc::from(data)));
        Ok(written)
    }

    fn is_file(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(rel) => matches!(self.nodes.read().get(&rel), Some(Node::File(_))),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(rel) => rel.is_empty() || matches!(self.nodes.read().get(&rel), Some(Node::Dir)),
            Err(_) => false,
        }
    }

    fn remove(&self, path: &str) -> Result<()> {
        let rel = normalize(path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&rel) {
            Some(Node::File(_)) => {
                nodes.remove(&rel);
                Ok(())
            }
            Some(Node::Dir) => Err(Error::FileExpected(rel)),
            None => Err(Error::ResourceNotFound(rel)),
        }
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Err(Error::InvalidPath("cannot remove the filesystem root".to_string()));
        }
        let mut nodes = self.nodes.write();
        match nodes.get(&rel) {
            Some(Node::Dir) if has_children(&nodes, &rel) => Err(Error::DirectoryNotEmpty(rel)),
            Some(Node::Dir) => {
                nodes.remove(&rel);
                Ok(())
            }
            Some(Node::File(_)) => Err(Error::DirectoryExpected(rel)),
            None => Err(Error::ResourceNotFound(rel)),
        }
    }

    fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let from = normalize(src)?;
        let to = normalize(dst)?;
        let mut nodes = self.nodes.write();

        if !matches!(nodes.get(&from), Some(Node::File(_))) {
            return Err(Error::ResourceNotFound(from));
        }
        if to.is_empty() || matches!(nodes.get(&to), Some(Node::Dir)) {
            return Err(Error::FileExpected(to));
        }
        if !parent_is_dir(&nodes, &to) {
            return Err(Error::ResourceNotFound(dirname(&to).to_string()));
        }

        if let Some(node) = nodes.remove(&from) {
            nodes.insert(to, node);
        }
        Ok(())
    }

    fn make_dirs(&self, path: &str, _mode: u32, recreate: bool) -> Result<()> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Ok(());
        }

        let mut nodes = self.nodes.write();
        if matches!(nodes.get(&rel), Some(Node::Dir)) {
            return if recreate {
                Ok(())
            } else {
                Err(Error::DirectoryExists(rel))
            };
        }

        for prefix in ancestors(&rel).chain(std::iter::once(rel.as_str())) {
            match nodes.get(prefix) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => return Err(Error::DirectoryExpected(prefix.to_string())),
                None => {
                    nodes.insert(prefix.to_string(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn walk(&self) -> Walk<'_> {
        // snapshot, so callers may modify the tree while iterating
        let entries: Vec<Entry> = self
            .nodes
            .read()
            .iter()
            .map(|(path, node)| match node {
                Node::Dir => Entry {
                    path: path.clone(),
                    kind: EntryKind::Dir,
                    size: 0,
                },
                Node::File(data) => Entry {
                    path: path.clone(),
                    kind: EntryKind::File,
                    size: data.len() as u64,
                },
            })
            .collect();
        Box::new(entries.into_iter().map(Ok))
    }
}
