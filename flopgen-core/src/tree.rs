//! Host file tree consumed by the materializer.
//!
//! A tree is a [`HostNode`]: either a file with a declared size and a content
//! source, or a directory with ordered children. Node paths are relative to
//! the top of the tree and become volume paths when written.

use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{ImageError, ImageResult};

/// Relative path of a node, as ordered components.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// Parse a `/`-separated relative path. Empty components are skipped.
    pub fn parse(path: &str) -> Self {
        Self(
            path.split(['/', '\\'])
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Path components from the volume root.
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Last component, or an empty string for the empty path.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Path of a child named `name`.
    pub fn join(&self, name: &str) -> Self {
        let mut components = self.0.clone();
        components.push(name.to_string());
        Self(components)
    }

    /// Path inside the volume: the full relative path, or only the leaf name.
    pub fn to_volume_path(&self, with_dirs: bool) -> String {
        if with_dirs {
            self.0.join("/")
        } else {
            self.name().to_string()
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Where a file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Host(PathBuf),
    Memory(Vec<u8>),
}

/// A regular file in the host tree.
#[derive(Debug, Clone)]
pub struct FileNode {
    path: NodePath,
    size: u64,
    source: FileSource,
}

impl FileNode {
    /// File node with an explicit declared size.
    pub fn new(path: NodePath, size: u64, source: FileSource) -> Self {
        Self { path, size, source }
    }

    /// In-memory file whose declared size is the data length.
    pub fn from_bytes(path: &str, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self::new(NodePath::parse(path), data.len() as u64, FileSource::Memory(data))
    }

    /// Host file, sized from its metadata.
    pub fn from_host(path: NodePath, host_path: impl Into<PathBuf>) -> ImageResult<Self> {
        let host_path = host_path.into();
        let size = fs::metadata(&host_path)?.len();
        Ok(Self::new(path, size, FileSource::Host(host_path)))
    }

    /// Relative path inside the volume.
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Where the content is read from.
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Reader positioned at the start of the content. Every call starts over.
    pub fn open(&self) -> ImageResult<Box<dyn Read + '_>> {
        match &self.source {
            FileSource::Host(host_path) => Ok(Box::new(fs::File::open(host_path)?)),
            FileSource::Memory(data) => Ok(Box::new(Cursor::new(data.as_slice()))),
        }
    }
}

/// A directory in the host tree. Child order is write order.
#[derive(Debug, Clone, Default)]
pub struct DirectoryNode {
    path: NodePath,
    children: Vec<HostNode>,
}

impl DirectoryNode {
    /// Empty directory at a `/`-separated path.
    pub fn new(path: &str) -> Self {
        Self::from_path(NodePath::parse(path))
    }

    /// Empty directory at `path`.
    pub fn from_path(path: NodePath) -> Self {
        Self {
            path,
            children: Vec::new(),
        }
    }

    /// Relative path inside the volume.
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[HostNode] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<HostNode> {
        &mut self.children
    }

    pub(crate) fn into_children(self) -> Vec<HostNode> {
        self.children
    }

    /// Append a child.
    pub fn push(&mut self, child: impl Into<HostNode>) {
        self.children.push(child.into());
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, child: impl Into<HostNode>) -> Self {
        self.push(child);
        self
    }
}

/// File or directory.
#[derive(Debug, Clone)]
pub enum HostNode {
    File(FileNode),
    Directory(DirectoryNode),
}

impl From<FileNode> for HostNode {
    fn from(node: FileNode) -> Self {
        HostNode::File(node)
    }
}

impl From<DirectoryNode> for HostNode {
    fn from(node: DirectoryNode) -> Self {
        HostNode::Directory(node)
    }
}

impl HostNode {
    /// Relative path inside the volume.
    pub fn path(&self) -> &NodePath {
        match self {
            HostNode::File(f) => f.path(),
            HostNode::Directory(d) => d.path(),
        }
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.path().name()
    }

    /// True for directory nodes.
    pub fn is_directory(&self) -> bool {
        matches!(self, HostNode::Directory(_))
    }

    /// Build a node from a host file or directory.
    ///
    /// The node is rooted at its own name: scanning `/home/me/docs` gives a
    /// directory `docs` whose children are `docs/...`. Directory children are
    /// sorted by name so repeated builds produce identical images.
    pub fn scan(host_path: impl AsRef<Path>) -> ImageResult<Self> {
        let host_path = host_path.as_ref();
        let name = host_name(host_path)?;
        scan_node(host_path, NodePath::default().join(&name))
    }
}

fn host_name(host_path: &Path) -> ImageResult<String> {
    let resolved = match host_path.file_name() {
        Some(_) => host_path.to_path_buf(),
        // "." and ".." have no file name of their own
        None => fs::canonicalize(host_path)?,
    };
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ImageError::Path {
            path: host_path.display().to_string(),
            reason: "path has no file name".to_string(),
        })
}

fn scan_node(host_path: &Path, path: NodePath) -> ImageResult<HostNode> {
    let metadata = fs::metadata(host_path)?;
    if !metadata.is_dir() {
        return Ok(HostNode::File(FileNode::new(
            path,
            metadata.len(),
            FileSource::Host(host_path.to_path_buf()),
        )));
    }

    let mut entries = fs::read_dir(host_path)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut dir = DirectoryNode {
        path: path.clone(),
        children: Vec::with_capacity(entries.len()),
    };
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        dir.push(scan_node(&entry.path(), path.join(&name))?);
    }
    Ok(HostNode::Directory(dir))
}
