//! ZIP archives as host trees.
//!
//! Archive entries are read fully into memory and arranged into the same
//! [`HostNode`] hierarchy a directory scan produces. Directories that only
//! appear as path prefixes are synthesized. Entry order is kept.

use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::error::{ImageError, ImageResult};
use crate::tree::{DirectoryNode, FileNode, FileSource, HostNode, NodePath};

/// Load an archive as a directory named `root_name`.
pub fn load_archive<R: Read + Seek>(reader: R, root_name: &str) -> ImageResult<HostNode> {
    let root = build_tree(reader, NodePath::parse(root_name))?;
    Ok(HostNode::Directory(root))
}

/// Load the top-level entries of an archive, for insertion at the volume root.
pub fn load_archive_entries<R: Read + Seek>(reader: R) -> ImageResult<Vec<HostNode>> {
    Ok(build_tree(reader, NodePath::default())?.into_children())
}

fn build_tree<R: Read + Seek>(reader: R, root_path: NodePath) -> ImageResult<DirectoryNode> {
    let mut archive = ZipArchive::new(reader)?;
    let mut root = DirectoryNode::from_path(root_path);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        let Some(name) = file.enclosed_name() else {
            log::warn!("skipping archive entry with unsafe path: {}", file.name());
            continue;
        };
        let entry_path = NodePath::parse(&name.to_string_lossy());
        let Some((leaf, parents)) = entry_path.components().split_last() else {
            continue;
        };

        let mut dir = &mut root;
        for component in parents {
            dir = child_dir(dir, component)?;
        }

        if file.is_dir() {
            child_dir(dir, leaf)?;
            continue;
        }

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;

        let path = dir.path().join(leaf);
        let node = FileNode::new(path.clone(), content.len() as u64, FileSource::Memory(content));
        let children = dir.children_mut();
        match children.iter().position(|c| c.name() == leaf) {
            Some(pos) if !children[pos].is_directory() => children[pos] = node.into(),
            Some(_) => return Err(name_clash(path)),
            None => children.push(node.into()),
        }
    }

    Ok(root)
}

/// Find or create the child directory `name`.
fn child_dir<'a>(dir: &'a mut DirectoryNode, name: &str) -> ImageResult<&'a mut DirectoryNode> {
    let path = dir.path().join(name);
    let children = dir.children_mut();
    let pos = match children.iter().position(|c| c.name() == name) {
        Some(pos) => pos,
        None => {
            children.push(DirectoryNode::from_path(path.clone()).into());
            children.len() - 1
        }
    };
    match &mut children[pos] {
        HostNode::Directory(child) => Ok(child),
        HostNode::File(_) => Err(name_clash(path)),
    }
}

fn name_clash(path: NodePath) -> ImageError {
    ImageError::Path {
        path: path.to_string(),
        reason: "archive holds both a file and a directory at this path".to_string(),
    }
}
