//! Replaying host trees into a mounted volume.
//!
//! Failures stop at the first bad node and nothing already written is rolled
//! back: siblings written earlier stay, and a short write leaves the partial
//! file in place. The boolean methods log the error and return `false`; the
//! `try_` methods return it.

use std::io::{self, Read};

use super::Volume;
use crate::engine::{DirStatus, EngineFile, FsEngine};
use crate::error::{ImageError, ImageResult};
use crate::tree::{DirectoryNode, FileNode, HostNode};

impl<E: FsEngine> Volume<E> {
    /// Write a file. With `preserve_path` the node's full relative path is
    /// used, otherwise only its name (placing it in the volume root).
    pub fn add_file(&mut self, node: &FileNode, preserve_path: bool) -> bool {
        report(self.try_add_file(node, preserve_path))
    }

    /// Like [`add_file`](Self::add_file), returning the error.
    pub fn try_add_file(&mut self, node: &FileNode, preserve_path: bool) -> ImageResult<()> {
        self.ensure_open()?;
        write_file(&self.engine, node, &node.path().to_volume_path(preserve_path))
    }

    /// Create a directory (an existing one is reused) and write its children
    /// in order.
    pub fn add_directory(&mut self, node: &DirectoryNode) -> bool {
        report(self.try_add_directory(node))
    }

    /// Like [`add_directory`](Self::add_directory), returning the error.
    pub fn try_add_directory(&mut self, node: &DirectoryNode) -> ImageResult<()> {
        self.ensure_open()?;
        write_directory(&self.engine, node)
    }

    /// Insert any node: directories keep their tree, files go flat into the
    /// volume root.
    pub fn insert(&mut self, node: &HostNode) -> bool {
        report(self.try_insert(node))
    }

    /// Like [`insert`](Self::insert), returning the error.
    pub fn try_insert(&mut self, node: &HostNode) -> ImageResult<()> {
        match node {
            HostNode::Directory(dir) => self.try_add_directory(dir),
            HostNode::File(file) => self.try_add_file(file, false),
        }
    }
}

fn report(result: ImageResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{}", e);
            false
        }
    }
}

fn write_directory<E: FsEngine>(engine: &E, dir: &DirectoryNode) -> ImageResult<()> {
    let path = dir.path().to_volume_path(true);
    match engine.make_directory(&path)? {
        DirStatus::Created => log::debug!("mkdir {}", path),
        DirStatus::Exists => log::debug!("mkdir {} (exists)", path),
    }

    for child in dir.children() {
        match child {
            HostNode::Directory(sub) => write_directory(engine, sub)?,
            HostNode::File(file) => write_file(engine, file, &file.path().to_volume_path(true))?,
        }
    }
    Ok(())
}

fn write_file<E: FsEngine>(engine: &E, node: &FileNode, path: &str) -> ImageResult<()> {
    let expected = node.size();
    let mut file = engine.open_create(path)?;

    let buffer = read_content(node)?;
    let written = file.write(&buffer)? as u64;
    drop(buffer);

    if written != expected {
        return Err(ImageError::WriteVerification {
            path: path.to_string(),
            expected,
            written,
        });
    }

    file.close()?;
    log::debug!("wrote {} ({} bytes)", path, expected);
    Ok(())
}

/// Read exactly the declared size from the node's source.
fn read_content(node: &FileNode) -> ImageResult<Vec<u8>> {
    let expected = node.size();
    let out_of_memory = |reason: String| {
        ImageError::Io(io::Error::new(
            io::ErrorKind::OutOfMemory,
            format!("{}: {}", node.path(), reason),
        ))
    };

    let len = usize::try_from(expected).map_err(|e| out_of_memory(e.to_string()))?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| out_of_memory(e.to_string()))?;
    buffer.resize(len, 0);

    node.open()?
        .read_exact(&mut buffer)
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ImageError::ShortRead {
                path: node.path().to_string(),
                expected,
            },
            _ => ImageError::Io(e),
        })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::device::{BlockDevice, ImageTarget};
    use crate::engine::{FatEngine, FatFile};
    use crate::geometry::{FloppySize, FormatParams};
    use crate::test_support::serial;
    use crate::tree::{FileSource, NodePath};

    #[derive(Clone, Copy)]
    enum Fault {
        Write,
        Close,
    }

    /// FAT engine whose files fail on write or on close.
    struct FaultyFiles {
        inner: FatEngine,
        fault: Fault,
    }

    struct FaultyFile<'a> {
        inner: FatFile<'a>,
        fault: Fault,
    }

    fn device_error(message: &str) -> ImageError {
        ImageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
    }

    impl EngineFile for FaultyFile<'_> {
        fn write(&mut self, bytes: &[u8]) -> ImageResult<usize> {
            match self.fault {
                Fault::Write => Err(device_error("sector not found")),
                Fault::Close => self.inner.write(bytes),
            }
        }

        fn close(self) -> ImageResult<()> {
            match self.fault {
                Fault::Write => self.inner.close(),
                Fault::Close => Err(device_error("flush failed")),
            }
        }
    }

    impl FsEngine for FaultyFiles {
        type File<'a> = FaultyFile<'a> where Self: 'a;

        fn set_code_page(&mut self, id: u16) -> ImageResult<()> {
            self.inner.set_code_page(id)
        }

        fn format(&mut self, device: &BlockDevice, params: &FormatParams) -> ImageResult<()> {
            self.inner.format(device, params)
        }

        fn mount(&mut self, device: &BlockDevice) -> ImageResult<()> {
            self.inner.mount(device)
        }

        fn unmount(&mut self) -> ImageResult<()> {
            self.inner.unmount()
        }

        fn is_mounted(&self) -> bool {
            self.inner.is_mounted()
        }

        fn make_directory(&self, path: &str) -> ImageResult<DirStatus> {
            self.inner.make_directory(path)
        }

        fn open_create(&self, path: &str) -> ImageResult<FaultyFile<'_>> {
            Ok(FaultyFile {
                inner: self.inner.open_create(path)?,
                fault: self.fault,
            })
        }
    }

    fn open_faulty(fault: Fault) -> Volume<FaultyFiles> {
        let engine = FaultyFiles {
            inner: FatEngine::new(),
            fault,
        };
        let volume = Volume::open_with_engine(engine, &ImageTarget::Memory, FloppySize::K1440, 437);
        assert!(volume.is_open());
        volume
    }

    fn open_volume() -> Volume {
        let volume = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 437);
        assert!(volume.is_open());
        volume
    }

    fn read_back(image: Vec<u8>, path: &str) -> Option<Vec<u8>> {
        let fs = fatfs::FileSystem::new(io::Cursor::new(image), fatfs::FsOptions::new()).unwrap();
        let mut file = fs.root_dir().open_file(path).ok()?;
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        Some(content)
    }

    #[test]
    fn test_add_file_flat_and_preserved() {
        let _guard = serial();
        let mut volume = open_volume();

        assert!(volume.add_directory(&DirectoryNode::new("DIR")));
        assert!(volume.add_file(&FileNode::from_bytes("DIR/A.TXT", "nested"), true));
        assert!(volume.add_file(&FileNode::from_bytes("DIR/B.TXT", "flat"), false));

        let image = volume.finish().unwrap();
        assert_eq!(read_back(image.clone(), "DIR/A.TXT").unwrap(), b"nested");
        assert_eq!(read_back(image.clone(), "B.TXT").unwrap(), b"flat");
        assert!(read_back(image, "DIR/B.TXT").is_none());
    }

    #[test]
    fn test_preserved_path_without_parent_fails() {
        let _guard = serial();
        let mut volume = open_volume();
        let node = FileNode::from_bytes("NOPE/A.TXT", "x");
        assert!(!volume.add_file(&node, true));
        assert!(matches!(
            volume.try_add_file(&node, true),
            Err(ImageError::Path { .. })
        ));
        // Still usable after a failure
        assert!(volume.add_file(&node, false));
    }

    #[test]
    fn test_short_read_fails() {
        let _guard = serial();
        let mut volume = open_volume();
        let node = FileNode::new(
            NodePath::parse("SHORT.BIN"),
            10,
            FileSource::Memory(b"four".to_vec()),
        );
        assert!(matches!(
            volume.try_add_file(&node, false),
            Err(ImageError::ShortRead { expected: 10, .. })
        ));
    }

    #[test]
    fn test_longer_source_writes_declared_size() {
        let _guard = serial();
        let mut volume = open_volume();
        let node = FileNode::new(
            NodePath::parse("CUT.TXT"),
            3,
            FileSource::Memory(b"abcdef".to_vec()),
        );
        assert!(volume.add_file(&node, false));
        let image = volume.finish().unwrap();
        assert_eq!(read_back(image, "CUT.TXT").unwrap(), b"abc");
    }

    #[test]
    fn test_insert_dispatch() {
        let _guard = serial();
        let mut volume = open_volume();
        let dir = DirectoryNode::new("SRC").with(FileNode::from_bytes("SRC/MAIN.C", "int main;"));
        assert!(volume.insert(&dir.into()));
        assert!(volume.insert(&FileNode::from_bytes("deep/path/NOTE.TXT", "n").into()));

        let image = volume.finish().unwrap();
        assert_eq!(read_back(image.clone(), "SRC/MAIN.C").unwrap(), b"int main;");
        assert_eq!(read_back(image, "NOTE.TXT").unwrap(), b"n");
    }

    #[test]
    fn test_directory_stops_at_first_failure() {
        let _guard = serial();
        let mut volume = open_volume();
        let bad = FileNode::new(NodePath::parse("D/BAD.BIN"), 8, FileSource::Memory(vec![1]));
        let dir = DirectoryNode::new("D")
            .with(FileNode::from_bytes("D/FIRST.TXT", "1"))
            .with(bad)
            .with(FileNode::from_bytes("D/LAST.TXT", "3"));

        assert!(!volume.add_directory(&dir));

        let image = volume.finish().unwrap();
        assert_eq!(read_back(image.clone(), "D/FIRST.TXT").unwrap(), b"1");
        // Opened before the read failed, so it exists but is empty
        assert_eq!(read_back(image.clone(), "D/BAD.BIN").unwrap(), b"");
        assert!(read_back(image, "D/LAST.TXT").is_none());
    }

    #[test]
    fn test_closed_volume_rejects_adds() {
        let _guard = serial();
        let mut volume = open_volume();
        volume.close().unwrap();

        let node = FileNode::from_bytes("A.TXT", "a");
        assert!(!volume.add_file(&node, false));
        assert!(!volume.add_directory(&DirectoryNode::new("X")));
        assert!(matches!(
            volume.try_insert(&node.into()),
            Err(ImageError::NotMounted)
        ));
    }

    #[test]
    fn test_write_error_fails() {
        let _guard = serial();
        let mut volume = open_faulty(Fault::Write);
        let node = FileNode::from_bytes("DATA.BIN", "payload");

        assert!(!volume.add_file(&node, false));
        assert!(matches!(
            volume.try_add_file(&node, false),
            Err(ImageError::Io(_))
        ));
        assert!(volume.is_open());
        assert!(volume.add_directory(&DirectoryNode::new("EMPTY")));

        let image = volume.finish().unwrap();
        assert_eq!(read_back(image, "DATA.BIN").unwrap(), b"");
    }

    #[test]
    fn test_close_error_fails_after_full_write() {
        let _guard = serial();
        let mut volume = open_faulty(Fault::Close);
        let node = FileNode::from_bytes("DATA.BIN", "payload");

        assert!(!volume.add_file(&node, false));
        assert!(matches!(
            volume.try_add_file(&node, false),
            Err(ImageError::Io(_))
        ));
        assert!(volume.is_open());

        // The bytes landed even though the call reported failure
        let image = volume.finish().unwrap();
        assert_eq!(read_back(image, "DATA.BIN").unwrap(), b"payload");
    }
}
