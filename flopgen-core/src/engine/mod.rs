//! Filesystem engine interface.
//!
//! A volume drives its filesystem through this narrow capability set:
//! - `FsEngine`: code page, format, mount/unmount, directories, file creation
//! - `EngineFile`: an open file handle (write, close)
//! - `FatEngine`: FAT12 implementation backed by the `fatfs` crate

mod code_page;
mod fat_engine;

pub use code_page::CodePage;
pub use fat_engine::{FatEngine, FatFile};

use crate::device::BlockDevice;
use crate::error::ImageResult;
use crate::geometry::FormatParams;

/// Outcome of a directory creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Created,
    Exists,
}

/// Filesystem engine operating on one block device at a time.
/// Paths are `/`-separated and relative to the volume root.
pub trait FsEngine {
    /// Open file handle. Borrows the engine while it is alive.
    type File<'a>: EngineFile
    where
        Self: 'a;

    /// Select the OEM code page for directory entry names.
    fn set_code_page(&mut self, id: u16) -> ImageResult<()>;

    /// Write an empty filesystem to the device.
    fn format(&mut self, device: &BlockDevice, params: &FormatParams) -> ImageResult<()>;

    /// Mount the filesystem stored on the device.
    fn mount(&mut self, device: &BlockDevice) -> ImageResult<()>;

    /// Flush and detach the mounted filesystem.
    fn unmount(&mut self) -> ImageResult<()>;

    fn is_mounted(&self) -> bool;

    /// Create a directory. An existing directory is reported, not recreated.
    fn make_directory(&self, path: &str) -> ImageResult<DirStatus>;

    /// Create a file, truncating any existing file at the path.
    fn open_create(&self, path: &str) -> ImageResult<Self::File<'_>>;
}

/// Writable handle to a file on a mounted engine.
pub trait EngineFile {
    /// Write as much of `bytes` as fits; returns the count stored.
    fn write(&mut self, bytes: &[u8]) -> ImageResult<usize>;

    /// Flush and close the handle.
    fn close(self) -> ImageResult<()>
    where
        Self: Sized;
}
