//! Floppy Disk Image Builder Core
//!
//! This crate builds byte-exact FAT12 floppy images and fills them from host
//! file trees:
//! - Geometry table for the five standard PC floppy sizes
//! - Fixed-capacity block device (memory or host file)
//! - Filesystem engine seam with a FAT implementation
//! - Volume lifecycle and tree materialization
//!
//! # Architecture
//!
//! - `FloppySize`: selects format parameters and image capacity
//! - `BlockDevice`: owns the image bytes; the engine does I/O through ports
//! - `FsEngine` trait: format/mount/mkdir/create/write/close capability set
//! - `Volume`: allocate → format → mount, then `add_file`/`add_directory`
//! - `HostNode`: host files, directories and ZIP archives to copy in
//!
//! # Example
//! ```no_run
//! use flopgen_core::{DirectoryNode, FileNode, FloppySize, ImageTarget, Volume};
//!
//! let mut volume = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 437);
//! let docs = DirectoryNode::new("DOCS").with(FileNode::from_bytes("DOCS/README.TXT", "hello"));
//! assert!(volume.add_directory(&docs));
//! let image = volume.finish().unwrap();
//! assert_eq!(image.len(), 1_474_560);
//! ```

pub mod archive;
pub mod device;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod mount_slot;
pub mod tree;
pub mod volume;

pub use archive::{load_archive, load_archive_entries};
pub use device::{live_devices, BlockDevice, DevicePort, ImageTarget};
pub use engine::{CodePage, DirStatus, EngineFile, FatEngine, FsEngine};
pub use error::{ImageError, ImageResult};
pub use geometry::{FloppySize, FormatParams};
pub use mount_slot::{MountSlot, MountToken};
pub use tree::{DirectoryNode, FileNode, FileSource, HostNode, NodePath};
pub use volume::{Volume, VolumeState};
