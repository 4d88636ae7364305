//! Error types for image building.

use thiserror::Error;

/// Errors that can occur while building a floppy image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Cannot allocate {capacity} byte block device: {reason}")]
    DeviceAllocation { capacity: u64, reason: String },

    #[error("Block device already released")]
    Released,

    #[error("Unsupported code page: {0}")]
    CodePage(u16),

    #[error("Format failed: {0}")]
    Format(std::io::Error),

    #[error("Mount failed: {0}")]
    Mount(std::io::Error),

    #[error("Mount slot is held by another volume")]
    MountSlotBusy,

    #[error("Volume not mounted")]
    NotMounted,

    #[error("Invalid path {path:?}: {reason}")]
    Path { path: String, reason: String },

    #[error("Short read from {path:?}: expected {expected} bytes")]
    ShortRead { path: String, expected: u64 },

    #[error("Short write to {path:?}: wrote {written} of {expected} bytes")]
    WriteVerification {
        path: String,
        expected: u64,
        written: u64,
    },

    #[error("Invalid floppy size: {0}")]
    InvalidGeometry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Result type for image operations.
pub type ImageResult<T> = Result<T, ImageError>;
