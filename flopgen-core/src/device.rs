//! Fixed-capacity block device backing a floppy image.
//!
//! The device owns the backing store (a memory buffer or a host file sized to
//! exactly the image capacity). The filesystem engine does its I/O through
//! [`DevicePort`] cursors handed out by [`BlockDevice::port`]; once the device
//! is released every port fails with [`ImageError::Released`].

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ImageError, ImageResult};

static LIVE_DEVICES: AtomicUsize = AtomicUsize::new(0);

/// Number of devices allocated and not yet released in this process.
pub fn live_devices() -> usize {
    LIVE_DEVICES.load(Ordering::SeqCst)
}

/// Where the image bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageTarget {
    #[default]
    Memory,
    File(PathBuf),
}

enum Backing {
    Memory(Vec<u8>),
    File(File),
}

impl Backing {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Backing::Memory(data) => {
                let start = pos as usize;
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            Backing::File(file) => {
                file.seek(SeekFrom::Start(pos))?;
                file.read(buf)
            }
        }
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<usize> {
        match self {
            Backing::Memory(data) => {
                let start = pos as usize;
                data[start..start + buf.len()].copy_from_slice(buf);
                Ok(buf.len())
            }
            Backing::File(file) => {
                file.seek(SeekFrom::Start(pos))?;
                file.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Backing::Memory(_) => Ok(()),
            Backing::File(file) => file.flush(),
        }
    }
}

type SharedBacking = Rc<RefCell<Option<Backing>>>;

/// Fixed-capacity byte store, exclusively owned by one volume.
pub struct BlockDevice {
    capacity: u64,
    backing: SharedBacking,
}

impl BlockDevice {
    /// Allocate a device of exactly `capacity` bytes.
    pub fn allocate(target: &ImageTarget, capacity: u64) -> ImageResult<Self> {
        let alloc_error = |reason: String| ImageError::DeviceAllocation { capacity, reason };

        let backing = match target {
            ImageTarget::Memory => {
                let len = usize::try_from(capacity).map_err(|e| alloc_error(e.to_string()))?;
                let mut data = Vec::new();
                data.try_reserve_exact(len)
                    .map_err(|e| alloc_error(e.to_string()))?;
                data.resize(len, 0);
                Backing::Memory(data)
            }
            ImageTarget::File(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| alloc_error(format!("{}: {}", path.display(), e)))?;
                file.set_len(capacity)
                    .map_err(|e| alloc_error(format!("{}: {}", path.display(), e)))?;
                Backing::File(file)
            }
        };

        LIVE_DEVICES.fetch_add(1, Ordering::SeqCst);
        log::debug!("allocated {} byte block device ({:?})", capacity, target);

        Ok(Self {
            capacity,
            backing: Rc::new(RefCell::new(Some(backing))),
        })
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Whether the backing store is still held.
    pub fn is_allocated(&self) -> bool {
        self.backing.borrow().is_some()
    }

    /// A new read/write cursor positioned at byte 0.
    pub fn port(&self) -> DevicePort {
        DevicePort {
            capacity: self.capacity,
            backing: Rc::clone(&self.backing),
            pos: 0,
        }
    }

    /// Copy the whole image out of the device.
    pub fn read_all(&self) -> ImageResult<Vec<u8>> {
        let mut port = self.port();
        let mut image = Vec::with_capacity(self.capacity as usize);
        port.read_to_end(&mut image).map_err(|e| match e.kind() {
            io::ErrorKind::NotConnected => ImageError::Released,
            _ => ImageError::Io(e),
        })?;
        if image.len() as u64 != self.capacity {
            return Err(ImageError::ShortRead {
                path: "<device>".to_string(),
                expected: self.capacity,
            });
        }
        Ok(image)
    }

    /// Flush and drop the backing store. Releasing twice is a no-op.
    pub fn release(&mut self) -> ImageResult<()> {
        let Some(mut backing) = self.backing.borrow_mut().take() else {
            return Ok(());
        };
        LIVE_DEVICES.fetch_sub(1, Ordering::SeqCst);
        log::debug!("released {} byte block device", self.capacity);
        backing.flush()?;
        Ok(())
    }
}

impl Drop for BlockDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("releasing block device: {}", e);
        }
    }
}

/// Seekable cursor over a [`BlockDevice`].
///
/// Reads stop at the device capacity; writes past it fail.
pub struct DevicePort {
    capacity: u64,
    backing: SharedBacking,
    pos: u64,
}

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "block device released")
}

impl Read for DevicePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.backing.borrow_mut();
        let backing = guard.as_mut().ok_or_else(released)?;
        if self.pos >= self.capacity {
            return Ok(0);
        }
        let remaining = (self.capacity - self.pos) as usize;
        let len = buf.len().min(remaining);
        let n = backing.read_at(self.pos, &mut buf[..len])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for DevicePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.backing.borrow_mut();
        let backing = guard.as_mut().ok_or_else(released)?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write past end of block device",
            ));
        }
        let remaining = (self.capacity - self.pos) as usize;
        let len = buf.len().min(remaining);
        let n = backing.write_at(self.pos, &buf[..len])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.backing.borrow_mut();
        guard.as_mut().ok_or_else(released)?.flush()
    }
}

impl Seek for DevicePort {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.capacity.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of device")
        })?;
        self.pos = target;
        Ok(target)
    }
}
