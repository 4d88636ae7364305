//! Floppy volume lifecycle.
//!
//! A [`Volume`] owns one block device and, while open, the process-wide mount
//! slot. Construction walks allocate → code page → format → mount; a failure at
//! any step releases the device and leaves the volume inert (`is_open()` is
//! false). Closing, explicitly or on drop, unmounts and releases the device.

mod materialize;

use crate::device::{BlockDevice, ImageTarget};
use crate::engine::{FatEngine, FsEngine};
use crate::error::{ImageError, ImageResult};
use crate::geometry::FloppySize;
use crate::mount_slot::{MountSlot, MountToken};

/// Lifecycle state of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    /// Formatted and mounted; files may be added.
    Mounted,
    /// Unmounted after being open.
    Closed,
    /// Construction failed; nothing is held.
    Failed,
}

/// A FAT12 floppy image being populated.
pub struct Volume<E: FsEngine = FatEngine> {
    size: FloppySize,
    engine: E,
    device: Option<BlockDevice>,
    token: Option<MountToken>,
    state: VolumeState,
}

impl Volume {
    /// Create and mount a volume using the FAT engine.
    ///
    /// Never fails outright; check [`is_open`](Self::is_open).
    pub fn open(target: &ImageTarget, size: FloppySize, code_page: u16) -> Self {
        Self::open_with_engine(FatEngine::new(), target, size, code_page)
    }

    /// Like [`open`](Self::open), reporting why construction failed.
    pub fn try_open(target: &ImageTarget, size: FloppySize, code_page: u16) -> ImageResult<Self> {
        Self::try_open_with_engine(FatEngine::new(), target, size, code_page)
    }
}

impl<E: FsEngine> Volume<E> {
    /// Create and mount a volume driven by `engine`.
    pub fn open_with_engine(
        mut engine: E,
        target: &ImageTarget,
        size: FloppySize,
        code_page: u16,
    ) -> Self {
        match bring_up(&mut engine, target, size, code_page) {
            Ok((device, token)) => Self::mounted(engine, size, device, token),
            Err(e) => {
                log::warn!("cannot open {} volume: {}", size, e);
                Self {
                    size,
                    engine,
                    device: None,
                    token: None,
                    state: VolumeState::Failed,
                }
            }
        }
    }

    /// Like [`open_with_engine`](Self::open_with_engine), reporting why construction failed.
    pub fn try_open_with_engine(
        mut engine: E,
        target: &ImageTarget,
        size: FloppySize,
        code_page: u16,
    ) -> ImageResult<Self> {
        let (device, token) = bring_up(&mut engine, target, size, code_page)?;
        Ok(Self::mounted(engine, size, device, token))
    }

    fn mounted(engine: E, size: FloppySize, device: BlockDevice, token: MountToken) -> Self {
        log::debug!("{} volume mounted", size);
        Self {
            size,
            engine,
            device: Some(device),
            token: Some(token),
            state: VolumeState::Mounted,
        }
    }

    /// True while the volume is mounted and accepts files.
    pub fn is_open(&self) -> bool {
        self.state == VolumeState::Mounted
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VolumeState {
        self.state
    }

    /// Floppy size the volume was created with.
    pub fn size(&self) -> FloppySize {
        self.size
    }

    /// The filesystem engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn ensure_open(&self) -> ImageResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ImageError::NotMounted)
        }
    }

    /// Unmount and release the device. Closing a volume that is not open is a no-op.
    pub fn close(&mut self) -> ImageResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.state = VolumeState::Closed;

        let unmounted = self.engine.unmount();
        self.token = None;
        let released = match self.device.take() {
            Some(mut device) => device.release(),
            None => Ok(()),
        };
        log::debug!("{} volume closed", self.size);
        unmounted.and(released)
    }

    /// Unmount, copy the finished image out and release the device.
    pub fn finish(mut self) -> ImageResult<Vec<u8>> {
        self.ensure_open()?;
        self.state = VolumeState::Closed;

        let unmounted = self.engine.unmount();
        self.token = None;
        let mut device = self.device.take().ok_or(ImageError::NotMounted)?;
        let image = unmounted.and_then(|()| device.read_all());
        let released = device.release();

        let image = image?;
        released?;
        log::debug!("{} volume finished", self.size);
        Ok(image)
    }
}

impl<E: FsEngine> Drop for Volume<E> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("closing {} volume: {}", self.size, e);
        }
    }
}

/// Allocate, format and mount. The device is released by drop on every
/// early return, and the slot token likewise.
fn bring_up<E: FsEngine>(
    engine: &mut E,
    target: &ImageTarget,
    size: FloppySize,
    code_page: u16,
) -> ImageResult<(BlockDevice, MountToken)> {
    let params = size.params();
    let device = BlockDevice::allocate(target, params.total_bytes)?;

    engine.set_code_page(code_page)?;
    engine.format(&device, &params)?;

    let token = MountSlot::acquire()?;
    engine.mount(&device)?;

    Ok((device, token))
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::device::live_devices;
    use crate::engine::{DirStatus, FatFile};
    use crate::geometry::FormatParams;
    use crate::test_support::{scratch_path, serial};

    /// FAT engine whose format step always fails.
    struct RejectFormat(FatEngine);

    impl FsEngine for RejectFormat {
        type File<'a> = FatFile<'a> where Self: 'a;

        fn set_code_page(&mut self, id: u16) -> ImageResult<()> {
            self.0.set_code_page(id)
        }

        fn format(&mut self, _device: &BlockDevice, _params: &FormatParams) -> ImageResult<()> {
            Err(ImageError::Format(io::Error::new(
                io::ErrorKind::InvalidInput,
                "geometry rejected",
            )))
        }

        fn mount(&mut self, device: &BlockDevice) -> ImageResult<()> {
            self.0.mount(device)
        }

        fn unmount(&mut self) -> ImageResult<()> {
            self.0.unmount()
        }

        fn is_mounted(&self) -> bool {
            self.0.is_mounted()
        }

        fn make_directory(&self, path: &str) -> ImageResult<DirStatus> {
            self.0.make_directory(path)
        }

        fn open_create(&self, path: &str) -> ImageResult<FatFile<'_>> {
            self.0.open_create(path)
        }
    }

    #[test]
    fn test_open_and_close() {
        let _guard = serial();
        let before = live_devices();

        let mut volume = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 437);
        assert!(volume.is_open());
        assert_eq!(volume.state(), VolumeState::Mounted);
        assert!(MountSlot::is_held());
        assert_eq!(live_devices(), before + 1);

        volume.close().unwrap();
        assert!(!volume.is_open());
        assert_eq!(volume.state(), VolumeState::Closed);
        assert!(!MountSlot::is_held());
        assert_eq!(live_devices(), before);

        // Closing again does nothing
        volume.close().unwrap();
        assert_eq!(volume.state(), VolumeState::Closed);
    }

    #[test]
    fn test_drop_releases_everything() {
        let _guard = serial();
        let before = live_devices();
        {
            let volume = Volume::open(&ImageTarget::Memory, FloppySize::K720, 437);
            assert!(volume.is_open());
        }
        assert!(!MountSlot::is_held());
        assert_eq!(live_devices(), before);
    }

    #[test]
    fn test_invalid_code_page_fails() {
        let _guard = serial();
        let before = live_devices();

        let volume = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 9999);
        assert!(!volume.is_open());
        assert_eq!(volume.state(), VolumeState::Failed);
        assert_eq!(live_devices(), before);
        assert!(!MountSlot::is_held());

        assert!(matches!(
            Volume::try_open(&ImageTarget::Memory, FloppySize::K1440, 9999),
            Err(ImageError::CodePage(9999))
        ));
    }

    #[test]
    fn test_format_failure() {
        let _guard = serial();
        let before = live_devices();

        let volume = Volume::open_with_engine(
            RejectFormat(FatEngine::new()),
            &ImageTarget::Memory,
            FloppySize::K360,
            437,
        );
        assert!(!volume.is_open());
        assert_eq!(live_devices(), before);
        assert!(!MountSlot::is_held());

        let result = Volume::try_open_with_engine(
            RejectFormat(FatEngine::new()),
            &ImageTarget::Memory,
            FloppySize::K360,
            437,
        );
        assert!(matches!(result, Err(ImageError::Format(_))));
    }

    #[test]
    fn test_second_volume_cannot_mount() {
        let _guard = serial();
        let before = live_devices();

        let first = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 437);
        assert!(first.is_open());

        let second = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 437);
        assert!(!second.is_open());
        assert_eq!(live_devices(), before + 1);
        assert!(matches!(
            Volume::try_open(&ImageTarget::Memory, FloppySize::K720, 437),
            Err(ImageError::MountSlotBusy)
        ));

        // The failed volume must not free the slot held by the first
        drop(second);
        assert!(MountSlot::is_held());

        drop(first);
        let third = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 437);
        assert!(third.is_open());
    }

    #[test]
    fn test_allocation_failure() {
        let _guard = serial();
        let target = ImageTarget::File(scratch_path("no-such-dir").join("disk.img"));
        let volume = Volume::open(&target, FloppySize::K1440, 437);
        assert!(!volume.is_open());
        assert!(matches!(
            Volume::try_open(&target, FloppySize::K1440, 437),
            Err(ImageError::DeviceAllocation { .. })
        ));
    }

    #[test]
    fn test_finish_returns_full_image() {
        let _guard = serial();
        for size in FloppySize::ALL {
            let volume = Volume::open(&ImageTarget::Memory, size, 437);
            let image = volume.finish().unwrap();
            assert_eq!(image.len() as u64, size.total_bytes());
        }
        assert!(!MountSlot::is_held());
    }

    #[test]
    fn test_finish_on_failed_volume() {
        let _guard = serial();
        let volume = Volume::open(&ImageTarget::Memory, FloppySize::K1440, 1);
        assert!(matches!(volume.finish(), Err(ImageError::NotMounted)));
    }

    #[test]
    fn test_file_target_persists_after_close() {
        let _guard = serial();
        let path = scratch_path("volume.img");
        let mut volume = Volume::open(&ImageTarget::File(path.clone()), FloppySize::K2880, 437);
        assert!(volume.is_open());
        volume.close().unwrap();

        let image = std::fs::read(&path).unwrap();
        assert_eq!(image.len() as u64, FloppySize::K2880.total_bytes());
        assert_eq!(&image[510..512], &[0x55, 0xAA]);
        let _ = std::fs::remove_file(&path);
    }
}
