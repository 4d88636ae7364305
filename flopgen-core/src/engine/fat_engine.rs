//! FAT12 engine backed by the `fatfs` crate.

use std::io::{self, Write};

use super::{CodePage, DirStatus, EngineFile, FsEngine};
use crate::device::{BlockDevice, DevicePort};
use crate::error::{ImageError, ImageResult};
use crate::geometry::{FormatParams, SECTOR_SIZE};

type FatFs = fatfs::FileSystem<DevicePort>;

fn path_error(path: &str, err: io::Error) -> ImageError {
    ImageError::Path {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

/// FAT engine with at most one mounted filesystem.
#[derive(Default)]
pub struct FatEngine {
    code_page: CodePage,
    fs: Option<FatFs>,
}

impl FatEngine {
    /// Unmounted engine using code page 437.
    pub fn new() -> Self {
        Self::default()
    }

    /// Code page used for directory entry names.
    pub fn code_page(&self) -> CodePage {
        self.code_page
    }

    fn mounted(&self) -> ImageResult<&FatFs> {
        self.fs.as_ref().ok_or(ImageError::NotMounted)
    }
}

impl FsEngine for FatEngine {
    type File<'a> = FatFile<'a> where Self: 'a;

    fn set_code_page(&mut self, id: u16) -> ImageResult<()> {
        self.code_page = CodePage::new(id)?;
        log::debug!("code page set to {}", self.code_page);
        Ok(())
    }

    fn format(&mut self, device: &BlockDevice, params: &FormatParams) -> ImageResult<()> {
        if self.fs.is_some() {
            return Err(ImageError::Format(io::Error::new(
                io::ErrorKind::Other,
                "cannot format while mounted",
            )));
        }

        let options = fatfs::FormatVolumeOptions::new()
            .bytes_per_sector(SECTOR_SIZE)
            .total_sectors(params.total_sectors())
            .fat_type(fatfs::FatType::Fat12)
            .bytes_per_cluster(params.allocation_unit)
            .max_root_dir_entries(params.root_entries)
            .fats(params.fat_copies)
            .media(params.media)
            .sectors_per_track(params.sectors_per_track)
            .heads(params.heads)
            .drive_num(params.drive_number);

        fatfs::format_volume(device.port(), options).map_err(ImageError::Format)?;
        log::debug!(
            "formatted FAT12: {} sectors, {} byte clusters, {} root entries, media {:#04X}",
            params.total_sectors(),
            params.allocation_unit,
            params.root_entries,
            params.media
        );
        Ok(())
    }

    fn mount(&mut self, device: &BlockDevice) -> ImageResult<()> {
        if self.fs.is_some() {
            return Err(ImageError::Mount(io::Error::new(
                io::ErrorKind::Other,
                "engine already has a mounted filesystem",
            )));
        }

        let options = fatfs::FsOptions::new().oem_cp_converter(self.code_page.converter());
        let fs = fatfs::FileSystem::new(device.port(), options).map_err(ImageError::Mount)?;
        self.fs = Some(fs);
        Ok(())
    }

    fn unmount(&mut self) -> ImageResult<()> {
        match self.fs.take() {
            Some(fs) => fs.unmount().map_err(ImageError::Io),
            None => Err(ImageError::NotMounted),
        }
    }

    fn is_mounted(&self) -> bool {
        self.fs.is_some()
    }

    fn make_directory(&self, path: &str) -> ImageResult<DirStatus> {
        let root = self.mounted()?.root_dir();

        match root.open_dir(path) {
            Ok(_) => return Ok(DirStatus::Exists),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(path_error(path, e)),
        }

        root.create_dir(path).map_err(|e| path_error(path, e))?;
        Ok(DirStatus::Created)
    }

    fn open_create(&self, path: &str) -> ImageResult<FatFile<'_>> {
        let root = self.mounted()?.root_dir();
        let mut file = root.create_file(path).map_err(|e| path_error(path, e))?;
        file.truncate()?;
        Ok(FatFile {
            file,
            path: path.to_string(),
        })
    }
}

/// Open file on a mounted [`FatEngine`].
pub struct FatFile<'a> {
    file: fatfs::File<'a, DevicePort>,
    path: String,
}

impl EngineFile for FatFile<'_> {
    fn write(&mut self, bytes: &[u8]) -> ImageResult<usize> {
        let mut written = 0;
        while written < bytes.len() {
            match self.file.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Out of clusters part way through: report what landed
                Err(e) if written > 0 => {
                    log::debug!("{}: write stopped after {} bytes: {}", self.path, written, e);
                    break;
                }
                Err(e) => return Err(ImageError::Io(e)),
            }
        }
        Ok(written)
    }

    fn close(mut self) -> ImageResult<()> {
        self.file.flush()?;
        Ok(())
    }
}
