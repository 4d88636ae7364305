//! Floppy geometry table.
//!
//! Maps each standard PC floppy density to the BIOS Parameter Block values the
//! volume is formatted with. The numbers decide the on-disk layout, so they must
//! stay exactly as listed for images to be readable by period hardware and DOS.

use std::fmt;
use std::str::FromStr;

use crate::error::ImageError;

/// Bytes per sector for every supported floppy.
pub const SECTOR_SIZE: u16 = 512;

const BYTES_IN_KB: u64 = 1024;

/// Standard floppy capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FloppySize {
    /// 5.25" double density
    K360,
    /// 3.5" double density
    K720,
    /// 5.25" high density
    K1200,
    /// 3.5" high density
    #[default]
    K1440,
    /// 3.5" extra density
    K2880,
}

/// Format parameters handed to the filesystem engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatParams {
    /// Cluster size in bytes
    pub allocation_unit: u32,
    /// Number of root directory entries
    pub root_entries: u16,
    /// Media descriptor byte
    pub media: u8,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub fat_copies: u8,
    /// BIOS drive number stored in the boot sector
    pub drive_number: u8,
    /// Image size in bytes
    pub total_bytes: u64,
}

impl FormatParams {
    /// Total number of 512-byte sectors.
    pub fn total_sectors(&self) -> u32 {
        (self.total_bytes / u64::from(SECTOR_SIZE)) as u32
    }
}

impl FloppySize {
    pub const ALL: [FloppySize; 5] = [
        FloppySize::K360,
        FloppySize::K720,
        FloppySize::K1200,
        FloppySize::K1440,
        FloppySize::K2880,
    ];

    /// Capacity in kilobytes.
    pub fn kilobytes(self) -> u64 {
        match self {
            FloppySize::K360 => 360,
            FloppySize::K720 => 720,
            FloppySize::K1200 => 1200,
            FloppySize::K1440 => 1440,
            FloppySize::K2880 => 2880,
        }
    }

    /// Capacity in bytes.
    pub fn total_bytes(self) -> u64 {
        self.kilobytes() * BYTES_IN_KB
    }

    /// Look up the format parameters for this size.
    pub fn params(self) -> FormatParams {
        let (allocation_unit, root_entries, media, sectors_per_track) = match self {
            FloppySize::K360 => (1024, 112, 0xFD, 9),
            FloppySize::K720 => (1024, 112, 0xF9, 9),
            FloppySize::K1200 => (512, 224, 0xF9, 15),
            FloppySize::K1440 => (512, 224, 0xF0, 18),
            FloppySize::K2880 => (1024, 224, 0xF0, 36),
        };

        FormatParams {
            allocation_unit,
            root_entries,
            media,
            sectors_per_track,
            heads: 2,
            fat_copies: 2,
            drive_number: 0x00,
            total_bytes: self.total_bytes(),
        }
    }
}

impl fmt::Display for FloppySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}K", self.kilobytes())
    }
}

/// Parse a size selector.
///
/// Accepts a bare kilobyte count (`"720"`), a `K` suffix (`"1440k"`) or the
/// marketing megabyte names (`"1.2M"`, `"1.44M"`, `"2.88M"`).
impl FromStr for FloppySize {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let kb = match upper.as_str() {
            "1.2M" | "1.2MB" => "1200",
            "1.44M" | "1.44MB" => "1440",
            "2.88M" | "2.88MB" => "2880",
            other => other.trim_end_matches('B').trim_end_matches('K'),
        };

        FloppySize::ALL
            .into_iter()
            .find(|size| size.kilobytes().to_string() == kb)
            .ok_or_else(|| ImageError::InvalidGeometry(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_bytes() {
        assert_eq!(FloppySize::K360.total_bytes(), 368_640);
        assert_eq!(FloppySize::K720.total_bytes(), 737_280);
        assert_eq!(FloppySize::K1200.total_bytes(), 1_228_800);
        assert_eq!(FloppySize::K1440.total_bytes(), 1_474_560);
        assert_eq!(FloppySize::K2880.total_bytes(), 2_949_120);
    }

    #[test]
    fn test_params_table() {
        let p = FloppySize::K360.params();
        assert_eq!(
            (p.allocation_unit, p.root_entries, p.media, p.sectors_per_track),
            (1024, 112, 0xFD, 9)
        );

        let p = FloppySize::K720.params();
        assert_eq!(
            (p.allocation_unit, p.root_entries, p.media, p.sectors_per_track),
            (1024, 112, 0xF9, 9)
        );

        let p = FloppySize::K1200.params();
        assert_eq!(
            (p.allocation_unit, p.root_entries, p.media, p.sectors_per_track),
            (512, 224, 0xF9, 15)
        );

        let p = FloppySize::K1440.params();
        assert_eq!(
            (p.allocation_unit, p.root_entries, p.media, p.sectors_per_track),
            (512, 224, 0xF0, 18)
        );

        let p = FloppySize::K2880.params();
        assert_eq!(
            (p.allocation_unit, p.root_entries, p.media, p.sectors_per_track),
            (1024, 224, 0xF0, 36)
        );
    }

    #[test]
    fn test_common_params() {
        for size in FloppySize::ALL {
            let p = size.params();
            assert_eq!(p.heads, 2);
            assert_eq!(p.fat_copies, 2);
            assert_eq!(p.drive_number, 0);
            assert_eq!(p.total_bytes, size.total_bytes());
        }
        assert_eq!(FloppySize::K1440.params().total_sectors(), 2880);
    }

    #[test]
    fn test_parse() {
        assert_eq!("1440".parse::<FloppySize>().unwrap(), FloppySize::K1440);
        assert_eq!("720k".parse::<FloppySize>().unwrap(), FloppySize::K720);
        assert_eq!("360KB".parse::<FloppySize>().unwrap(), FloppySize::K360);
        assert_eq!("1.44M".parse::<FloppySize>().unwrap(), FloppySize::K1440);
        assert_eq!("2.88m".parse::<FloppySize>().unwrap(), FloppySize::K2880);
        assert_eq!("1.2M".parse::<FloppySize>().unwrap(), FloppySize::K1200);
        assert!("1000".parse::<FloppySize>().is_err());
        assert!("".parse::<FloppySize>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for size in FloppySize::ALL {
            assert_eq!(size.to_string().parse::<FloppySize>().unwrap(), size);
        }
    }
}
