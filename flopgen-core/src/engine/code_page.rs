//! OEM code pages for short directory entry names.

use std::fmt;

use fatfs::OemCpConverter;

use crate::error::{ImageError, ImageResult};

/// Code page identifiers the engine accepts.
const SUPPORTED: [u16; 21] = [
    437, 720, 737, 771, 775, 850, 852, 855, 857, 860, 861, 862, 863, 864, 865, 866, 869, 932,
    936, 949, 950,
];

/// Validated OEM code page identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodePage(u16);

impl CodePage {
    /// US English, the DOS default.
    pub const DEFAULT: CodePage = CodePage(437);

    /// Validate a code page id.
    pub fn new(id: u16) -> ImageResult<Self> {
        if SUPPORTED.contains(&id) {
            Ok(CodePage(id))
        } else {
            Err(ImageError::CodePage(id))
        }
    }

    /// Numeric code page id.
    pub fn id(self) -> u16 {
        self.0
    }

    /// Converter used when encoding names for this code page.
    ///
    /// Only 437 carries a full table; the other pages map ASCII and substitute
    /// everything else.
    pub(crate) fn converter(self) -> &'static dyn OemCpConverter {
        match self.0 {
            437 => &CP437,
            _ => &ASCII_ONLY,
        }
    }
}

impl Default for CodePage {
    fn default() -> Self {
        CodePage::DEFAULT
    }
}

impl fmt::Display for CodePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CP{}", self.0)
    }
}

impl TryFrom<u16> for CodePage {
    type Error = ImageError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        CodePage::new(id)
    }
}

/// Upper half (0x80-0xFF) of code page 437.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

#[derive(Debug)]
struct Cp437;

static CP437: Cp437 = Cp437;

impl OemCpConverter for Cp437 {
    fn decode(&self, oem_char: u8) -> char {
        if oem_char < 0x80 {
            oem_char as char
        } else {
            CP437_HIGH[(oem_char - 0x80) as usize]
        }
    }

    fn encode(&self, uni_char: char) -> Option<u8> {
        if uni_char.is_ascii() {
            return Some(uni_char as u8);
        }
        CP437_HIGH
            .iter()
            .position(|&c| c == uni_char)
            .map(|i| 0x80 + i as u8)
    }
}

#[derive(Debug)]
struct AsciiOnly;

static ASCII_ONLY: AsciiOnly = AsciiOnly;

impl OemCpConverter for AsciiOnly {
    fn decode(&self, oem_char: u8) -> char {
        if oem_char < 0x80 {
            oem_char as char
        } else {
            '\u{FFFD}'
        }
    }

    fn encode(&self, uni_char: char) -> Option<u8> {
        uni_char.is_ascii().then_some(uni_char as u8)
    }
}
