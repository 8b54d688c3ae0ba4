//! Story file header: the first 64 bytes, cached into typed fields.
//!
//! Multi-byte header values are big-endian. On load (and again after a
//! restore) the interpreter rewrites the capability fields so the story
//! learns what this host can do.

use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use bitflags::bitflags;

/// Header byte offsets
pub const H_VERSION: usize = 0;
pub const H_CONFIG: usize = 1;
pub const H_RELEASE: usize = 2;
pub const H_RESIDENT_SIZE: usize = 4;
pub const H_START_PC: usize = 6;
pub const H_DICTIONARY: usize = 8;
pub const H_OBJECTS: usize = 10;
pub const H_GLOBALS: usize = 12;
pub const H_DYNAMIC_SIZE: usize = 14;
pub const H_FLAGS: usize = 16;
pub const H_SERIAL: usize = 18;
pub const H_ABBREVIATIONS: usize = 24;
pub const H_FILE_SIZE: usize = 26;
pub const H_CHECKSUM: usize = 28;
pub const H_INTERPRETER_NUMBER: usize = 30;
pub const H_INTERPRETER_VERSION: usize = 31;
pub const H_SCREEN_ROWS: usize = 32;
pub const H_SCREEN_COLS: usize = 33;
pub const H_SCREEN_WIDTH: usize = 34;
pub const H_SCREEN_HEIGHT: usize = 36;
pub const H_FONT_HEIGHT: usize = 38;
pub const H_FONT_WIDTH: usize = 39;
pub const H_FUNCTIONS_OFFSET: usize = 40;
pub const H_STRINGS_OFFSET: usize = 42;
pub const H_DEFAULT_BACKGROUND: usize = 44;
pub const H_DEFAULT_FOREGROUND: usize = 45;
pub const H_TERMINATING_KEYS: usize = 46;
pub const H_STANDARD_HIGH: usize = 50;
pub const H_STANDARD_LOW: usize = 51;
pub const H_ALPHABET: usize = 52;
pub const H_EXTENSION_TABLE: usize = 54;

/// Extension table word indices
pub const HX_TABLE_SIZE: u16 = 0;
pub const HX_MOUSE_X: u16 = 1;
pub const HX_MOUSE_Y: u16 = 2;
pub const HX_UNICODE_TABLE: u16 = 3;

bitflags! {
    /// Config byte (Flags 1) for V1-3
    pub struct ConfigV3: u8 {
        const BYTE_SWAPPED = 0x01;
        const TIME         = 0x02;
        const TWO_DISKS    = 0x04;
        const TANDY        = 0x08;
        const NOSTATUSLINE = 0x10;
        const SPLITSCREEN  = 0x20;
        const PROPORTIONAL = 0x40;
    }
}

bitflags! {
    /// Config byte (Flags 1) for V4+
    pub struct ConfigV4: u8 {
        const COLOUR       = 0x01;
        const PICTURES     = 0x02;
        const BOLDFACE     = 0x04;
        const EMPHASIS     = 0x08;
        const FIXED        = 0x10;
        const SOUND        = 0x20;
        const TIMEDINPUT   = 0x80;
    }
}

bitflags! {
    /// Flags 2 word: capabilities the story requests / the guest may toggle
    pub struct Flags2: u16 {
        const SCRIPTING  = 0x0001;
        const FIXED_FONT = 0x0002;
        const REFRESH    = 0x0004;
        const GRAPHICS   = 0x0008;
        const UNDO       = 0x0010;
        const MOUSE      = 0x0020;
        const COLOUR     = 0x0040;
        const SOUND      = 0x0080;
        const MENU       = 0x0100;
    }
}

/// Interpreter number advertised in the header
pub const INTERP_DEFAULT: u8 = 0;
pub const INTERP_DEC_20: u8 = 1;
pub const INTERP_MSDOS: u8 = 6;

/// Cached header fields, parsed once from the story image.
pub struct Header {
    pub version: u8,
    pub config: u8,
    pub release: u16,
    pub resident_size: u16,
    pub start_pc: u16,
    pub dictionary: u16,
    pub objects: u16,
    pub globals: u16,
    pub dynamic_size: u16,
    pub flags: u16,
    pub serial: [u8; 6],
    pub abbreviations: u16,
    /// Full story length in bytes (already scaled by the version multiplier)
    pub file_size: usize,
    pub checksum: u16,
    pub screen_rows: u8,
    pub screen_cols: u8,
    pub functions_offset: u16,
    pub strings_offset: u16,
    pub default_background: u8,
    pub default_foreground: u8,
    pub alphabet: u16,
    pub extension_table: u16,
    /// Word count of the extension table (0 when absent)
    pub extension_words: u16,
    /// Custom ZSCII-to-Unicode table address (0 when absent)
    pub unicode_table: u16,
}

fn word_at(bytes: &[u8], offset: usize) -> u16 {
    ((bytes[offset] as u16) << 8) | bytes[offset + 1] as u16
}

impl Header {
    /// Parse the 64-byte header. The caller has already checked the image
    /// is at least 64 bytes long.
    pub fn new(bytes: &[u8]) -> Result<Header, String> {
        let version = bytes[H_VERSION];
        if !(1..=8).contains(&version) {
            return Err(format!("Unsupported Z-code version: {version}"));
        }

        let mut serial = [0u8; 6];
        serial.copy_from_slice(&bytes[H_SERIAL..H_SERIAL + 6]);

        // The file-size word is scaled by a version-dependent factor.
        // Very old games leave it zero; the OS file length is used then.
        let scale: usize = match version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };
        let mut file_size = word_at(bytes, H_FILE_SIZE) as usize * scale;
        if file_size == 0 {
            file_size = bytes.len();
        }

        let extension_table = word_at(bytes, H_EXTENSION_TABLE);
        let (extension_words, unicode_table) =
            if extension_table != 0 && (extension_table as usize) + 1 < bytes.len() {
                let nwords = word_at(bytes, extension_table as usize);
                let unicode = if nwords >= HX_UNICODE_TABLE {
                    word_at(
                        bytes,
                        extension_table as usize + 2 * HX_UNICODE_TABLE as usize,
                    )
                } else {
                    0
                };
                (nwords, unicode)
            } else {
                (0, 0)
            };

        Ok(Header {
            version,
            config: bytes[H_CONFIG],
            release: word_at(bytes, H_RELEASE),
            resident_size: word_at(bytes, H_RESIDENT_SIZE),
            start_pc: word_at(bytes, H_START_PC),
            dictionary: word_at(bytes, H_DICTIONARY),
            objects: word_at(bytes, H_OBJECTS),
            globals: word_at(bytes, H_GLOBALS),
            dynamic_size: word_at(bytes, H_DYNAMIC_SIZE),
            flags: word_at(bytes, H_FLAGS),
            serial,
            abbreviations: word_at(bytes, H_ABBREVIATIONS),
            file_size,
            checksum: word_at(bytes, H_CHECKSUM),
            screen_rows: bytes[H_SCREEN_ROWS],
            screen_cols: bytes[H_SCREEN_COLS],
            functions_offset: word_at(bytes, H_FUNCTIONS_OFFSET),
            strings_offset: word_at(bytes, H_STRINGS_OFFSET),
            default_background: bytes[H_DEFAULT_BACKGROUND],
            default_foreground: bytes[H_DEFAULT_FOREGROUND],
            alphabet: word_at(bytes, H_ALPHABET),
            extension_table,
            extension_words,
            unicode_table,
        })
    }

    pub fn serial_string(&self) -> String {
        self.serial.iter().map(|&b| b as char).collect()
    }

    /// Rewrite the interpreter-identifying fields in the live image so the
    /// story knows this host's capabilities. Called on load, after restart
    /// and after a successful restore.
    pub fn write_capabilities(&mut self, mem: &mut [u8], rows: u8, cols: u8) {
        if self.version <= 3 {
            let mut config = ConfigV3::from_bits_truncate(mem[H_CONFIG]);
            config.remove(ConfigV3::BYTE_SWAPPED | ConfigV3::NOSTATUSLINE | ConfigV3::PROPORTIONAL);
            config.insert(ConfigV3::SPLITSCREEN);
            mem[H_CONFIG] = config.bits();
        } else {
            let mut config = ConfigV4::from_bits_truncate(mem[H_CONFIG]);
            config.remove(ConfigV4::COLOUR | ConfigV4::PICTURES | ConfigV4::SOUND);
            config.insert(ConfigV4::BOLDFACE | ConfigV4::EMPHASIS | ConfigV4::FIXED);
            config.insert(ConfigV4::TIMEDINPUT);
            mem[H_CONFIG] = config.bits();
        }
        self.config = mem[H_CONFIG];

        // Drop capability requests this host cannot honour.
        let mut flags = Flags2::from_bits_truncate(word_at(mem, H_FLAGS));
        flags.remove(
            Flags2::GRAPHICS | Flags2::MOUSE | Flags2::COLOUR | Flags2::SOUND | Flags2::MENU,
        );
        mem[H_FLAGS] = (flags.bits() >> 8) as u8;
        mem[H_FLAGS + 1] = flags.bits() as u8;
        self.flags = flags.bits();

        if self.version >= 4 {
            mem[H_INTERPRETER_NUMBER] = INTERP_DEC_20;
            mem[H_INTERPRETER_VERSION] = b'F';
            mem[H_SCREEN_ROWS] = rows;
            mem[H_SCREEN_COLS] = cols;
        }
        if self.version >= 5 {
            mem[H_SCREEN_WIDTH] = 0;
            mem[H_SCREEN_WIDTH + 1] = cols;
            mem[H_SCREEN_HEIGHT] = 0;
            mem[H_SCREEN_HEIGHT + 1] = rows;
            mem[H_FONT_HEIGHT] = 1;
            mem[H_FONT_WIDTH] = 1;
            mem[H_DEFAULT_BACKGROUND] = self.default_background;
            mem[H_DEFAULT_FOREGROUND] = self.default_foreground;
        }
        mem[H_STANDARD_HIGH] = 1;
        mem[H_STANDARD_LOW] = 1;
        self.screen_rows = rows;
        self.screen_cols = cols;
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Serial number:            {}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.resident_size,
            self.start_pc,
            self.dictionary,
            self.objects,
            self.globals,
            self.dynamic_size,
            self.serial_string(),
            self.abbreviations,
            self.file_size,
            self.checksum,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_image() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x10000];
        bytes[H_VERSION] = 3;
        bytes[H_RELEASE + 1] = 88;
        bytes[H_START_PC] = 0x50;
        bytes[H_DYNAMIC_SIZE] = 0x04;
        bytes[H_SERIAL..H_SERIAL + 6].copy_from_slice(b"840726");
        bytes[H_FILE_SIZE] = 0x80; // 0x8000 words * 2 = 0x10000 bytes
        bytes
    }

    #[test]
    fn parse_minimal_header() {
        let h = Header::new(&minimal_image()).unwrap();
        assert_eq!(h.version, 3);
        assert_eq!(h.release, 88);
        assert_eq!(h.start_pc, 0x5000);
        assert_eq!(h.dynamic_size, 0x0400);
        assert_eq!(h.serial_string(), "840726");
        assert_eq!(h.file_size, 0x10000);
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = minimal_image();
        bytes[H_VERSION] = 9;
        assert!(Header::new(&bytes).is_err());
    }

    #[test]
    fn capability_rewrite_masks_flags2() {
        let mut bytes = minimal_image();
        bytes[H_FLAGS + 1] = 0xff; // story asks for everything
        let mut h = Header::new(&bytes).unwrap();
        h.write_capabilities(&mut bytes, 24, 80);
        let flags =
            Flags2::from_bits_truncate(((bytes[H_FLAGS] as u16) << 8) | bytes[H_FLAGS + 1] as u16);
        assert!(!flags.contains(Flags2::GRAPHICS));
        assert!(!flags.contains(Flags2::SOUND));
        assert!(flags.contains(Flags2::UNDO));
    }
}
