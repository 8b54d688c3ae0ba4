//! Synthetic story images for tests.
//!
//! `StoryBuilder` lays out a tiny but complete V3 game — header,
//! abbreviations, globals, object tree, dictionary, and a scripted
//! program — so interpreter and driver tests run without any commercial
//! story file. The program prints a room name, then loops: read a
//! command, bump the move counter, print it, roll and print a random
//! number, set an attribute on the mailbox, and declare victory on the
//! third move.

use crate::header::{H_CHECKSUM, H_SERIAL};

pub const OBJ_CHAMBER: u16 = 1;
pub const OBJ_PLAYER: u16 = 2;
pub const OBJ_MAILBOX: u16 = 3;
pub const OBJ_EGG: u16 = 4;

pub const ABBREV_TABLE: usize = 0x0040;
pub const GLOBALS: usize = 0x0100;
pub const TEXT_BUFFER: u32 = 0x02e0;
pub const PARSE_BUFFER: u32 = 0x0320;
pub const OBJECT_TABLE: usize = 0x0400;
pub const DICTIONARY: usize = 0x0500;
pub const DYNAMIC_SIZE: usize = 0x0600;
pub const START_PC: usize = 0x0700;
pub const FILE_SIZE: usize = 0x1000;

/// Words of the synthetic dictionary, sorted by their encoded form.
pub const DICT_WORDS: [&str; 10] = [
    "egg",
    "inventory",
    "look",
    "mailbox",
    "north",
    "open",
    "south",
    "take",
    "wait",
    "x",
];

/// Encode a string as packed z-chars: lowercase in A0, uppercase via
/// shift 4, A2 punctuation via shift 5, end bit on the final word.
pub fn encode_zstring(text: &str) -> Vec<u8> {
    const A2: &[u8] = b" \r0123456789.,!?_#'\"/\\-:()";
    let mut zchars: Vec<u8> = Vec::new();
    for ch in text.chars() {
        match ch {
            ' ' => zchars.push(0),
            'a'..='z' => zchars.push(ch as u8 - b'a' + 6),
            'A'..='Z' => {
                zchars.push(4);
                zchars.push(ch as u8 - b'A' + 6);
            }
            '\n' => {
                zchars.push(5);
                zchars.push(7);
            }
            _ => {
                if let Some(pos) = A2.iter().position(|&b| b == ch as u8) {
                    zchars.push(5);
                    zchars.push(pos as u8 + 6);
                } else {
                    // 10-bit ZSCII escape
                    zchars.push(5);
                    zchars.push(6);
                    zchars.push(((ch as u16) >> 5) as u8 & 0x1f);
                    zchars.push((ch as u16) as u8 & 0x1f);
                }
            }
        }
    }
    while zchars.len() % 3 != 0 {
        zchars.push(5);
    }
    let mut out = Vec::new();
    let n_words = zchars.len() / 3;
    for (i, chunk) in zchars.chunks(3).enumerate() {
        let mut word =
            ((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | chunk[2] as u16;
        if i == n_words - 1 {
            word |= 0x8000;
        }
        out.push((word >> 8) as u8);
        out.push(word as u8);
    }
    out
}

/// Encode a dictionary key: exactly six z-chars in two words (V3).
fn encode_dict_key(word: &str) -> [u8; 4] {
    let mut zchars: Vec<u8> = word
        .bytes()
        .take(6)
        .map(|b| b.to_ascii_lowercase() - b'a' + 6)
        .collect();
    while zchars.len() < 6 {
        zchars.push(5);
    }
    let w1 = ((zchars[0] as u16) << 10) | ((zchars[1] as u16) << 5) | zchars[2] as u16;
    let w2 =
        0x8000 | ((zchars[3] as u16) << 10) | ((zchars[4] as u16) << 5) | zchars[5] as u16;
    [(w1 >> 8) as u8, w1 as u8, (w2 >> 8) as u8, w2 as u8]
}

pub struct StoryBuilder {
    version: u8,
    mem: Vec<u8>,
}

impl StoryBuilder {
    pub fn new(version: u8) -> Self {
        let mut builder = StoryBuilder {
            version,
            mem: vec![0u8; FILE_SIZE],
        };
        builder.write_header();
        if version == 3 {
            builder.write_objects();
            builder.write_dictionary();
            builder.write_program(&default_program());
            builder.init_buffers();
        }
        builder
    }

    /// Replace the scripted program with custom code at the start PC.
    pub fn with_code(mut self, code: &[u8]) -> Self {
        self.mem[START_PC..START_PC + code.len()].copy_from_slice(code);
        self
    }

    /// Finish: fix the checksum and return the image.
    pub fn build(mut self) -> Vec<u8> {
        self.mem[H_CHECKSUM] = 0;
        self.mem[H_CHECKSUM + 1] = 0;
        let checksum = self.mem[0x40..FILE_SIZE]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        self.mem[H_CHECKSUM] = (checksum >> 8) as u8;
        self.mem[H_CHECKSUM + 1] = checksum as u8;
        self.mem
    }

    fn put_word(&mut self, addr: usize, value: u16) {
        self.mem[addr] = (value >> 8) as u8;
        self.mem[addr + 1] = value as u8;
    }

    fn write_header(&mut self) {
        self.mem[0] = self.version;
        self.put_word(2, 1); // release
        self.put_word(4, START_PC as u16); // resident size
        self.put_word(6, START_PC as u16); // start PC
        self.put_word(8, DICTIONARY as u16);
        self.put_word(10, OBJECT_TABLE as u16);
        self.put_word(12, GLOBALS as u16);
        self.put_word(14, DYNAMIC_SIZE as u16);
        self.mem[H_SERIAL..H_SERIAL + 6].copy_from_slice(b"230101");
        self.put_word(0x18, ABBREV_TABLE as u16);
        let scale = match self.version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };
        self.put_word(0x1a, (FILE_SIZE / scale) as u16);
    }

    fn write_objects(&mut self) {
        // Property defaults: default for prop n is 0x8000 + n
        for prop in 1..=31usize {
            self.put_word(OBJECT_TABLE + 2 * (prop - 1), 0x8000 + prop as u16);
        }

        let tree = OBJECT_TABLE + 62;
        let prop_tables = [0x04a0usize, 0x04b8, 0x04d0, 0x04e8];
        // (parent, sibling, child) per object
        let links = [
            (0u8, 0u8, OBJ_PLAYER as u8),
            (OBJ_CHAMBER as u8, OBJ_MAILBOX as u8, 0),
            (OBJ_CHAMBER as u8, 0, OBJ_EGG as u8),
            (OBJ_MAILBOX as u8, 0, 0),
        ];
        for (i, (parent, sibling, child)) in links.iter().enumerate() {
            let at = tree + 9 * i;
            // attribute bytes stay zero
            self.mem[at + 4] = *parent;
            self.mem[at + 5] = *sibling;
            self.mem[at + 6] = *child;
            self.put_word(at + 7, prop_tables[i] as u16);
        }

        // (name, properties descending): property values are recognisable
        let objects: [(&str, &[(u8, &[u8])]); 4] = [
            ("chamber", &[(16, &[0x11, 0x22])]),
            ("you", &[(17, &[0x01, 0x02]), (16, &[0x0a, 0x0b])]),
            (
                "small mailbox",
                &[(18, &[0x21, 0x43]), (16, &[0x65, 0x87]), (10, &[0x05])],
            ),
            ("jeweled egg", &[(16, &[0x99, 0x9a])]),
        ];
        for (i, (name, props)) in objects.iter().enumerate() {
            let mut at = prop_tables[i];
            let encoded = encode_zstring(name);
            self.mem[at] = (encoded.len() / 2) as u8;
            at += 1;
            self.mem[at..at + encoded.len()].copy_from_slice(&encoded);
            at += encoded.len();
            for (id, data) in props.iter() {
                self.mem[at] = ((data.len() as u8 - 1) << 5) | id;
                at += 1;
                self.mem[at..at + data.len()].copy_from_slice(data);
                at += data.len();
            }
            self.mem[at] = 0;
        }
    }

    fn write_dictionary(&mut self) {
        let mut at = DICTIONARY;
        let separators = b".,\"";
        self.mem[at] = separators.len() as u8;
        at += 1;
        self.mem[at..at + separators.len()].copy_from_slice(separators);
        at += separators.len();
        self.mem[at] = 7; // entry length: 4-byte key + 3 data bytes
        at += 1;
        self.put_word(at, DICT_WORDS.len() as u16);
        at += 2;
        for (i, word) in DICT_WORDS.iter().enumerate() {
            let key = encode_dict_key(word);
            self.mem[at..at + 4].copy_from_slice(&key);
            self.mem[at + 4] = i as u8 + 1; // flag byte, game-specific
            at += 7;
        }
    }

    fn init_buffers(&mut self) {
        self.mem[TEXT_BUFFER as usize] = 40;
        self.mem[PARSE_BUFFER as usize] = 10;
    }

    fn write_program(&mut self, code: &[u8]) {
        self.mem[START_PC..START_PC + code.len()].copy_from_slice(code);
    }
}

/// The scripted test game (see module docs).
fn default_program() -> Vec<u8> {
    let mut code: Vec<u8> = Vec::new();

    // print "Test Chamber." ; new_line
    code.push(0xb2);
    code.extend(encode_zstring("Test Chamber."));
    code.push(0xbb);

    let loop_addr = START_PC + code.len();

    // sread text parse
    code.extend([
        0xe4,
        0x0f,
        (TEXT_BUFFER >> 8) as u8,
        TEXT_BUFFER as u8,
        (PARSE_BUFFER >> 8) as u8,
        PARSE_BUFFER as u8,
    ]);
    // inc G01 (the move counter)
    code.extend([0x95, 0x11]);
    // print_num G01 ; new_line
    code.extend([0xe6, 0xbf, 0x11]);
    code.push(0xbb);
    // random 100 -> stack ; print_num stack ; new_line
    code.extend([0xe7, 0x7f, 100, 0x00]);
    code.extend([0xe6, 0xbf, 0x00]);
    code.push(0xbb);
    // set_attr mailbox, 10
    code.extend([0x0b, OBJ_MAILBOX as u8, 10]);
    // je G01, 3 -> win (skips the 3-byte jump; short branch offset 5)
    code.extend([0x41, 0x11, 0x03, 0xc5]);
    // jump loop
    let after_jump = START_PC + code.len() + 3;
    let offset = (loop_addr as i32 - after_jump as i32 + 2) as i16 as u16;
    code.extend([0x8c, (offset >> 8) as u8, offset as u8]);
    // win: print the victory banner and quit
    code.push(0xb2);
    code.extend(encode_zstring("****  You have won  ****"));
    code.push(0xbb);
    code.push(0xba);

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;

    #[test]
    fn image_parses_and_checksums() {
        let image = StoryBuilder::new(3).build();
        let header = Header::new(&image).unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.dynamic_size as usize, DYNAMIC_SIZE);
        assert_eq!(header.start_pc as usize, START_PC);
        let checksum = image[0x40..FILE_SIZE]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        assert_eq!(header.checksum, checksum);
    }

    #[test]
    fn encoded_names_decode_back() {
        let image = StoryBuilder::new(3).build();
        let header = Header::new(&image).unwrap();
        let encoded = encode_zstring("Test Chamber.");
        let at = 0x0800;
        let mut mem = image;
        mem[at..at + encoded.len()].copy_from_slice(&encoded);
        let (text, _) = crate::text::decode_string(&mem, at, &header).unwrap();
        assert_eq!(text, "Test Chamber.");
    }

    #[test]
    fn dictionary_keys_are_sorted() {
        let keys: Vec<[u8; 4]> = DICT_WORDS.iter().map(|w| encode_dict_key(w)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
