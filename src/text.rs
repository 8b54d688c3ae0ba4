//! ZSCII and Z-string codec: 5-bit packed strings, the three alphabet
//! rows, abbreviation expansion, and the ZSCII-to-Unicode mapping.

use crate::header::Header;
use log::{debug, trace};

/// The three alphabets for Z-string decoding (V2+)
pub const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
pub const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const ALPHABET_A2: &[u8] = b" \r0123456789.,!?_#'\"/\\-:()";
/// V1 has no newline in A2 and an extra '<'
const ALPHABET_A2_V1: &[u8] = b" 0123456789.,!?_#'\"/\\<-:()";

/// ZSCII newline
pub const ZC_RETURN: u16 = 13;

/// Default Unicode translations for ZSCII 155..=223
const DEFAULT_UNICODE: [char; 69] = [
    'ä', 'ö', 'ü', 'Ä', 'Ö', 'Ü', 'ß', '»', '«', 'ë', 'ï', 'ÿ', 'Ë', 'Ï', 'á', 'é', 'í', 'ó',
    'ú', 'ý', 'Á', 'É', 'Í', 'Ó', 'Ú', 'Ý', 'à', 'è', 'ì', 'ò', 'ù', 'À', 'È', 'Ì', 'Ò', 'Ù',
    'â', 'ê', 'î', 'ô', 'û', 'Â', 'Ê', 'Î', 'Ô', 'Û', 'å', 'Å', 'ø', 'Ø', 'ã', 'ñ', 'õ', 'Ã',
    'Ñ', 'Õ', 'æ', 'Æ', 'ç', 'Ç', 'þ', 'ð', 'Þ', 'Ð', '£', 'œ', 'Œ', '¡', '¿',
];

/// Fetch the character for a z-char in the given alphabet row, honouring a
/// custom alphabet table when the header declares one.
fn alphabet_char(mem: &[u8], header: &Header, row: usize, zc: u8) -> u16 {
    let index = (zc - 6) as usize;
    if header.alphabet != 0 {
        let addr = header.alphabet as usize + row * 26 + index;
        if addr < mem.len() {
            // Z-chars 6 and 7 of row 2 keep their escape meanings even
            // under a custom table.
            if row == 2 && index == 1 {
                return ZC_RETURN;
            }
            return mem[addr] as u16;
        }
    }
    let table = match row {
        0 => ALPHABET_A0,
        1 => ALPHABET_A1,
        _ => {
            if header.version == 1 {
                ALPHABET_A2_V1
            } else {
                ALPHABET_A2
            }
        }
    };
    table[index] as u16
}

/// Map a ZSCII code to a host character. Codes above 154 consult the
/// extension table's Unicode translations when present, else the default
/// table; everything unmapped becomes '?'.
pub fn zscii_to_unicode(mem: &[u8], header: &Header, c: u16) -> char {
    match c {
        0 => '\0',
        13 => '\n',
        32..=126 => (c as u8) as char,
        155..=251 => {
            if header.unicode_table != 0 {
                let table = header.unicode_table as usize;
                let count = *mem.get(table).unwrap_or(&0) as u16;
                let index = c - 155;
                if index < count {
                    let at = table + 1 + 2 * index as usize;
                    let unit = ((mem[at] as u32) << 8) | mem[at + 1] as u32;
                    return char::from_u32(unit).unwrap_or('?');
                }
                return '?';
            }
            let index = (c - 155) as usize;
            if index < DEFAULT_UNICODE.len() {
                DEFAULT_UNICODE[index]
            } else {
                '?'
            }
        }
        _ => '?',
    }
}

/// Map a host character to ZSCII for input buffers. Unsupported
/// characters become '?' so tokenisation still sees a word boundary.
pub fn unicode_to_zscii(mem: &[u8], header: &Header, ch: char) -> u8 {
    match ch {
        '\n' => 13,
        ' '..='~' => ch as u8,
        _ => {
            if header.unicode_table != 0 {
                let table = header.unicode_table as usize;
                let count = *mem.get(table).unwrap_or(&0) as u16;
                for index in 0..count {
                    let at = table + 1 + 2 * index as usize;
                    let unit = ((mem[at] as u32) << 8) | mem[at + 1] as u32;
                    if char::from_u32(unit) == Some(ch) {
                        return (155 + index) as u8;
                    }
                }
                return b'?';
            }
            for (i, &u) in DEFAULT_UNICODE.iter().enumerate() {
                if u == ch {
                    return (155 + i) as u8;
                }
            }
            b'?'
        }
    }
}

/// Decode the packed Z-string at `addr` into ZSCII codes. Returns the
/// codes and the number of bytes consumed. `allow_abbrev` is cleared when
/// decoding an abbreviation itself: they must not nest.
pub fn decode_zscii(
    mem: &[u8],
    addr: usize,
    header: &Header,
    allow_abbrev: bool,
) -> Result<(Vec<u16>, usize), String> {
    let mut out = Vec::new();
    let mut offset = addr;

    // Shift state: the active row, plus the row locked in by V1-2 shift
    // lock characters.
    let mut locked_row = 0usize;
    let mut row = 0usize;

    // Multi-z-char sequences in flight
    let mut abbrev_bank: Option<u8> = None;
    let mut escape: Option<(u8, Option<u8>)> = None; // (count read so far, high bits)

    loop {
        if offset + 1 >= mem.len() {
            return Err(format!("Z-string at {addr:05x} runs off the end of memory"));
        }
        let word = ((mem[offset] as u16) << 8) | mem[offset + 1] as u16;
        offset += 2;
        let is_end = word & 0x8000 != 0;

        for shift in [10u16, 5, 0] {
            let zc = ((word >> shift) & 0x1f) as u8;
            trace!("z-char {zc} (row {row})");

            if let Some(bank) = abbrev_bank.take() {
                let index = 32 * (bank as usize - 1) + zc as usize;
                let entry = header.abbreviations as usize + 2 * index;
                if entry + 1 >= mem.len() {
                    return Err(format!("Abbreviation {index} entry out of range"));
                }
                let word_addr = ((mem[entry] as usize) << 8) | mem[entry + 1] as usize;
                let string_addr = word_addr * 2;
                if !allow_abbrev {
                    return Err("Abbreviation inside an abbreviation".to_string());
                }
                let (expansion, _) = decode_zscii(mem, string_addr, header, false)?;
                out.extend_from_slice(&expansion);
                continue;
            }

            if let Some((count, high)) = escape.take() {
                if count == 0 {
                    escape = Some((1, Some(zc)));
                } else {
                    let code = ((high.unwrap_or(0) as u16) << 5) | zc as u16;
                    out.push(code);
                }
                continue;
            }

            match zc {
                0 => out.push(b' ' as u16),
                1 if header.version == 1 => out.push(ZC_RETURN),
                1..=3 if header.version >= 3 || zc == 1 => {
                    // V2 has one abbreviation bank; V3+ have three
                    abbrev_bank = Some(zc);
                }
                2 | 3 => {
                    // V1-2 single shift
                    row = shift_row(locked_row, zc);
                    continue;
                }
                4 | 5 => {
                    if header.version <= 2 {
                        // shift lock
                        locked_row = shift_row(locked_row, zc - 2);
                        row = locked_row;
                    } else {
                        row = if zc == 4 { 1 } else { 2 };
                    }
                    continue;
                }
                6 if row == 2 => {
                    escape = Some((0, None));
                    row = locked_row;
                    continue;
                }
                7 if row == 2 && header.version >= 2 => {
                    out.push(ZC_RETURN);
                    row = locked_row;
                }
                _ => {
                    out.push(alphabet_char(mem, header, row, zc));
                    row = locked_row;
                }
            }
            // Plain characters and literals reset a temporary shift.
            row = locked_row;
        }

        if is_end {
            break;
        }
    }

    Ok((out, offset - addr))
}

/// V1-2 shift arithmetic: from the current row, shift char 2 moves one
/// row forward, 3 moves two forward (mod 3).
fn shift_row(current: usize, zc: u8) -> usize {
    (current + if zc == 2 { 1 } else { 2 }) % 3
}

/// Decode a Z-string to a host string. Returns the text and the number of
/// bytes consumed.
pub fn decode_string(mem: &[u8], addr: usize, header: &Header) -> Result<(String, usize), String> {
    let (zscii, len) = decode_zscii(mem, addr, header, true)?;
    let text = zscii
        .iter()
        .filter(|&&c| c != 0)
        .map(|&c| zscii_to_unicode(mem, header, c))
        .collect();
    Ok((text, len))
}

/// Number of z-chars in an encoded dictionary word: 6 in V1-3, 9 in V4+.
pub fn resolution(version: u8) -> usize {
    if version <= 3 {
        6
    } else {
        9
    }
}

/// Encode ZSCII input text into dictionary form: exactly 2 (V1-3) or 3
/// (V4+) words, padded with z-char 5, end bit set on the last word.
pub fn encode_word(mem: &[u8], header: &Header, text: &[u8]) -> Vec<u16> {
    let n_zchars = resolution(header.version);
    let mut zchars: Vec<u8> = Vec::with_capacity(n_zchars);

    'next: for &byte in text {
        if zchars.len() >= n_zchars {
            break;
        }
        let c = byte.to_ascii_lowercase() as u16;
        for row in 0..3usize {
            for zc in 6u8..32 {
                if row == 2 && (zc == 6 || zc == 7) {
                    continue; // escape and newline slots
                }
                if alphabet_char(mem, header, row, zc) == c {
                    match row {
                        0 => zchars.push(zc),
                        _ => {
                            zchars.push(if row == 1 { 4 } else { 5 });
                            zchars.push(zc);
                        }
                    }
                    continue 'next;
                }
            }
        }
        // Not in any alphabet: 10-bit ZSCII escape
        zchars.push(5);
        zchars.push(6);
        zchars.push(((c >> 5) & 0x1f) as u8);
        zchars.push((c & 0x1f) as u8);
    }

    zchars.truncate(n_zchars);
    while zchars.len() < n_zchars {
        zchars.push(5);
    }

    let mut words = Vec::with_capacity(n_zchars / 3);
    for chunk in zchars.chunks(3) {
        words.push(((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | chunk[2] as u16);
    }
    *words.last_mut().unwrap() |= 0x8000;
    debug!("encoded {:?} as {:04x?}", text, words);
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::test_utils::StoryBuilder;

    fn story_and_header() -> (Vec<u8>, Header) {
        let bytes = StoryBuilder::new(3).build();
        let header = Header::new(&bytes).unwrap();
        (bytes, header)
    }

    #[test]
    fn decode_simple_word() {
        let (mut mem, header) = story_and_header();
        // "hello": z-chars 13 10 17 / 17 20 pad
        mem[0x0800] = 0x35;
        mem[0x0801] = 0x51;
        mem[0x0802] = 0xc6;
        mem[0x0803] = 0x85;
        let (text, len) = decode_string(&mem, 0x0800, &header).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(len, 4);
    }

    #[test]
    fn decode_shift_to_upper() {
        let (mut mem, header) = story_and_header();
        // shift(4), 'h'->H, 'i', pad; one word with end bit
        let word: u16 = 0x8000 | (4 << 10) | (13 << 5) | 14;
        mem[0x0800] = (word >> 8) as u8;
        mem[0x0801] = word as u8;
        let (text, _) = decode_string(&mem, 0x0800, &header).unwrap();
        assert_eq!(text, "Hi");
    }

    #[test]
    fn encode_decode_round_trip() {
        let (mut mem, header) = story_and_header();
        for word in ["mailbox", "north", "egg", "x", "lantern"] {
            let words = encode_word(&mem, &header, word.as_bytes());
            assert_eq!(words.len(), 2);
            let base = 0x0800;
            for (i, w) in words.iter().enumerate() {
                mem[base + 2 * i] = (w >> 8) as u8;
                mem[base + 2 * i + 1] = *w as u8;
            }
            let (text, _) = decode_string(&mem, base, &header).unwrap();
            let expect: String = word.chars().take(6).collect();
            assert_eq!(text, expect);
        }
    }

    #[test]
    fn zscii_escape_round_trip() {
        let (mut mem, header) = story_and_header();
        let words = encode_word(&mem, &header, b"a@b");
        let base = 0x0800;
        for (i, w) in words.iter().enumerate() {
            mem[base + 2 * i] = (w >> 8) as u8;
            mem[base + 2 * i + 1] = *w as u8;
        }
        let (text, _) = decode_string(&mem, base, &header).unwrap();
        assert!(text.starts_with("a@"));
    }

    #[test]
    fn unicode_defaults_above_latin() {
        let (mem, header) = story_and_header();
        assert_eq!(zscii_to_unicode(&mem, &header, 155), 'ä');
        assert_eq!(zscii_to_unicode(&mem, &header, 223), '¿');
        assert_eq!(unicode_to_zscii(&mem, &header, 'ä'), 155);
    }
}
