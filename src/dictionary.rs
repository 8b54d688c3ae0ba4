//! Dictionary search and input tokenisation.
//!
//! The dictionary starts with its separator set, then an entry length and
//! a signed entry count: positive counts are sorted (binary search),
//! negative counts mark the unsorted user dictionaries `tokenise` may be
//! pointed at.

use crate::text;
use crate::vm::VM;
use log::debug;

impl VM {
    /// The word-separator characters of the given dictionary.
    pub fn dictionary_separators(&self, dict: u32) -> Vec<u8> {
        let n = self.read_byte(dict) as u32;
        (0..n).map(|i| self.read_byte(dict + 1 + i)).collect()
    }

    /// Look up an encoded word; returns the entry address or 0.
    pub fn lookup_word(&self, dict: u32, word: &[u8]) -> u32 {
        let encoded = text::encode_word(&self.game.memory, &self.game.header, word);

        let sep_count = self.read_byte(dict) as u32;
        let entry_length = self.read_byte(dict + 1 + sep_count) as u32;
        let entry_count = self.read_word(dict + 2 + sep_count) as i16;
        let entries = dict + 4 + sep_count;

        let key_words = encoded.len() as u32;

        let compare = |entry_addr: u32| -> std::cmp::Ordering {
            for (i, &w) in encoded.iter().enumerate() {
                let dw = self.read_word(entry_addr + 2 * i as u32);
                match w.cmp(&dw) {
                    std::cmp::Ordering::Equal => continue,
                    other => return other,
                }
            }
            std::cmp::Ordering::Equal
        };

        if entry_count < 0 {
            // Unsorted user dictionary: linear scan
            for i in 0..(-entry_count) as u32 {
                let addr = entries + i * entry_length;
                if compare(addr) == std::cmp::Ordering::Equal {
                    return addr;
                }
            }
            return 0;
        }

        debug!(
            "dictionary lookup {:02x?} among {} entries of {} bytes",
            &encoded[..key_words as usize],
            entry_count,
            entry_length
        );

        let mut low = 0i32;
        let mut high = entry_count as i32 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            let addr = entries + mid as u32 * entry_length;
            match compare(addr) {
                std::cmp::Ordering::Equal => return addr,
                std::cmp::Ordering::Less => high = mid - 1,
                std::cmp::Ordering::Greater => low = mid + 1,
            }
        }
        0
    }

    /// Raw ZSCII content of the text buffer, with its starting offset.
    /// V1-4 buffers are zero-terminated from byte 1; V5+ carry a length
    /// byte at offset 1 with text from byte 2.
    pub fn read_text_buffer(&self, buf: u32) -> (Vec<u8>, u32) {
        if self.game.header.version <= 4 {
            let mut out = Vec::new();
            let mut at = buf + 1;
            loop {
                let b = self.read_byte(at);
                if b == 0 {
                    break;
                }
                out.push(b);
                at += 1;
            }
            (out, 1)
        } else {
            let len = self.read_byte(buf + 1) as u32;
            let out = (0..len).map(|i| self.read_byte(buf + 2 + i)).collect();
            (out, 2)
        }
    }

    /// Split the text buffer into tokens and fill the parse buffer with
    /// (dictionary address, length, offset) triples. Unknown words store
    /// address 0, unless `keep_unknown` asks to leave their entries alone
    /// (the `tokenise` opcode's flag).
    pub fn tokenise_input(
        &mut self,
        text_buf: u32,
        parse_buf: u32,
        dict: u32,
        keep_unknown: bool,
    ) -> Result<(), String> {
        let (content, text_start) = self.read_text_buffer(text_buf);
        let separators = self.dictionary_separators(dict);
        let max_tokens = self.read_byte(parse_buf) as usize;

        // Split into (offset, word) pairs; separators are tokens themselves
        let mut tokens: Vec<(u32, Vec<u8>)> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut word_start = 0u32;
        for (i, &b) in content.iter().enumerate() {
            let offset = text_start + i as u32;
            if b == b' ' {
                if !current.is_empty() {
                    tokens.push((word_start, std::mem::take(&mut current)));
                }
            } else if separators.contains(&b) {
                if !current.is_empty() {
                    tokens.push((word_start, std::mem::take(&mut current)));
                }
                tokens.push((offset, vec![b]));
            } else {
                if current.is_empty() {
                    word_start = offset;
                }
                current.push(b);
            }
        }
        if !current.is_empty() {
            tokens.push((word_start, current));
        }

        tokens.truncate(max_tokens);
        self.write_byte(parse_buf + 1, tokens.len() as u8)
            .map_err(|e| e.message().to_string())?;

        for (i, (offset, word)) in tokens.iter().enumerate() {
            let entry = parse_buf + 2 + 4 * i as u32;
            let addr = self.lookup_word(dict, word);
            debug!(
                "token {:?} at offset {} -> {:04x}",
                String::from_utf8_lossy(word),
                offset,
                addr
            );
            if addr == 0 && keep_unknown {
                continue;
            }
            self.write_word(entry, addr as u16)
                .map_err(|e| e.message().to_string())?;
            self.write_byte(entry + 2, word.len() as u8)
                .map_err(|e| e.message().to_string())?;
            self.write_byte(entry + 3, *offset as u8)
                .map_err(|e| e.message().to_string())?;
        }
        Ok(())
    }
}
