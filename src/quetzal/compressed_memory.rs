//! XOR run-length coding for CMem chunks.
//!
//! Current dynamic memory is XORed against the pristine story image; a
//! zero byte introduces a run ("skip n+1 unchanged bytes"), anything else
//! patches one byte. Runs longer than 256 chain additional 0x00 0xff
//! pairs. The undo ring reuses the same coding in RAM.

use log::debug;

/// Compress `current` against `original`. Both slices cover the same
/// dynamic-memory range.
pub fn compress_memory(current: &[u8], original: &[u8]) -> Vec<u8> {
    assert_eq!(
        current.len(),
        original.len(),
        "diff operands must be the same length"
    );

    let mut out = Vec::new();
    let mut i = 0;
    while i < current.len() {
        let diff = current[i] ^ original[i];
        if diff == 0 {
            let start = i;
            while i < current.len() && current[i] ^ original[i] == 0 {
                i += 1;
            }
            let mut run = i - start;
            // Trailing unchanged bytes are implicit
            if i == current.len() {
                break;
            }
            while run > 256 {
                out.push(0);
                out.push(0xff);
                run -= 256;
            }
            out.push(0);
            out.push((run - 1) as u8);
        } else {
            out.push(diff);
            i += 1;
        }
    }

    debug!("compressed {} bytes to {}", current.len(), out.len());
    out
}

/// Apply a compressed diff to a copy of `original`.
pub fn decompress_memory(compressed: &[u8], original: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(original.len());
    let mut at = 0;

    while at < compressed.len() {
        let byte = compressed[at];
        at += 1;
        if byte == 0 {
            if at >= compressed.len() {
                return Err("Truncated run in compressed memory".to_string());
            }
            let run = compressed[at] as usize + 1;
            at += 1;
            if out.len() + run > original.len() {
                return Err("Compressed run extends past dynamic memory".to_string());
            }
            let start = out.len();
            out.extend_from_slice(&original[start..start + run]);
        } else {
            if out.len() >= original.len() {
                return Err("Compressed data extends past dynamic memory".to_string());
            }
            out.push(original[out.len()] ^ byte);
        }
    }

    // Anything past the encoded prefix is unchanged
    let start = out.len();
    out.extend_from_slice(&original[start..]);
    Ok(out)
}
