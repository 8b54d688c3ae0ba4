//! IFF (Interchange File Format) container handling for Quetzal buffers.

/// An IFF FORM with its chunks.
pub struct IffForm {
    /// Form type - "IFZS" for Quetzal
    pub form_type: [u8; 4],
    pub chunks: Vec<IffChunk>,
}

/// Individual chunk inside a FORM.
pub struct IffChunk {
    pub chunk_type: [u8; 4],
    pub data: Vec<u8>,
}

impl IffForm {
    /// Create an empty Quetzal form.
    pub fn new() -> Self {
        IffForm {
            form_type: *b"IFZS",
            chunks: Vec::new(),
        }
    }

    pub fn add_chunk(&mut self, chunk_type: [u8; 4], data: Vec<u8>) {
        self.chunks.push(IffChunk { chunk_type, data });
    }

    pub fn find_chunk(&self, chunk_type: &[u8; 4]) -> Option<&IffChunk> {
        self.chunks.iter().find(|c| &c.chunk_type == chunk_type)
    }

    /// Serialise: FORM header, big-endian length, form type, then each
    /// chunk padded to even length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_size = 4 + self
            .chunks
            .iter()
            .map(|c| 8 + c.data.len() + c.data.len() % 2)
            .sum::<usize>();

        let mut out = Vec::with_capacity(8 + body_size);
        out.extend_from_slice(b"FORM");
        out.extend_from_slice(&(body_size as u32).to_be_bytes());
        out.extend_from_slice(&self.form_type);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.chunk_type);
            out.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
            out.extend_from_slice(&chunk.data);
            if chunk.data.len() % 2 == 1 {
                out.push(0);
            }
        }
        out
    }

    /// Parse a FORM from a byte buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        if data.len() < 12 {
            return Err("Buffer too small for an IFF form".to_string());
        }
        if &data[0..4] != b"FORM" {
            return Err("Not an IFF form (missing FORM header)".to_string());
        }
        let declared = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let end = (8 + declared).min(data.len());

        let mut form_type = [0u8; 4];
        form_type.copy_from_slice(&data[8..12]);

        let mut form = IffForm {
            form_type,
            chunks: Vec::new(),
        };

        let mut at = 12;
        while at + 8 <= end {
            let mut chunk_type = [0u8; 4];
            chunk_type.copy_from_slice(&data[at..at + 4]);
            let size =
                u32::from_be_bytes([data[at + 4], data[at + 5], data[at + 6], data[at + 7]])
                    as usize;
            at += 8;
            if at + size > end {
                return Err(format!(
                    "Chunk {} runs past the end of the form",
                    String::from_utf8_lossy(&chunk_type)
                ));
            }
            form.chunks.push(IffChunk {
                chunk_type,
                data: data[at..at + size].to_vec(),
            });
            at += size + size % 2;
        }

        Ok(form)
    }
}

impl Default for IffForm {
    fn default() -> Self {
        IffForm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_odd_chunk() {
        let mut form = IffForm::new();
        form.add_chunk(*b"IFhd", vec![1, 2, 3, 4, 5]); // odd length
        form.add_chunk(*b"CMem", vec![9, 8]);
        let bytes = form.to_bytes();
        assert_eq!(bytes.len() % 2, 0);

        let parsed = IffForm::from_bytes(&bytes).unwrap();
        assert_eq!(&parsed.form_type, b"IFZS");
        assert_eq!(parsed.chunks.len(), 2);
        assert_eq!(parsed.find_chunk(b"IFhd").unwrap().data, vec![1, 2, 3, 4, 5]);
        assert_eq!(parsed.find_chunk(b"CMem").unwrap().data, vec![9, 8]);
        assert!(parsed.find_chunk(b"Stks").is_none());
    }

    #[test]
    fn rejects_non_iff_data() {
        assert!(IffForm::from_bytes(b"MROF0000IFZS").is_err());
        assert!(IffForm::from_bytes(b"FO").is_err());
    }
}
