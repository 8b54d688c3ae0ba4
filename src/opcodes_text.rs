//! Text-manipulation handlers that work on guest buffers: tokenise,
//! encode_text and print_table. The print family proper lives with the
//! output routing in `interpreter.rs`.

use crate::interpreter::{ExecutionResult, Interpreter};
use crate::text;

impl Interpreter {
    /// tokenise: split a text buffer against a dictionary (the main one
    /// unless another is given). A set flag keeps unknown words' parse
    /// entries untouched.
    pub fn op_tokenise(&mut self, operands: &[u16]) -> Result<ExecutionResult, String> {
        let text_buf = operands.first().copied().unwrap_or(0) as u32;
        let parse_buf = operands.get(1).copied().unwrap_or(0) as u32;
        let dict = match operands.get(2).copied().unwrap_or(0) {
            0 => self.vm.game.header.dictionary as u32,
            other => other as u32,
        };
        let keep_unknown = operands.get(3).copied().unwrap_or(0) != 0;
        self.vm
            .tokenise_input(text_buf, parse_buf, dict, keep_unknown)?;
        Ok(ExecutionResult::Continue)
    }

    /// encode_text: encode `length` bytes of ZSCII at text+from into
    /// dictionary form at `coded`.
    pub fn op_encode_text(&mut self, operands: &[u16]) -> Result<ExecutionResult, String> {
        let text_addr = operands.first().copied().unwrap_or(0) as u32;
        let length = operands.get(1).copied().unwrap_or(0) as u32;
        let from = operands.get(2).copied().unwrap_or(0) as u32;
        let coded = operands.get(3).copied().unwrap_or(0) as u32;

        let raw: Vec<u8> = (0..length)
            .map(|i| self.vm.read_byte(text_addr + from + i))
            .collect();
        let words = text::encode_word(&self.vm.game.memory, &self.vm.game.header, &raw);
        for (i, word) in words.iter().enumerate() {
            self.vm
                .write_word(coded + 2 * i as u32, *word)
                .map_err(|e| self.fatal_error(e))?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// print_table: rows of ZSCII characters, each on its own line, with
    /// `skip` bytes between rows.
    pub fn op_print_table(&mut self, operands: &[u16]) -> Result<ExecutionResult, String> {
        let table = operands.first().copied().unwrap_or(0) as u32;
        let width = operands.get(1).copied().unwrap_or(0) as u32;
        let height = operands.get(2).copied().unwrap_or(1) as u32;
        let skip = operands.get(3).copied().unwrap_or(0) as u32;

        let mut at = table;
        for row in 0..height {
            if row > 0 {
                self.emit_newline();
            }
            for i in 0..width {
                let c = self.vm.read_byte(at + i) as u16;
                self.print_zscii(c)?;
            }
            at += width + skip;
        }
        Ok(ExecutionResult::Continue)
    }
}
