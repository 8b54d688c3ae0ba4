//! Input, screen and snapshot opcodes: read/read_char with their timeout
//! interrupts, the status line, output stream selection, and the four
//! save/restore entry points (file-shaped and undo).

use crate::err::ErrorCode;
use crate::header::H_FLAGS;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::quetzal;
use crate::screen_trait::ZC_TIME_OUT;
use crate::text;
use log::debug;

impl Interpreter {
    /// sread/aread: read one input line into the text buffer, echo it,
    /// and tokenise into the parse buffer.
    pub fn op_read(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let text_buf = operands.first().copied().unwrap_or(0) as u32;
        let parse_buf = operands.get(1).copied().unwrap_or(0) as u32;
        let timeout = operands.get(2).copied().unwrap_or(0);
        let routine = operands.get(3).copied().unwrap_or(0);
        let version = self.vm.game.header.version;

        if version <= 3 {
            self.op_show_status()?;
        }
        self.flush_word_buffer();

        let max = {
            let declared = self.vm.read_byte(text_buf) as usize;
            if version <= 4 {
                declared.saturating_sub(1)
            } else {
                declared
            }
        };

        let (line, terminator) = loop {
            let (line, term) = self.screen.read_line(max, "", timeout);
            if term == ZC_TIME_OUT && routine != 0 {
                // The timeout routine decides whether input continues
                if self.direct_call(routine, &[])? != 0 {
                    break (String::new(), ZC_TIME_OUT);
                }
                continue;
            }
            break (line, term);
        };

        let line = line.to_lowercase();
        debug!("read: {:?} (terminator {})", line, terminator);
        self.streams.record_input(&line);

        // Echo the line into the output streams; the step observation
        // starts with it, like any screen would show.
        self.print_host_string(&line);
        self.emit_newline();

        let zscii: Vec<u8> = line
            .chars()
            .map(|ch| text::unicode_to_zscii(&self.vm.game.memory, &self.vm.game.header, ch))
            .take(max)
            .collect();

        if version <= 4 {
            for (i, &b) in zscii.iter().enumerate() {
                self.vm
                    .write_byte(text_buf + 1 + i as u32, b)
                    .map_err(|e| self.fatal_error(e))?;
            }
            self.vm
                .write_byte(text_buf + 1 + zscii.len() as u32, 0)
                .map_err(|e| self.fatal_error(e))?;
        } else {
            self.vm
                .write_byte(text_buf + 1, zscii.len() as u8)
                .map_err(|e| self.fatal_error(e))?;
            for (i, &b) in zscii.iter().enumerate() {
                self.vm
                    .write_byte(text_buf + 2 + i as u32, b)
                    .map_err(|e| self.fatal_error(e))?;
            }
        }

        if parse_buf != 0 {
            let dict = self.vm.game.header.dictionary as u32;
            self.vm.tokenise_input(text_buf, parse_buf, dict, false)?;
        }

        if version >= 5 {
            self.do_store(inst, terminator as u16)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// read_char: one keystroke, with the same timeout discipline.
    pub fn op_read_char(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let timeout = operands.get(1).copied().unwrap_or(0);
        let routine = operands.get(2).copied().unwrap_or(0);
        self.flush_word_buffer();

        let key = loop {
            let key = self.screen.read_key(timeout);
            if key == ZC_TIME_OUT && routine != 0 {
                if self.direct_call(routine, &[])? != 0 {
                    break ZC_TIME_OUT;
                }
                continue;
            }
            break key;
        };
        self.do_store(inst, key as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// V3 status line: location object's name, score and move count from
    /// the first three globals.
    pub fn op_show_status(&mut self) -> Result<ExecutionResult, String> {
        if self.vm.game.header.version > 3 {
            return Ok(ExecutionResult::Continue);
        }
        let location = self.vm.read_variable(0x10)?;
        let name = if location != 0 {
            self.vm.object_name(location).unwrap_or_default()
        } else {
            String::new()
        };
        let score = self.vm.read_variable(0x11)? as i16;
        let moves = self.vm.read_variable(0x12)?;
        self.screen.show_status(&name, score, moves);
        Ok(ExecutionResult::Continue)
    }

    /// output_stream: positive selects, negative deselects; stream 3
    /// carries its redirection table.
    pub fn op_output_stream(
        &mut self,
        number: i16,
        table: Option<u16>,
    ) -> Result<ExecutionResult, String> {
        self.flush_word_buffer();
        match number {
            0 => {}
            1 => self.streams.screen = true,
            -1 => self.streams.screen = false,
            2 => {
                self.streams.transcript = true;
                let flags = self.vm.game.memory[H_FLAGS + 1] | 0x01;
                self.vm.game.memory[H_FLAGS + 1] = flags;
            }
            -2 => {
                self.streams.transcript = false;
                let flags = self.vm.game.memory[H_FLAGS + 1] & !0x01;
                self.vm.game.memory[H_FLAGS + 1] = flags;
            }
            3 => {
                let table = table.unwrap_or(0) as u32;
                if let Err(e) = self.streams.stream3_open(table) {
                    return Err(self.fatal_error(e));
                }
            }
            -3 => {
                if let Err(e) = self.streams.stream3_close(&mut self.vm) {
                    return Err(self.fatal_error(e));
                }
            }
            4 => self.streams.record = true,
            -4 => self.streams.record = false,
            _ => debug!("output_stream: unknown stream {}", number),
        }
        Ok(ExecutionResult::Continue)
    }

    /// sound_effect: bleeps and samples are presenter territory; the
    /// core just acknowledges the request.
    pub fn op_sound_effect(&mut self, operands: &[u16]) -> Result<ExecutionResult, String> {
        debug!("sound_effect {:?}", operands);
        Ok(ExecutionResult::Continue)
    }

    // ---- guest-initiated save and restore ----

    /// save: V1-3 branch on success, V4+ store 1. The snapshot is written
    /// as if the restore already delivered its result, so restoring lands
    /// cleanly after this instruction.
    pub fn op_save(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        if self.in_interrupt() {
            return Err(self.fatal_error(ErrorCode::SaveInInter));
        }
        if self.vm.game.header.version <= 3 {
            let here = self.vm.pc;
            if let Some(b) = inst.branch.as_ref() {
                if b.on_true && b.offset >= 2 {
                    self.vm.pc = (here as i64 + b.offset as i64 - 2) as u32;
                }
            }
            let data = quetzal::save_to_bytes(&self.vm);
            self.vm.pc = here;
            let ok = self.screen.request_save(&data);
            self.do_branch(inst, ok)
        } else {
            self.do_store(inst, 2)?;
            let data = quetzal::save_to_bytes(&self.vm);
            let ok = self.screen.request_save(&data);
            if let Some(var) = inst.store_var {
                self.vm
                    .write_variable_in_place(var, if ok { 1 } else { 0 })?;
            }
            Ok(ExecutionResult::Continue)
        }
    }

    /// restore: on success the machine continues from the snapshot; on
    /// failure the guest is told in its own text stream and play goes on.
    pub fn op_restore(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        let data = self.screen.request_restore();
        let outcome = match data {
            Some(bytes) => quetzal::restore_from_bytes(&mut self.vm, &bytes),
            None => Err("No saved game to restore".to_string()),
        };
        match outcome {
            Ok(()) => {
                self.restore_header();
                Ok(ExecutionResult::Branched)
            }
            Err(reason) => {
                debug!("restore failed: {reason}");
                self.print_host_string("Error reading save file!");
                self.emit_newline();
                if self.vm.game.header.version <= 3 {
                    self.do_branch(inst, false)
                } else {
                    self.do_store(inst, 0)?;
                    Ok(ExecutionResult::Continue)
                }
            }
        }
    }

    /// save_undo: push onto the ring, with the same pre-stored result
    /// trick as `save`. Stores -1 when undo is disabled.
    pub fn op_save_undo(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        if !self.undo.is_enabled() {
            self.do_store(inst, 0xffff)?;
            return Ok(ExecutionResult::Continue);
        }
        if self.in_interrupt() {
            return Err(self.fatal_error(ErrorCode::SaveInInter));
        }
        self.do_store(inst, 2)?;
        self.undo.push(&self.vm);
        if let Some(var) = inst.store_var {
            self.vm.write_variable_in_place(var, 1)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// restore_undo: pop the newest ring entry; its snapshot already
    /// carries the 2 the resumed save_undo reports.
    pub fn op_restore_undo(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        if self.undo.pop(&mut self.vm)? {
            self.restore_header();
            Ok(ExecutionResult::Branched)
        } else {
            self.do_store(inst, 0)?;
            Ok(ExecutionResult::Continue)
        }
    }
}
