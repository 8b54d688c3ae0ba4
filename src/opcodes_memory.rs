//! Memory and table handlers: indexed loads and stores, table copies and
//! scans, and the stack push/pull pair.
//!
//! Table addresses are 16-bit machine arithmetic: base plus scaled index
//! wraps modulo 0x10000, exactly as the stories expect.

use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use log::debug;

impl Interpreter {
    pub fn op_loadw(
        &mut self,
        inst: &Instruction,
        table: u16,
        index: u16,
    ) -> Result<ExecutionResult, String> {
        let addr = table.wrapping_add(index.wrapping_mul(2));
        let value = self.vm.read_word(addr as u32);
        self.do_store(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_loadb(
        &mut self,
        inst: &Instruction,
        table: u16,
        index: u16,
    ) -> Result<ExecutionResult, String> {
        let addr = table.wrapping_add(index);
        let value = self.vm.read_byte(addr as u32) as u16;
        self.do_store(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_storew(
        &mut self,
        table: u16,
        index: u16,
        value: u16,
    ) -> Result<ExecutionResult, String> {
        let addr = table.wrapping_add(index.wrapping_mul(2));
        match self.vm.write_word(addr as u32, value) {
            Ok(()) => Ok(ExecutionResult::Continue),
            Err(e) => Err(self.fatal_error(e)),
        }
    }

    pub fn op_storeb(
        &mut self,
        table: u16,
        index: u16,
        value: u16,
    ) -> Result<ExecutionResult, String> {
        let addr = table.wrapping_add(index);
        match self.vm.write_byte(addr as u32, value as u8) {
            Ok(()) => Ok(ExecutionResult::Continue),
            Err(e) => Err(self.fatal_error(e)),
        }
    }

    /// pull: pop into a variable, replacing (not pushing) when the target
    /// is the stack itself. V6 stores instead.
    pub fn op_pull(&mut self, inst: &Instruction, var: u16) -> Result<ExecutionResult, String> {
        let value = self.vm.pop().map_err(|e| self.fatal_error(e))?;
        if self.vm.game.header.version == 6 {
            self.do_store(inst, value)?;
        } else {
            self.vm.write_variable_in_place(var as u8, value)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// scan_table: search for a value. The form byte's high bit selects
    /// word entries, its low bits give the entry stride.
    pub fn op_scan_table(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let target = operands.first().copied().unwrap_or(0);
        let table = operands.get(1).copied().unwrap_or(0);
        let length = operands.get(2).copied().unwrap_or(0);
        let form = operands.get(3).copied().unwrap_or(0x82) as u8;
        let words = form & 0x80 != 0;
        let stride = (form & 0x7f) as u16;

        let mut addr = table;
        for _ in 0..length {
            let found = if words {
                self.vm.read_word(addr as u32) == target
            } else {
                self.vm.read_byte(addr as u32) as u16 == target
            };
            if found {
                self.do_store(inst, addr)?;
                return self.do_branch(inst, true);
            }
            addr = addr.wrapping_add(stride);
        }
        self.do_store(inst, 0)?;
        self.do_branch(inst, false)
    }

    /// copy_table: clear when the destination is 0; copy backward when
    /// the regions overlap destructively, unless a negative size forces a
    /// forward pass.
    pub fn op_copy_table(&mut self, operands: &[u16]) -> Result<ExecutionResult, String> {
        let first = operands.first().copied().unwrap_or(0);
        let second = operands.get(1).copied().unwrap_or(0);
        let size = operands.get(2).copied().unwrap_or(0) as i16;
        let count = size.unsigned_abs();

        if second == 0 {
            for i in 0..count {
                let addr = first.wrapping_add(i) as u32;
                self.vm.write_byte(addr, 0).map_err(|e| self.fatal_error(e))?;
            }
            return Ok(ExecutionResult::Continue);
        }

        debug!(
            "copy_table {:04x} -> {:04x} ({} bytes)",
            first, second, size
        );
        if size < 0 || first > second {
            for i in 0..count {
                let value = self.vm.read_byte(first.wrapping_add(i) as u32);
                self.vm
                    .write_byte(second.wrapping_add(i) as u32, value)
                    .map_err(|e| self.fatal_error(e))?;
            }
        } else {
            for i in (0..count).rev() {
                let value = self.vm.read_byte(first.wrapping_add(i) as u32);
                self.vm
                    .write_byte(second.wrapping_add(i) as u32, value)
                    .map_err(|e| self.fatal_error(e))?;
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// get_cursor: write (row, column) into a word table.
    pub fn op_get_cursor(&mut self, table: u16) -> Result<ExecutionResult, String> {
        // The capture presenter keeps no real cursor for the lower
        // window; report the top-left like a freshly cleared screen.
        self.vm
            .write_word(table as u32, 1)
            .and_then(|_| self.vm.write_word(table as u32 + 2, 1))
            .map_err(|e| self.fatal_error(e))?;
        Ok(ExecutionResult::Continue)
    }
}
