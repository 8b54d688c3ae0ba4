//! Core Z-machine state: the loaded story image, program counter,
//! evaluation stack and call frames, plus the diff rings the host reads
//! back after each step.

use crate::err::ErrorCode;
use crate::header::{Header, H_FLAGS};
use log::debug;
use std::fmt;

/// Capacity of the evaluation stack, in words
pub const STACK_SIZE: usize = 1024;

/// Local-variable slots per call frame (the Standard allows 15)
pub const MAX_LOCALS: usize = 16;

/// Capacity of each diff ring
pub const DIFF_RING_SIZE: usize = 16;

/// How a routine was called, and therefore what happens to its result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallKind {
    /// Result stored into the given variable
    Store(u8),
    /// Result discarded (procedure call)
    Discard,
    /// Re-entrant call made by the interpreter itself (interrupt routines);
    /// the inner dispatch loop exits when this frame is popped
    Direct,
}

/// One activation record on the call stack.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Address of the instruction to resume at on return
    pub return_pc: u32,
    pub kind: CallKind,
    pub num_locals: u8,
    pub locals: [u16; MAX_LOCALS],
    /// Evaluation-stack depth when this routine was entered
    pub stack_base: usize,
    /// Arguments actually supplied (for check_arg_count and Quetzal)
    pub arg_count: u8,
}

/// A loaded story with owned memory. The pristine copy backs restart,
/// verify, and the XOR diffs used by undo and save files.
pub struct Game {
    pub memory: Vec<u8>,
    pub header: Header,
    pub original: Vec<u8>,
}

impl Game {
    /// Build a game from raw story bytes, growing the buffer to the
    /// header's declared file size if the on-disk image was truncated
    /// by padding rules.
    pub fn from_bytes(mut memory: Vec<u8>) -> Result<Self, String> {
        if memory.len() < 64 {
            return Err("Story file too small for header".to_string());
        }
        let header = Header::new(&memory)?;
        if memory.len() < header.file_size {
            memory.resize(header.file_size, 0);
        }
        let original = memory.clone();
        Ok(Game {
            memory,
            header,
            original,
        })
    }

    /// Checksum per the `verify` opcode: all bytes after the header, mod
    /// 0x10000, computed over the pristine image.
    pub fn compute_checksum(&self) -> u16 {
        let end = self.header.file_size.min(self.original.len());
        self.original[0x40..end]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
    }
}

/// World-state changes recorded while a step runs. Each ring holds at
/// most sixteen entries; later changes in the same step are dropped.
#[derive(Debug, Default, Clone)]
pub struct DiffRings {
    /// (object, destination) per insert_obj
    pub moves: Vec<(u16, u16)>,
    /// (object, attribute) per set_attr
    pub attr_sets: Vec<(u16, u16)>,
    /// (object, attribute) per clear_attr
    pub attr_clears: Vec<(u16, u16)>,
}

impl DiffRings {
    pub fn clear(&mut self) {
        self.moves.clear();
        self.attr_sets.clear();
        self.attr_clears.clear();
    }

    pub fn record_move(&mut self, obj: u16, dest: u16) {
        if self.moves.len() < DIFF_RING_SIZE {
            self.moves.push((obj, dest));
        }
    }

    pub fn record_attr_set(&mut self, obj: u16, attr: u16) {
        if self.attr_sets.len() < DIFF_RING_SIZE {
            self.attr_sets.push((obj, attr));
        }
    }

    pub fn record_attr_clear(&mut self, obj: u16, attr: u16) {
        if self.attr_clears.len() < DIFF_RING_SIZE {
            self.attr_clears.push((obj, attr));
        }
    }
}

/// The virtual machine registers and stacks.
pub struct VM {
    pub game: Game,
    pub pc: u32,
    pub stack: Vec<u16>,
    pub call_stack: Vec<CallFrame>,
    globals_addr: u16,
    /// Operands of the most recent instruction, exposed for introspection
    pub last_operands: [u16; 8],
    pub diffs: DiffRings,
    /// Set when a write toggled the scripting bit in Flags 2; the
    /// interpreter opens or closes the transcript and clears this.
    pub scripting_toggled: Option<bool>,
}

impl VM {
    pub fn new(game: Game) -> Self {
        let initial_pc = game.header.start_pc as u32;
        let globals_addr = game.header.globals;

        let mut vm = VM {
            game,
            pc: initial_pc,
            stack: Vec::with_capacity(STACK_SIZE),
            call_stack: Vec::new(),
            globals_addr,
            last_operands: [0; 8],
            diffs: DiffRings::default(),
            scripting_toggled: None,
        };
        vm.restart();
        vm
    }

    fn push_initial_frame(&mut self) {
        // V1-5 and V7-8 begin executing at start_pc with an implicit frame;
        // V6 calls a main routine instead.
        if self.game.header.version != 6 {
            self.call_stack.push(CallFrame {
                return_pc: 0,
                kind: CallKind::Discard,
                num_locals: 0,
                locals: [0; MAX_LOCALS],
                stack_base: 0,
                arg_count: 0,
            });
        }
    }

    /// Rewind to the initial state, re-reading dynamic memory from the
    /// pristine image. Code above the dynamic boundary never changes so
    /// only the writable region is copied back.
    pub fn restart(&mut self) {
        let dynamic = self.game.header.dynamic_size as usize;
        let (mem, orig) = (&mut self.game.memory, &self.game.original);
        mem[..dynamic].copy_from_slice(&orig[..dynamic]);
        self.stack.clear();
        self.call_stack.clear();
        self.pc = self.game.header.start_pc as u32;
        self.scripting_toggled = None;
        self.push_initial_frame();
        if self.game.header.version == 6 {
            // start_pc holds a packed routine address in V6
            let addr = self.unpack_routine(self.game.header.start_pc);
            self.pc = addr + 1; // skip the locals count of main
        }
    }

    pub fn frame_count(&self) -> usize {
        self.call_stack.len()
    }

    // ---- packed addresses ----

    /// Unpack a routine address per the version rule.
    pub fn unpack_routine(&self, packed: u16) -> u32 {
        let h = &self.game.header;
        match h.version {
            1..=3 => packed as u32 * 2,
            4..=5 => packed as u32 * 4,
            6..=7 => packed as u32 * 4 + h.functions_offset as u32 * 8,
            _ => packed as u32 * 8,
        }
    }

    /// Unpack a string address per the version rule.
    pub fn unpack_string(&self, packed: u16) -> u32 {
        let h = &self.game.header;
        match h.version {
            1..=3 => packed as u32 * 2,
            4..=5 => packed as u32 * 4,
            6..=7 => packed as u32 * 4 + h.strings_offset as u32 * 8,
            _ => packed as u32 * 8,
        }
    }

    // ---- memory access ----

    pub fn read_byte(&self, addr: u32) -> u8 {
        *self.game.memory.get(addr as usize).unwrap_or(&0)
    }

    pub fn read_word(&self, addr: u32) -> u16 {
        let high = self.read_byte(addr) as u16;
        let low = self.read_byte(addr + 1) as u16;
        (high << 8) | low
    }

    /// Write a byte, enforcing the dynamic-memory boundary. The Flags 2
    /// low byte is special-cased: the guest may only toggle the scripting
    /// and fixed-font bits there.
    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), ErrorCode> {
        if addr >= self.game.header.dynamic_size as u32 {
            debug!(
                "write_byte outside dynamic memory: {:05x} (limit {:04x})",
                addr, self.game.header.dynamic_size
            );
            return Err(ErrorCode::StoreRange);
        }
        if addr as usize == H_FLAGS + 1 {
            let old = self.game.memory[H_FLAGS + 1];
            let masked = (old & !0x03) | (value & 0x03);
            self.game.memory[H_FLAGS + 1] = masked;
            if (old ^ masked) & 0x01 != 0 {
                self.scripting_toggled = Some(masked & 0x01 != 0);
            }
            return Ok(());
        }
        self.game.memory[addr as usize] = value;
        Ok(())
    }

    pub fn write_word(&mut self, addr: u32, value: u16) -> Result<(), ErrorCode> {
        self.write_byte(addr, (value >> 8) as u8)?;
        self.write_byte(addr + 1, (value & 0xff) as u8)
    }

    // ---- evaluation stack ----

    pub fn push(&mut self, value: u16) -> Result<(), ErrorCode> {
        if self.stack.len() >= STACK_SIZE {
            return Err(ErrorCode::StkOvf);
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, ErrorCode> {
        // A routine may not pop past its own frame base.
        let base = self.call_stack.last().map(|f| f.stack_base).unwrap_or(0);
        if self.stack.len() <= base {
            return Err(ErrorCode::StkUndf);
        }
        Ok(self.stack.pop().unwrap())
    }

    pub fn peek(&self) -> Result<u16, ErrorCode> {
        self.stack.last().copied().ok_or(ErrorCode::StkUndf)
    }

    // ---- variables ----

    /// Read a variable (0 = pop the stack, 1..15 = local, 16.. = global).
    pub fn read_variable(&mut self, var: u8) -> Result<u16, String> {
        match var {
            0x00 => self.pop().map_err(|e| e.message().to_string()),
            0x01..=0x0f => {
                let frame = self
                    .call_stack
                    .last()
                    .ok_or("Local variable access outside any routine")?;
                let index = (var - 1) as usize;
                if index >= frame.num_locals as usize {
                    debug!(
                        "reading local {} but routine has {} locals",
                        var, frame.num_locals
                    );
                    return Ok(0);
                }
                Ok(frame.locals[index])
            }
            _ => Ok(self.read_global(var)),
        }
    }

    /// Read a variable without the pop side effect (used by `load`).
    pub fn read_variable_in_place(&mut self, var: u8) -> Result<u16, String> {
        if var == 0 {
            self.peek().map_err(|e| e.message().to_string())
        } else {
            self.read_variable(var)
        }
    }

    /// Write a variable (0 = push, 1..15 = local, 16.. = global).
    pub fn write_variable(&mut self, var: u8, value: u16) -> Result<(), String> {
        match var {
            0x00 => self.push(value).map_err(|e| e.message().to_string()),
            0x01..=0x0f => {
                let frame = self
                    .call_stack
                    .last_mut()
                    .ok_or("Local variable access outside any routine")?;
                let index = (var - 1) as usize;
                if index >= frame.num_locals as usize {
                    debug!(
                        "writing local {} but routine has {} locals",
                        var, frame.num_locals
                    );
                    return Ok(());
                }
                frame.locals[index] = value;
                Ok(())
            }
            _ => {
                self.write_global(var, value);
                Ok(())
            }
        }
    }

    /// Overwrite a variable without the push side effect (used by `store`
    /// and `pull`, which replace the stack top rather than pushing).
    pub fn write_variable_in_place(&mut self, var: u8, value: u16) -> Result<(), String> {
        if var == 0 {
            match self.stack.last_mut() {
                Some(top) => {
                    *top = value;
                    Ok(())
                }
                None => Err(ErrorCode::StkUndf.message().to_string()),
            }
        } else {
            self.write_variable(var, value)
        }
    }

    fn read_global(&self, var: u8) -> u16 {
        let addr = self.globals_addr as u32 + 2 * (var as u32 - 16);
        self.read_word(addr)
    }

    fn write_global(&mut self, var: u8, value: u16) {
        let addr = self.globals_addr as u32 + 2 * (var as u32 - 16);
        // Globals live in dynamic memory by construction; a story whose
        // globals table strays outside it is already corrupt.
        let _ = self.write_word(addr, value);
    }
}

impl fmt::Display for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VM state:")?;
        writeln!(f, "  PC: {:05x}", self.pc)?;
        writeln!(f, "  Stack depth: {}", self.stack.len())?;
        writeln!(f, "  Call depth: {}", self.call_stack.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StoryBuilder;

    fn test_vm() -> VM {
        let story = StoryBuilder::new(3).build();
        VM::new(Game::from_bytes(story).unwrap())
    }

    #[test]
    fn stack_push_pop_peek() {
        let mut vm = test_vm();
        vm.push(0x1234).unwrap();
        assert_eq!(vm.peek().unwrap(), 0x1234);
        assert_eq!(vm.pop().unwrap(), 0x1234);
        assert_eq!(vm.pop(), Err(ErrorCode::StkUndf));
    }

    #[test]
    fn stack_overflow_detected() {
        let mut vm = test_vm();
        for i in 0..STACK_SIZE {
            vm.push(i as u16).unwrap();
        }
        assert_eq!(vm.push(0), Err(ErrorCode::StkOvf));
    }

    #[test]
    fn dynamic_boundary_enforced() {
        let mut vm = test_vm();
        let limit = vm.game.header.dynamic_size as u32;
        assert!(vm.write_byte(limit - 1, 0xab).is_ok());
        assert_eq!(vm.write_byte(limit, 0xab), Err(ErrorCode::StoreRange));
        assert_eq!(vm.read_byte(limit - 1), 0xab);
    }

    #[test]
    fn flags2_low_byte_is_masked() {
        let mut vm = test_vm();
        vm.write_byte(H_FLAGS as u32 + 1, 0xff).unwrap();
        // Only the scripting and fixed-font bits may change.
        assert_eq!(vm.read_byte(H_FLAGS as u32 + 1) & 0xfc, 0);
        assert_eq!(vm.scripting_toggled, Some(true));
    }

    #[test]
    fn globals_round_trip() {
        let mut vm = test_vm();
        vm.write_variable(0x10, 0xbeef).unwrap();
        assert_eq!(vm.read_variable(0x10).unwrap(), 0xbeef);
    }

    #[test]
    fn variable_zero_pushes_and_pops() {
        let mut vm = test_vm();
        vm.write_variable(0, 7).unwrap();
        vm.write_variable(0, 8).unwrap();
        assert_eq!(vm.stack.len(), 1 + 1);
        assert_eq!(vm.read_variable(0).unwrap(), 8);
        assert_eq!(vm.read_variable(0).unwrap(), 7);
    }

    #[test]
    fn restart_rewinds_dynamic_memory() {
        let mut vm = test_vm();
        vm.write_byte(0x100, 0x55).unwrap();
        vm.push(1).unwrap();
        vm.restart();
        assert_eq!(vm.read_byte(0x100), vm.game.original[0x100]);
        assert!(vm.stack.is_empty());
        assert_eq!(vm.pc, vm.game.header.start_pc as u32);
    }

    #[test]
    fn packed_addresses_by_version() {
        let vm = test_vm();
        assert_eq!(vm.unpack_routine(0x1000), 0x2000);
        let story5 = StoryBuilder::new(5).build();
        let vm5 = VM::new(Game::from_bytes(story5).unwrap());
        assert_eq!(vm5.unpack_routine(0x1000), 0x4000);
        let story8 = StoryBuilder::new(8).build();
        let vm8 = VM::new(Game::from_bytes(story8).unwrap());
        assert_eq!(vm8.unpack_routine(0x1000), 0x8000);
    }
}
