//! The dispatcher: fetch, decode, execute, and the call/return and branch
//! discipline. Opcode handlers live in the `opcodes_*` modules; this file
//! owns the machinery they share — operand resolution, stores, branches,
//! the output routing with word wrap, and the run-until-input loop the
//! driver suspends on.

use crate::buffer::{BufferEvent, WordBuffer};
use crate::err::{ErrorAction, ErrorCode, ErrorLog, ReportMode};
use crate::instruction::{Instruction, OperandCount, OperandType};
use crate::screen_trait::{RestartStage, Screen};
use crate::story_id::StoryId;
use crate::streams::OutputStreams;
use crate::text;
use crate::undo::UndoRing;
use crate::vm::{CallKind, CallFrame, VM, MAX_LOCALS};
use crate::zrand::ZRand;
use log::{debug, trace};

/// Raw opcode bytes the run loop treats as input boundaries
pub const OPCODE_READ: u8 = 0xe4;
pub const OPCODE_READ_CHAR: u8 = 0xf6;

/// Deepest allowed call nesting
const MAX_CALL_DEPTH: usize = 1024;

/// Result of executing an instruction
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Continue with the next instruction
    Continue,
    /// Branch taken, PC already updated
    Branched,
    /// Routine called, PC updated
    Called,
    /// Routine returned with this value
    Returned(u16),
    /// The story executed quit
    Quit,
}

/// Why the run loop stopped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// Stopped at a read opcode with no queued input
    AwaitInput,
    /// The story quit (or restarted past its end)
    Finished,
}

/// The interpreter: machine state plus everything ambient around it.
pub struct Interpreter {
    pub vm: VM,
    pub rng: ZRand,
    pub screen: Box<dyn Screen>,
    pub streams: OutputStreams,
    pub errors: ErrorLog,
    pub undo: UndoRing,
    pub story_id: StoryId,
    wrap: WordBuffer,
    /// Word-wrap gate, toggled by buffer_mode
    buffering: bool,
    finished: bool,
    instruction_count: u64,
}

impl Interpreter {
    pub fn new(vm: VM, screen: Box<dyn Screen>) -> Self {
        let story_id = StoryId::identify(vm.game.header.release, &vm.game.header.serial);
        let undo = UndoRing::new(&vm, 20);
        let mut interp = Interpreter {
            vm,
            rng: ZRand::new_uniform(),
            screen,
            streams: OutputStreams::new(),
            errors: ErrorLog::new(ReportMode::default()),
            undo,
            story_id,
            wrap: WordBuffer::new(),
            buffering: true,
            finished: false,
            instruction_count: 0,
        };
        let (rows, cols) = (interp.screen.rows(), interp.screen.cols());
        interp
            .vm
            .game
            .header
            .write_capabilities(&mut interp.vm.game.memory, rows, cols);
        if interp.story_id.forces_graphics_flag() {
            // One release insists the graphics bit stays up
            interp.vm.game.memory[crate::header::H_FLAGS + 1] |= 0x08;
        }
        interp.vm.game.original[..64].copy_from_slice(&interp.vm.game.memory[..64]);
        interp
    }

    pub fn set_report_mode(&mut self, mode: ReportMode) {
        self.errors.mode = mode;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Run until the next read opcode would block for input, or the story
    /// ends. The PC is left pointing at the read instruction.
    pub fn run_until_input(&mut self) -> Result<StopReason, String> {
        loop {
            if self.finished {
                return Ok(StopReason::Finished);
            }
            let opcode = self.vm.read_byte(self.vm.pc);
            if (opcode == OPCODE_READ || opcode == OPCODE_READ_CHAR) && !self.has_queued_input() {
                return Ok(StopReason::AwaitInput);
            }
            match self.step_instruction()? {
                ExecutionResult::Quit => {
                    self.finished = true;
                    return Ok(StopReason::Finished);
                }
                _ => {}
            }
        }
    }

    fn has_queued_input(&self) -> bool {
        self.screen.has_pending_input()
    }

    /// Decode, advance, execute one instruction.
    pub fn step_instruction(&mut self) -> Result<ExecutionResult, String> {
        let pc = self.vm.pc;
        let inst = Instruction::decode(
            &self.vm.game.memory,
            pc as usize,
            self.vm.game.header.version,
        )?;
        trace!("{}", inst);
        self.vm.pc += inst.size as u32;
        self.instruction_count += 1;
        let result = self.execute_instruction(&inst);
        // A guest write may have toggled the scripting bit in Flags 2
        if let Some(on) = self.vm.scripting_toggled.take() {
            self.streams.transcript = on;
        }
        result
    }

    /// Resolve raw operands: variable references read their variable (a
    /// stack reference pops).
    pub fn resolve_operands(&mut self, inst: &Instruction) -> Result<Vec<u16>, String> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for (i, &raw) in inst.operands.iter().enumerate() {
            let value = match inst.operand_types[i] {
                OperandType::Variable => self.vm.read_variable(raw as u8)?,
                _ => raw,
            };
            values.push(value);
        }
        for (i, v) in values.iter().enumerate().take(8) {
            self.vm.last_operands[i] = *v;
        }
        Ok(values)
    }

    /// Write a store-opcode result.
    pub fn do_store(&mut self, inst: &Instruction, value: u16) -> Result<(), String> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    /// Take or skip a branch. Encoded offsets 0 and 1 return from the
    /// current routine with false/true instead of jumping.
    pub fn do_branch(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> Result<ExecutionResult, String> {
        let info = inst
            .branch
            .as_ref()
            .ok_or_else(|| format!("Opcode {:02x} missing branch bytes", inst.opcode))?;
        if condition != info.on_true {
            return Ok(ExecutionResult::Continue);
        }
        match info.offset {
            0 => self.return_from_routine(0),
            1 => self.return_from_routine(1),
            offset => {
                let target = self.vm.pc as i64 + offset as i64 - 2;
                if target < 0 || target as usize >= self.vm.game.memory.len() {
                    return Err(self.fatal_error(ErrorCode::IllJumpAddr));
                }
                self.vm.pc = target as u32;
                Ok(ExecutionResult::Branched)
            }
        }
    }

    // ---- calls and returns ----

    /// Call a packed routine address. Calling address 0 just yields false.
    pub fn call_routine(
        &mut self,
        packed: u16,
        args: &[u16],
        kind: CallKind,
    ) -> Result<ExecutionResult, String> {
        if packed == 0 {
            if let CallKind::Store(var) = kind {
                self.vm.write_variable(var, 0)?;
            }
            return Ok(ExecutionResult::Continue);
        }
        if self.vm.call_stack.len() >= MAX_CALL_DEPTH {
            return Err(self.fatal_error(ErrorCode::StkOvf));
        }

        let addr = self.vm.unpack_routine(packed);
        if addr as usize >= self.vm.game.memory.len() {
            return Err(self.fatal_error(ErrorCode::IllCallAddr));
        }
        let num_locals = self.vm.read_byte(addr);
        if num_locals > 15 {
            return Err(self.fatal_error(ErrorCode::CallNonRtn));
        }

        let mut locals = [0u16; MAX_LOCALS];
        let mut code_pc = addr + 1;
        if self.vm.game.header.version <= 4 {
            // Initial local values are inline in the routine header
            for local in locals.iter_mut().take(num_locals as usize) {
                *local = self.vm.read_word(code_pc);
                code_pc += 2;
            }
        }
        for (i, &arg) in args.iter().take(num_locals as usize).enumerate() {
            locals[i] = arg;
        }

        self.vm.call_stack.push(CallFrame {
            return_pc: self.vm.pc,
            kind,
            num_locals,
            locals,
            stack_base: self.vm.stack.len(),
            arg_count: args.len() as u8,
        });
        self.vm.pc = code_pc;
        debug!(
            "call {:05x} ({} locals, {} args), depth {}",
            addr,
            num_locals,
            args.len(),
            self.vm.call_stack.len()
        );
        Ok(ExecutionResult::Called)
    }

    /// Pop the current frame and deliver `value` per its call kind.
    pub fn return_from_routine(&mut self, value: u16) -> Result<ExecutionResult, String> {
        let frame = match self.vm.call_stack.pop() {
            Some(frame) => frame,
            None => return Err(self.fatal_error(ErrorCode::BadFrame)),
        };
        self.vm.stack.truncate(frame.stack_base);
        self.vm.pc = frame.return_pc;
        if let CallKind::Store(var) = frame.kind {
            self.vm.write_variable(var, value)?;
        }
        Ok(ExecutionResult::Returned(value))
    }

    /// Run a routine to completion from inside an instruction (interrupt
    /// routines, timed input). Returns the routine's value.
    pub fn direct_call(&mut self, packed: u16, args: &[u16]) -> Result<u16, String> {
        if packed == 0 {
            return Ok(0);
        }
        let depth = self.vm.call_stack.len();
        self.call_routine(packed, args, CallKind::Direct)?;
        loop {
            match self.step_instruction()? {
                ExecutionResult::Returned(value) if self.vm.call_stack.len() <= depth => {
                    return Ok(value);
                }
                ExecutionResult::Quit => {
                    self.finished = true;
                    return Ok(0);
                }
                _ => {}
            }
        }
    }

    /// Is an interrupt routine on the call stack?
    pub fn in_interrupt(&self) -> bool {
        self.vm
            .call_stack
            .iter()
            .any(|f| f.kind == CallKind::Direct)
    }

    /// Unwind to the frame `catch` recorded, then return from it.
    pub fn throw_to_frame(&mut self, value: u16, frame_id: u16) -> Result<ExecutionResult, String> {
        let target = frame_id as usize;
        if target == 0 || target > self.vm.call_stack.len() {
            return Err(self.fatal_error(ErrorCode::BadFrame));
        }
        while self.vm.call_stack.len() > target {
            let frame = self.vm.call_stack.pop().unwrap();
            self.vm.stack.truncate(frame.stack_base);
        }
        self.return_from_routine(value)
    }

    // ---- runtime errors ----

    /// Record a runtime error. Fatal codes (or fatal report mode) abort
    /// with Err; soft codes warn into the story's own streams.
    pub fn runtime_error(&mut self, code: ErrorCode) -> Result<(), String> {
        match self.errors.record(code, self.vm.pc) {
            ErrorAction::Fatal(message) => {
                self.flush_word_buffer();
                self.screen.fatal(message);
                Err(message.to_string())
            }
            ErrorAction::Warn { message } => {
                self.print_host_string(&message);
                self.emit_newline();
                Ok(())
            }
            ErrorAction::Continue => Ok(()),
        }
    }

    /// A fatal error as an Err value, for handlers that must stop.
    pub fn fatal_error(&mut self, code: ErrorCode) -> String {
        self.flush_word_buffer();
        self.screen.fatal(code.message());
        code.message().to_string()
    }

    // ---- output routing ----

    /// Route one ZSCII character through the active output streams.
    pub fn print_zscii(&mut self, c: u16) -> Result<(), String> {
        if c == text::ZC_RETURN {
            self.emit_newline();
            return Ok(());
        }
        if c == 0 {
            return Ok(());
        }
        if self.streams.stream3_active() {
            let byte = if c < 256 { c as u8 } else { b'?' };
            self.streams
                .stream3_char(&mut self.vm, byte)
                .map_err(|e| self.fatal_error(e))?;
            return Ok(());
        }
        if self.buffering {
            let event = match self.wrap.push(c) {
                Ok(event) => event,
                Err(e) => return Err(self.fatal_error(e)),
            };
            match event {
                BufferEvent::Held => {}
                BufferEvent::Boundary(run) => {
                    for rc in run {
                        self.emit_to_sinks(rc);
                    }
                    self.emit_to_sinks(c);
                }
                BufferEvent::Break(run) => {
                    for rc in run {
                        self.emit_to_sinks(rc);
                    }
                }
            }
        } else {
            self.emit_to_sinks(c);
        }
        Ok(())
    }

    /// Decode and print the Z-string at a byte address.
    pub fn print_zstring_at(&mut self, addr: usize) -> Result<(), String> {
        if addr >= self.vm.game.memory.len() {
            return Err(self.fatal_error(ErrorCode::IllPrintAddr));
        }
        let (zscii, _) = text::decode_zscii(
            &self.vm.game.memory,
            addr,
            &self.vm.game.header,
            true,
        )?;
        for c in zscii {
            self.print_zscii(c)?;
        }
        Ok(())
    }

    /// Print host-side text (warnings, messages) through the streams.
    pub fn print_host_string(&mut self, s: &str) {
        for ch in s.chars() {
            let c = if ch == '\n' {
                text::ZC_RETURN
            } else {
                text::unicode_to_zscii(&self.vm.game.memory, &self.vm.game.header, ch) as u16
            };
            let _ = self.print_zscii(c);
        }
    }

    /// Emit a newline to every active stream, flushing the word buffer.
    pub fn emit_newline(&mut self) {
        if self.streams.stream3_active() {
            let _ = self.streams.stream3_char(&mut self.vm, 13);
            return;
        }
        self.flush_word_buffer();
        if self.streams.screen {
            self.screen.display_char(b'\n' as u16);
        }
        if self.streams.transcript {
            self.streams.transcript_text.push('\n');
        }
    }

    /// Push staged word-wrap characters out to the sinks.
    pub fn flush_word_buffer(&mut self) {
        for c in self.wrap.take() {
            self.emit_to_sinks(c);
        }
    }

    fn emit_to_sinks(&mut self, c: u16) {
        let unicode =
            text::zscii_to_unicode(&self.vm.game.memory, &self.vm.game.header, c);
        if self.streams.screen {
            self.screen.display_char(unicode as u16);
        }
        if self.streams.transcript {
            self.streams.transcript_text.push(unicode);
        }
    }

    pub fn set_buffering(&mut self, on: bool) {
        if !on {
            self.flush_word_buffer();
        }
        self.buffering = on;
    }

    // ---- restart ----

    /// The restart opcode: rewind everything except the transcript bit
    /// and re-advertise capabilities.
    pub fn restart(&mut self) -> Result<ExecutionResult, String> {
        self.screen.restart_game(RestartStage::Begin);
        self.flush_word_buffer();
        self.wrap.reset();
        self.streams.reset();
        self.vm.restart();
        self.screen.restart_game(RestartStage::WpropSet);
        let (rows, cols) = (self.screen.rows(), self.screen.cols());
        self.vm
            .game
            .header
            .write_capabilities(&mut self.vm.game.memory, rows, cols);
        self.undo.clear();
        self.screen.restart_game(RestartStage::End);
        Ok(ExecutionResult::Continue)
    }

    /// Rewrite capability fields after a restore, erasing the status
    /// window when the saving interpreter had a different screen.
    pub fn restore_header(&mut self) {
        let old_rows = self.vm.game.header.screen_rows;
        let old_cols = self.vm.game.header.screen_cols;
        let version = self.vm.game.header.version;
        if version == 3 {
            self.screen.split_window(0);
        }
        let (rows, cols) = (self.screen.rows(), self.screen.cols());
        self.vm
            .game
            .header
            .write_capabilities(&mut self.vm.game.memory, rows, cols);
        if version > 3 && version != 6 && (rows != old_rows || cols != old_cols) {
            self.screen.erase_window(1);
        }
    }

    // ---- dispatch ----

    /// Execute a decoded instruction. The PC has already advanced past it.
    pub fn execute_instruction(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        let operands = self.resolve_operands(inst)?;
        match inst.operand_count {
            OperandCount::OP2 => self.execute_2op(inst, &operands),
            OperandCount::OP1 => self.execute_1op(inst, &operands),
            OperandCount::OP0 => self.execute_0op(inst),
            OperandCount::VAR => {
                if inst.ext_opcode.is_some() {
                    self.execute_ext(inst, &operands)
                } else {
                    self.execute_var(inst, &operands)
                }
            }
        }
    }

    fn execute_2op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let a = operands.first().copied().unwrap_or(0);
        let b = operands.get(1).copied().unwrap_or(0);
        let rest = operands.get(1..).unwrap_or(&[]);
        match inst.opcode {
            // je branches when the first operand matches any other
            0x01 => {
                let hit = rest.iter().any(|&v| v == a);
                self.do_branch(inst, hit)
            }
            0x02 => self.do_branch(inst, (a as i16) < b as i16),
            0x03 => self.do_branch(inst, (a as i16) > b as i16),
            0x04 => self.op_dec_chk(inst, a as u8, b),
            0x05 => self.op_inc_chk(inst, a as u8, b),
            0x06 => self.op_jin(inst, a, b),
            0x07 => self.do_branch(inst, a & b == b),
            0x08 | 0x09 | 0x14..=0x18 => self.execute_math_2op(inst, a, b),
            0x0a => self.op_test_attr(inst, a, b),
            0x0b => self.op_set_attr(a, b),
            0x0c => self.op_clear_attr(a, b),
            0x0d => {
                // store: overwrite without pushing
                self.vm.write_variable_in_place(a as u8, b)?;
                Ok(ExecutionResult::Continue)
            }
            0x0e => self.op_insert_obj(a, b),
            0x0f => self.op_loadw(inst, a, b),
            0x10 => self.op_loadb(inst, a, b),
            0x11 => self.op_get_prop(inst, a, b),
            0x12 => self.op_get_prop_addr(inst, a, b),
            0x13 => self.op_get_next_prop(inst, a, b),
            0x19 => self.call_with_store(inst, a, rest),
            0x1a => self.call_routine(a, rest, CallKind::Discard),
            0x1b => {
                self.screen.set_colour(a, b);
                Ok(ExecutionResult::Continue)
            }
            0x1c => self.throw_to_frame(a, b),
            _ => Err(self.fatal_error(ErrorCode::IllOpcode)),
        }
    }

    fn execute_1op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let a = operands.first().copied().unwrap_or(0);
        match inst.opcode {
            0x00 => self.do_branch(inst, a == 0),
            0x01 => self.op_get_sibling(inst, a),
            0x02 => self.op_get_child(inst, a),
            0x03 => self.op_get_parent(inst, a),
            0x04 => self.op_get_prop_len(inst, a),
            0x05 => self.op_inc(a as u8),
            0x06 => self.op_dec(a as u8),
            0x07 => {
                // print_addr
                self.print_zstring_at(a as usize)?;
                Ok(ExecutionResult::Continue)
            }
            0x08 => self.call_with_store(inst, a, &[]),
            0x09 => self.op_remove_obj(a),
            0x0a => self.op_print_obj(a),
            0x0b => self.return_from_routine(a),
            0x0c => {
                // jump: signed word offset from the following instruction
                let target = self.vm.pc as i64 + (a as i16) as i64 - 2;
                if target < 0 || target as usize >= self.vm.game.memory.len() {
                    return Err(self.fatal_error(ErrorCode::IllJumpAddr));
                }
                self.vm.pc = target as u32;
                Ok(ExecutionResult::Branched)
            }
            0x0d => {
                // print_paddr
                let addr = self.vm.unpack_string(a);
                self.print_zstring_at(addr as usize)?;
                Ok(ExecutionResult::Continue)
            }
            0x0e => {
                // load: read without popping
                let value = self.vm.read_variable_in_place(a as u8)?;
                self.do_store(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x0f => {
                if self.vm.game.header.version <= 4 {
                    self.do_store(inst, !a)?;
                    Ok(ExecutionResult::Continue)
                } else {
                    self.call_routine(a, &[], CallKind::Discard)
                }
            }
            _ => Err(self.fatal_error(ErrorCode::IllOpcode)),
        }
    }

    fn execute_0op(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        let version = self.vm.game.header.version;
        match inst.opcode {
            0x00 => self.return_from_routine(1),
            0x01 => self.return_from_routine(0),
            0x02 => {
                // print: inline text
                if let Some(addr) = inst.text_addr {
                    self.print_zstring_at(addr)?;
                }
                Ok(ExecutionResult::Continue)
            }
            0x03 => {
                // print_ret
                if let Some(addr) = inst.text_addr {
                    self.print_zstring_at(addr)?;
                }
                self.emit_newline();
                self.return_from_routine(1)
            }
            0x04 => Ok(ExecutionResult::Continue), // nop
            0x05 => self.op_save(inst),
            0x06 => self.op_restore(inst),
            0x07 => self.restart(),
            0x08 => {
                let value = self.vm.pop().map_err(|e| self.fatal_error(e))?;
                self.return_from_routine(value)
            }
            0x09 => {
                if version >= 5 {
                    // catch
                    let frames = self.vm.frame_count() as u16;
                    self.do_store(inst, frames)?;
                } else {
                    // pop
                    self.vm.pop().map_err(|e| self.fatal_error(e))?;
                }
                Ok(ExecutionResult::Continue)
            }
            0x0a => {
                debug!("quit after {} instructions", self.instruction_count);
                self.flush_word_buffer();
                Ok(ExecutionResult::Quit)
            }
            0x0b => {
                self.emit_newline();
                Ok(ExecutionResult::Continue)
            }
            0x0c => self.op_show_status(),
            0x0d => {
                // verify
                let ok = self.vm.game.compute_checksum() == self.vm.game.header.checksum;
                self.do_branch(inst, ok)
            }
            0x0f => {
                // piracy: report the story as genuine
                self.do_branch(inst, true)
            }
            _ => Err(self.fatal_error(ErrorCode::IllOpcode)),
        }
    }

    fn execute_var(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let a = operands.first().copied().unwrap_or(0);
        let rest = operands.get(1..).unwrap_or(&[]);
        match inst.opcode {
            0x00 => self.call_with_store(inst, a, rest),
            0x01 => self.op_storew(a, operands.get(1).copied().unwrap_or(0), operands.get(2).copied().unwrap_or(0)),
            0x02 => self.op_storeb(a, operands.get(1).copied().unwrap_or(0), operands.get(2).copied().unwrap_or(0)),
            0x03 => self.op_put_prop(a, operands.get(1).copied().unwrap_or(0), operands.get(2).copied().unwrap_or(0)),
            0x04 => self.op_read(inst, operands),
            0x05 => {
                // print_char
                self.print_zscii(a)?;
                Ok(ExecutionResult::Continue)
            }
            0x06 => {
                // print_num: signed
                let text = format!("{}", a as i16);
                self.print_host_string(&text);
                Ok(ExecutionResult::Continue)
            }
            0x07 => self.op_random(inst, a),
            0x08 => {
                self.vm.push(a).map_err(|e| self.fatal_error(e))?;
                Ok(ExecutionResult::Continue)
            }
            0x09 => self.op_pull(inst, a),
            0x0a => {
                self.screen.split_window(a);
                Ok(ExecutionResult::Continue)
            }
            0x0b => {
                self.screen.set_window(a);
                Ok(ExecutionResult::Continue)
            }
            0x0c => self.call_with_store(inst, a, rest),
            0x0d => {
                self.flush_word_buffer();
                self.screen.erase_window(a as i16);
                Ok(ExecutionResult::Continue)
            }
            0x0e => {
                self.screen.erase_line();
                Ok(ExecutionResult::Continue)
            }
            0x0f => {
                self.flush_word_buffer();
                self.screen
                    .set_cursor(a, operands.get(1).copied().unwrap_or(1));
                Ok(ExecutionResult::Continue)
            }
            0x10 => {
                // get_cursor: write (row, column) into the given table
                self.op_get_cursor(a)
            }
            0x11 => {
                self.flush_word_buffer();
                self.screen.set_text_style(a);
                Ok(ExecutionResult::Continue)
            }
            0x12 => {
                self.set_buffering(a != 0);
                self.screen.buffer_mode(a != 0);
                Ok(ExecutionResult::Continue)
            }
            0x13 => self.op_output_stream(a as i16, operands.get(1).copied()),
            0x14 => {
                debug!("input_stream {} selected", a);
                Ok(ExecutionResult::Continue)
            }
            0x15 => self.op_sound_effect(operands),
            0x16 => self.op_read_char(inst, operands),
            0x17 => self.op_scan_table(inst, operands),
            0x18 => {
                // not (V5+)
                self.do_store(inst, !a)?;
                Ok(ExecutionResult::Continue)
            }
            0x19 | 0x1a => self.call_routine(a, rest, CallKind::Discard),
            0x1b => self.op_tokenise(operands),
            0x1c => self.op_encode_text(operands),
            0x1d => self.op_copy_table(operands),
            0x1e => self.op_print_table(operands),
            0x1f => {
                let argc = self
                    .vm
                    .call_stack
                    .last()
                    .map(|f| f.arg_count)
                    .unwrap_or(0) as u16;
                self.do_branch(inst, a <= argc)
            }
            _ => Err(self.fatal_error(ErrorCode::IllOpcode)),
        }
    }

    fn execute_ext(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        let a = operands.first().copied().unwrap_or(0);
        match inst.ext_opcode.unwrap_or(0xff) {
            0x00 => self.op_save(inst),
            0x01 => self.op_restore(inst),
            0x02 => {
                // log_shift
                let shift = operands.get(1).copied().unwrap_or(0) as i16;
                let value = if shift >= 0 {
                    if shift >= 16 { 0 } else { a << shift }
                } else if shift <= -16 {
                    0
                } else {
                    a >> (-shift)
                };
                self.do_store(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x03 => {
                // art_shift: arithmetic on the sign bit
                let shift = operands.get(1).copied().unwrap_or(0) as i16;
                let signed = a as i16;
                let value = if shift >= 0 {
                    if shift >= 16 { 0 } else { (signed as u16) << shift }
                } else if shift <= -16 {
                    if signed < 0 { 0xffff } else { 0 }
                } else {
                    (signed >> (-shift)) as u16
                };
                self.do_store(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x04 => {
                let previous = self.screen.set_font(a);
                self.do_store(inst, previous)?;
                Ok(ExecutionResult::Continue)
            }
            0x09 => self.op_save_undo(inst),
            0x0a => self.op_restore_undo(inst),
            0x0b => {
                // print_unicode
                let ch = char::from_u32(a as u32).unwrap_or('?');
                let mut tmp = [0u8; 4];
                self.print_host_string(ch.encode_utf8(&mut tmp));
                Ok(ExecutionResult::Continue)
            }
            0x0c => {
                // check_unicode: 3 = can print and read
                let ch = char::from_u32(a as u32);
                let printable = matches!(ch, Some(c) if c == '\n' || (' '..='~').contains(&c))
                    || (a >= 0xa0 && a <= 0xff);
                self.do_store(inst, if printable { 3 } else { 0 })?;
                Ok(ExecutionResult::Continue)
            }
            0x06 => {
                // picture_data: no pictures, branch false
                self.do_branch(inst, false)
            }
            // Remaining extended opcodes are V6 presentation concerns
            0x05 | 0x07 | 0x08 | 0x0d | 0x10..=0x1d => {
                debug!("ignoring V6 extended opcode {:02x}", inst.ext_opcode.unwrap());
                Ok(ExecutionResult::Continue)
            }
            _ => Err(self.fatal_error(ErrorCode::IllOpcode)),
        }
    }

    /// A store-variant call: the routine's value lands in the store var.
    fn call_with_store(
        &mut self,
        inst: &Instruction,
        packed: u16,
        args: &[u16],
    ) -> Result<ExecutionResult, String> {
        let kind = match inst.store_var {
            Some(var) => CallKind::Store(var),
            None => CallKind::Discard,
        };
        self.call_routine(packed, args, kind)
    }
}
