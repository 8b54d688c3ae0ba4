//! Arithmetic and logic handlers. All arithmetic is signed 16-bit with
//! wrap-around; division by zero is a fatal runtime error.

use crate::err::ErrorCode;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::zrand::RandMode;
use log::debug;

impl Interpreter {
    /// The 2OP bitwise and arithmetic family (or/and/add/sub/mul/div/mod).
    pub fn execute_math_2op(
        &mut self,
        inst: &Instruction,
        a: u16,
        b: u16,
    ) -> Result<ExecutionResult, String> {
        let value = match inst.opcode {
            0x08 => a | b,
            0x09 => a & b,
            0x14 => (a as i16).wrapping_add(b as i16) as u16,
            0x15 => (a as i16).wrapping_sub(b as i16) as u16,
            0x16 => (a as i16).wrapping_mul(b as i16) as u16,
            0x17 => {
                if b == 0 {
                    return Err(self.fatal_error(ErrorCode::DivZero));
                }
                (a as i16).wrapping_div(b as i16) as u16
            }
            0x18 => {
                if b == 0 {
                    return Err(self.fatal_error(ErrorCode::DivZero));
                }
                (a as i16).wrapping_rem(b as i16) as u16
            }
            _ => return Err(self.fatal_error(ErrorCode::IllOpcode)),
        };
        self.do_store(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// inc: bump a variable as a signed word.
    pub fn op_inc(&mut self, var: u8) -> Result<ExecutionResult, String> {
        let value = self.vm.read_variable_in_place(var)?;
        self.vm
            .write_variable_in_place(var, (value as i16).wrapping_add(1) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_dec(&mut self, var: u8) -> Result<ExecutionResult, String> {
        let value = self.vm.read_variable_in_place(var)?;
        self.vm
            .write_variable_in_place(var, (value as i16).wrapping_sub(1) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    /// inc_chk: increment, then branch if now greater than the limit.
    pub fn op_inc_chk(
        &mut self,
        inst: &Instruction,
        var: u8,
        limit: u16,
    ) -> Result<ExecutionResult, String> {
        let value = (self.vm.read_variable_in_place(var)? as i16).wrapping_add(1);
        self.vm.write_variable_in_place(var, value as u16)?;
        self.do_branch(inst, value > limit as i16)
    }

    /// dec_chk: decrement, then branch if now less than the limit.
    pub fn op_dec_chk(
        &mut self,
        inst: &Instruction,
        var: u8,
        limit: u16,
    ) -> Result<ExecutionResult, String> {
        let value = (self.vm.read_variable_in_place(var)? as i16).wrapping_sub(1);
        self.vm.write_variable_in_place(var, value as u16)?;
        self.do_branch(inst, value < limit as i16)
    }

    /// random: positive ranges roll, zero or negative reseed and store 0.
    pub fn op_random(&mut self, inst: &Instruction, range: u16) -> Result<ExecutionResult, String> {
        let signed = range as i16;
        if signed <= 0 {
            self.rng.seed((-signed) as u16);
            debug!("random reseeded with {} ({:?})", -signed, self.rng.mode());
            self.do_store(inst, 0)?;
        } else {
            let roll = self.rng.roll(range);
            self.do_store(inst, roll)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// A synonym used by tests for asserting mode transitions.
    pub fn rng_mode(&self) -> RandMode {
        self.rng.mode()
    }
}
