//! Object and property handlers: the opcode boundary where object-0
//! arguments become soft numbered errors with safe defaults, and where
//! the title-specific compatibility shims live.

use crate::err::ErrorCode;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::story_id::StoryId;

/// Beyond Zork addresses objects past this as if they did not exist.
const MAX_OBJECT: u16 = 2000;

impl Interpreter {
    fn object_error(&mut self, code: ErrorCode) -> Result<(), String> {
        self.runtime_error(code)
    }

    /// Map a VM-level object failure into the fatal path.
    fn lift(&mut self, e: ErrorCode) -> String {
        self.fatal_error(e)
    }

    pub fn op_jin(&mut self, inst: &Instruction, obj: u16, parent: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::Jin0)?;
            return self.do_branch(inst, parent == 0);
        }
        let actual = self.vm.obj_parent(obj).map_err(|e| self.lift(e))?;
        self.do_branch(inst, actual == parent)
    }

    pub fn op_get_parent(&mut self, inst: &Instruction, obj: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::GetParent0)?;
            self.do_store(inst, 0)?;
            return Ok(ExecutionResult::Continue);
        }
        let parent = self.vm.obj_parent(obj).map_err(|e| self.lift(e))?;
        self.do_store(inst, parent)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_get_sibling(&mut self, inst: &Instruction, obj: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::GetSibling0)?;
            self.do_store(inst, 0)?;
            return self.do_branch(inst, false);
        }
        let sibling = self.vm.obj_sibling(obj).map_err(|e| self.lift(e))?;
        self.do_store(inst, sibling)?;
        self.do_branch(inst, sibling != 0)
    }

    pub fn op_get_child(&mut self, inst: &Instruction, obj: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::GetChild0)?;
            self.do_store(inst, 0)?;
            return self.do_branch(inst, false);
        }
        let child = self.vm.obj_child(obj).map_err(|e| self.lift(e))?;
        self.do_store(inst, child)?;
        self.do_branch(inst, child != 0)
    }

    pub fn op_insert_obj(&mut self, obj: u16, dest: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::MoveObject0)?;
            return Ok(ExecutionResult::Continue);
        }
        if dest == 0 {
            self.object_error(ErrorCode::MoveObjectTo0)?;
            return Ok(ExecutionResult::Continue);
        }
        self.vm.insert_object(obj, dest).map_err(|e| self.lift(e))?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_remove_obj(&mut self, obj: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::RemoveObject0)?;
            return Ok(ExecutionResult::Continue);
        }
        self.vm.remove_object(obj).map_err(|e| self.lift(e))?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_test_attr(&mut self, inst: &Instruction, obj: u16, attr: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::TestAttr0)?;
            return self.do_branch(inst, false);
        }
        match self.vm.test_attribute(obj, attr) {
            Ok(set) => self.do_branch(inst, set),
            Err(ErrorCode::IllAttr) => {
                self.runtime_error(ErrorCode::IllAttr)?;
                self.do_branch(inst, false)
            }
            Err(e) => Err(self.lift(e)),
        }
    }

    pub fn op_set_attr(&mut self, obj: u16, attr: u16) -> Result<ExecutionResult, String> {
        // Sherlock trips over attribute 48; every interpreter of its era
        // swallows it.
        if self.story_id == StoryId::Sherlock && attr == 48 {
            return Ok(ExecutionResult::Continue);
        }
        if obj == 0 {
            self.object_error(ErrorCode::SetAttr0)?;
            return Ok(ExecutionResult::Continue);
        }
        match self.vm.set_attribute(obj, attr, true) {
            Ok(()) => Ok(ExecutionResult::Continue),
            Err(ErrorCode::IllAttr) => {
                self.runtime_error(ErrorCode::IllAttr)?;
                Ok(ExecutionResult::Continue)
            }
            Err(e) => Err(self.lift(e)),
        }
    }

    pub fn op_clear_attr(&mut self, obj: u16, attr: u16) -> Result<ExecutionResult, String> {
        if self.story_id == StoryId::Sherlock && attr == 48 {
            return Ok(ExecutionResult::Continue);
        }
        if obj == 0 {
            self.object_error(ErrorCode::ClearAttr0)?;
            return Ok(ExecutionResult::Continue);
        }
        match self.vm.set_attribute(obj, attr, false) {
            Ok(()) => Ok(ExecutionResult::Continue),
            Err(ErrorCode::IllAttr) => {
                self.runtime_error(ErrorCode::IllAttr)?;
                Ok(ExecutionResult::Continue)
            }
            Err(e) => Err(self.lift(e)),
        }
    }

    pub fn op_get_prop(&mut self, inst: &Instruction, obj: u16, prop: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::GetProp0)?;
            self.do_store(inst, 0)?;
            return Ok(ExecutionResult::Continue);
        }
        let value = self.vm.get_property(obj, prop as u8).map_err(|e| self.lift(e))?;
        self.do_store(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_get_prop_addr(&mut self, inst: &Instruction, obj: u16, prop: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::GetPropAddr0)?;
            self.do_store(inst, 0)?;
            return Ok(ExecutionResult::Continue);
        }
        // Beyond Zork asks after objects far past its table.
        if self.story_id == StoryId::BeyondZork && obj > MAX_OBJECT {
            self.do_store(inst, 0)?;
            return Ok(ExecutionResult::Continue);
        }
        let addr = self.vm.property_addr(obj, prop as u8).map_err(|e| self.lift(e))?;
        self.do_store(inst, addr as u16)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_get_prop_len(&mut self, inst: &Instruction, data_addr: u16) -> Result<ExecutionResult, String> {
        let len = self.vm.property_len(data_addr as u32);
        self.do_store(inst, len)?;
        Ok(ExecutionResult::Continue)
    }

    pub fn op_get_next_prop(&mut self, inst: &Instruction, obj: u16, prop: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::GetNextProp0)?;
            self.do_store(inst, 0)?;
            return Ok(ExecutionResult::Continue);
        }
        match self.vm.next_property(obj, prop as u8) {
            Ok(next) => {
                self.do_store(inst, next as u16)?;
                Ok(ExecutionResult::Continue)
            }
            Err(ErrorCode::NoProp) => {
                self.runtime_error(ErrorCode::NoProp)?;
                self.do_store(inst, 0)?;
                Ok(ExecutionResult::Continue)
            }
            Err(e) => Err(self.lift(e)),
        }
    }

    pub fn op_put_prop(&mut self, obj: u16, prop: u16, value: u16) -> Result<ExecutionResult, String> {
        if obj == 0 {
            self.object_error(ErrorCode::PutProp0)?;
            return Ok(ExecutionResult::Continue);
        }
        match self.vm.put_property(obj, prop as u8, value) {
            Ok(()) => Ok(ExecutionResult::Continue),
            Err(ErrorCode::NoProp) => Err(self.fatal_error(ErrorCode::NoProp)),
            Err(e) => Err(self.lift(e)),
        }
    }

    pub fn op_print_obj(&mut self, obj: u16) -> Result<ExecutionResult, String> {
        let name = self.vm.object_name(obj).map_err(|e| self.lift(e))?;
        self.print_host_string(&name);
        Ok(ExecutionResult::Continue)
    }
}
