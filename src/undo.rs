//! Undo ring: bounded in-RAM snapshots using the CMem diff coding.
//!
//! `save_undo` pushes a node (evicting the oldest when the ring is
//! full); `restore_undo` pops the newest. Diffs are taken against a
//! reference copy of dynamic memory captured when the ring is set up.

use crate::quetzal::compressed_memory::{compress_memory, decompress_memory};
use crate::vm::{CallFrame, VM};
use log::debug;

struct UndoNode {
    pc: u32,
    frames: Vec<CallFrame>,
    stack: Vec<u16>,
    memory_diff: Vec<u8>,
}

pub struct UndoRing {
    /// Reference copy of dynamic memory, taken at setup
    reference: Vec<u8>,
    nodes: Vec<UndoNode>,
    slots: usize,
}

impl UndoRing {
    /// Build the ring with the given slot count; zero disables undo.
    pub fn new(vm: &VM, slots: usize) -> Self {
        let dynamic = vm.game.header.dynamic_size as usize;
        UndoRing {
            reference: vm.game.original[..dynamic].to_vec(),
            nodes: Vec::new(),
            slots,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.slots > 0
    }

    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Capture the machine state. Returns false when undo is disabled.
    pub fn push(&mut self, vm: &VM) -> bool {
        if self.slots == 0 {
            return false;
        }
        if self.nodes.len() == self.slots {
            self.nodes.remove(0);
        }
        let dynamic = vm.game.header.dynamic_size as usize;
        self.nodes.push(UndoNode {
            pc: vm.pc,
            frames: vm.call_stack.clone(),
            stack: vm.stack.clone(),
            memory_diff: compress_memory(&vm.game.memory[..dynamic], &self.reference),
        });
        debug!("undo: {} of {} slots used", self.nodes.len(), self.slots);
        true
    }

    /// Rewind to the newest snapshot. Returns false when none remains.
    pub fn pop(&mut self, vm: &mut VM) -> Result<bool, String> {
        let node = match self.nodes.pop() {
            Some(node) => node,
            None => return Ok(false),
        };
        let dynamic = vm.game.header.dynamic_size as usize;
        let memory = decompress_memory(&node.memory_diff, &self.reference)?;
        vm.game.memory[..dynamic].copy_from_slice(&memory);
        vm.call_stack = node.frames;
        vm.stack = node.stack;
        vm.pc = node.pc;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StoryBuilder;
    use crate::vm::Game;

    fn test_vm() -> VM {
        VM::new(Game::from_bytes(StoryBuilder::new(3).build()).unwrap())
    }

    #[test]
    fn disabled_ring_refuses() {
        let vm = test_vm();
        let mut ring = UndoRing::new(&vm, 0);
        assert!(!ring.push(&vm));
    }

    #[test]
    fn push_pop_restores_state() {
        let mut vm = test_vm();
        let mut ring = UndoRing::new(&vm, 4);
        vm.write_byte(0x180, 0x11).unwrap();
        vm.push(100).unwrap();
        vm.pc = 0x5050;
        assert!(ring.push(&vm));

        vm.write_byte(0x180, 0x22).unwrap();
        vm.stack.clear();
        vm.pc = 0x6000;

        assert!(ring.pop(&mut vm).unwrap());
        assert_eq!(vm.read_byte(0x180), 0x11);
        assert_eq!(vm.stack, vec![100]);
        assert_eq!(vm.pc, 0x5050);
        assert!(!ring.pop(&mut vm).unwrap());
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut vm = test_vm();
        let mut ring = UndoRing::new(&vm, 2);
        for value in [1u8, 2, 3] {
            vm.write_byte(0x180, value).unwrap();
            ring.push(&vm);
        }
        assert_eq!(ring.depth(), 2);
        ring.pop(&mut vm).unwrap();
        assert_eq!(vm.read_byte(0x180), 3);
        ring.pop(&mut vm).unwrap();
        assert_eq!(vm.read_byte(0x180), 2);
        assert!(!ring.pop(&mut vm).unwrap());
    }
}
