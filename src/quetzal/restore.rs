//! Snapshot deserialisation.
//!
//! The snapshot is validated fully before any machine state changes, so
//! a mismatched or corrupt buffer leaves the game exactly as it was.

use crate::quetzal::chunks::{IfhdChunk, StksChunk};
use crate::quetzal::compressed_memory::decompress_memory;
use crate::quetzal::iff::IffForm;
use crate::vm::VM;
use log::debug;

/// Restore the machine from a Quetzal buffer produced by `save_to_bytes`
/// (or any conforming interpreter).
pub fn restore_from_bytes(vm: &mut VM, data: &[u8]) -> Result<(), String> {
    let form = IffForm::from_bytes(data)?;
    if &form.form_type != b"IFZS" {
        return Err("Not a Quetzal snapshot (form is not IFZS)".to_string());
    }

    let ifhd = form
        .find_chunk(b"IFhd")
        .ok_or("Snapshot is missing its IFhd chunk")?;
    let ifhd = IfhdChunk::from_bytes(&ifhd.data)?;
    if !ifhd.matches(vm) {
        return Err(format!(
            "Snapshot belongs to a different story (release {} serial {})",
            ifhd.release,
            String::from_utf8_lossy(&ifhd.serial),
        ));
    }

    let dynamic = vm.game.header.dynamic_size as usize;
    let memory = if let Some(cmem) = form.find_chunk(b"CMem") {
        decompress_memory(&cmem.data, &vm.game.original[..dynamic])?
    } else if let Some(umem) = form.find_chunk(b"UMem") {
        if umem.data.len() != dynamic {
            return Err(format!(
                "UMem length {} does not match dynamic size {}",
                umem.data.len(),
                dynamic
            ));
        }
        umem.data.clone()
    } else {
        return Err("Snapshot has neither CMem nor UMem".to_string());
    };

    let stks = form
        .find_chunk(b"Stks")
        .ok_or("Snapshot is missing its Stks chunk")?;
    let (frames, stack) = StksChunk { data: stks.data.clone() }.decode()?;

    // Everything validated; commit.
    vm.game.memory[..dynamic].copy_from_slice(&memory);
    vm.call_stack = frames;
    vm.stack = stack;
    vm.pc = ifhd.pc;
    debug!(
        "restored snapshot: PC {:05x}, {} frames, {} stack words",
        vm.pc,
        vm.call_stack.len(),
        vm.stack.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quetzal::save_to_bytes;
    use crate::test_utils::StoryBuilder;
    use crate::vm::{CallFrame, CallKind, Game, MAX_LOCALS};

    fn test_vm() -> VM {
        VM::new(Game::from_bytes(StoryBuilder::new(3).build()).unwrap())
    }

    fn exercised_vm() -> VM {
        let mut vm = test_vm();
        vm.write_byte(0x200, 0x77).unwrap();
        vm.write_word(0x300, 0x1234).unwrap();
        vm.push(42).unwrap();
        vm.call_stack.push(CallFrame {
            return_pc: 0x5123,
            kind: CallKind::Store(0),
            num_locals: 3,
            locals: [5; MAX_LOCALS],
            stack_base: 1,
            arg_count: 2,
        });
        vm.push(77).unwrap();
        vm.pc = 0x5200;
        vm
    }

    #[test]
    fn save_restore_is_identity() {
        let mut vm = exercised_vm();
        let snapshot = save_to_bytes(&vm);

        // Disturb everything the snapshot covers
        vm.write_byte(0x200, 0x00).unwrap();
        vm.write_word(0x300, 0x0000).unwrap();
        vm.stack.clear();
        vm.call_stack.truncate(1);
        vm.pc = 0x5000;

        restore_from_bytes(&mut vm, &snapshot).unwrap();
        assert_eq!(vm.read_byte(0x200), 0x77);
        assert_eq!(vm.read_word(0x300), 0x1234);
        assert_eq!(vm.stack, vec![42, 77]);
        assert_eq!(vm.call_stack.len(), 2);
        assert_eq!(vm.call_stack[1].return_pc, 0x5123);
        assert_eq!(vm.call_stack[1].num_locals, 3);
        assert_eq!(vm.pc, 0x5200);
    }

    #[test]
    fn mismatched_story_leaves_state_alone() {
        let vm = exercised_vm();
        let mut snapshot = save_to_bytes(&vm);

        // A different release in the header makes the snapshot foreign
        let mut other = test_vm();
        other.game.header.release ^= 0x0100;
        other.pc = 0x4444;
        other.push(9).unwrap();
        let before_stack = other.stack.clone();

        assert!(restore_from_bytes(&mut other, &snapshot).is_err());
        assert_eq!(other.pc, 0x4444);
        assert_eq!(other.stack, before_stack);

        // Truncating the snapshot corrupts it without touching state
        snapshot.truncate(20);
        let mut vm2 = exercised_vm();
        let pc_before = vm2.pc;
        assert!(restore_from_bytes(&mut vm2, &snapshot).is_err());
        assert_eq!(vm2.pc, pc_before);
    }
}
