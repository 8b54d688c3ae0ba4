//! Snapshot serialisation: IFhd + CMem + Stks inside a FORM/IFZS.

use crate::quetzal::chunks::{IfhdChunk, StksChunk};
use crate::quetzal::compressed_memory::compress_memory;
use crate::quetzal::iff::IffForm;
use crate::vm::VM;
use log::debug;

/// Serialise the full machine state into a Quetzal buffer. The pristine
/// story image is the CMem reference.
pub fn save_to_bytes(vm: &VM) -> Vec<u8> {
    let dynamic = vm.game.header.dynamic_size as usize;
    let cmem = compress_memory(&vm.game.memory[..dynamic], &vm.game.original[..dynamic]);

    let mut form = IffForm::new();
    form.add_chunk(*b"IFhd", IfhdChunk::from_vm(vm).to_bytes());
    form.add_chunk(*b"CMem", cmem);
    form.add_chunk(*b"Stks", StksChunk::from_vm(vm).data);

    let bytes = form.to_bytes();
    debug!(
        "snapshot: {} bytes ({} dynamic, {} frames)",
        bytes.len(),
        dynamic,
        vm.call_stack.len()
    );
    bytes
}
