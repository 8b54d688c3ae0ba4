//! Quetzal save format (IFZS inside an IFF FORM container).
//!
//! Snapshots are byte buffers rather than files so the host can hold
//! them wherever it likes; the layout is bit-compatible with other
//! conforming interpreters.

pub mod chunks;
pub mod compressed_memory;
pub mod iff;
pub mod restore;
pub mod save;

pub use restore::restore_from_bytes;
pub use save::save_to_bytes;
