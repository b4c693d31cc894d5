//! Transaction engine: records, transactions and the undo buffer.

/// Undo/redo buffer and recording state machine.
pub mod buffer;
/// Deduplicated reference tables.
pub mod indices;
/// Single captured snapshot or array-range mutation.
pub mod record;
/// One undo step and its apply/flip logic.
pub mod transaction;
