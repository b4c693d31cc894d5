//! Notifications emitted by [`crate::core::buffer::TransactionBuffer`].

use crate::core::transaction::UndoSessionContext;

/// Events delivered to listeners registered with
/// [`crate::core::buffer::TransactionBuffer::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
    /// A transaction is about to be undone or redone.
    BeforeUndoRedo {
        /// Context of the transaction about to be applied.
        context: UndoSessionContext,
    },
    /// An undo was attempted.
    Undone {
        /// Context of the undone transaction; empty when nothing was undone.
        context: UndoSessionContext,
        /// False when undo was unavailable.
        success: bool,
    },
    /// A redo was attempted.
    Redone {
        /// Context of the redone transaction; empty when nothing was redone.
        context: UndoSessionContext,
        /// False when redo was unavailable.
        success: bool,
    },
    /// The whole history was discarded.
    Reset {
        /// Caller-supplied reason.
        reason: String,
    },
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Callback receiving [`TransactionEvent`]s.
pub type Listener = Box<dyn FnMut(&TransactionEvent)>;
