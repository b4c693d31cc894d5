use std::{collections::VecDeque, fmt};

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::BufferConfig,
    events::{Listener, ListenerId, TransactionEvent},
    object::{ElementOps, ReferenceCollector},
    types::{ArrayHandle, ArrayOp, ObjectRef},
};

use super::transaction::{Transaction, UndoSessionContext};

/// Why undo or redo is currently unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// Undo requested while a transaction is being recorded.
    UndoDuringTransaction,
    /// Redo requested while a transaction is being recorded.
    RedoDuringTransaction,
    /// History is exhausted; carries the last reset reason.
    NothingToUndo(String),
    /// No undone transaction is left to redo.
    NothingToRedo,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndoDuringTransaction => f.write_str("(Can't undo while action is in progress)"),
            Self::RedoDuringTransaction => f.write_str("(Can't redo while action is in progress)"),
            Self::NothingToUndo(reason) => write!(f, "(Can't undo after: {reason})"),
            Self::NothingToRedo => f.write_str("(Nothing to redo)"),
        }
    }
}

/// Diagnostic view of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Transaction title.
    pub title: String,
    /// Originating system.
    pub context: String,
    /// Number of records.
    pub records: usize,
    /// Captured bytes.
    pub data_size: usize,
}

/// Diagnostic view of the whole buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSummary {
    /// Transactions, oldest first.
    pub transactions: Vec<TransactionSummary>,
    /// Transactions that can be redone.
    pub undo_count: usize,
    /// Current nesting depth.
    pub active_count: usize,
    /// Last reset reason.
    pub reset_reason: String,
    /// Sum of captured bytes.
    pub undo_size: usize,
}

/// Linear undo history with nested recording brackets.
///
/// Transactions are stored oldest first. The last `undo_count` of them have
/// been undone and are still redoable; any new `begin` at depth zero drops
/// them.
pub struct TransactionBuffer {
    transactions: VecDeque<Transaction>,
    undo_count: usize,
    active_count: usize,
    /// Record count of the current transaction when each depth was entered.
    depth_marks: Vec<usize>,
    /// Index of the transaction receiving saves while recording.
    current: Option<usize>,
    max_memory: usize,
    reset_reason: String,
    suspended_reporting: usize,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

impl fmt::Debug for TransactionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBuffer")
            .field("transactions", &self.transactions.len())
            .field("undo_count", &self.undo_count)
            .field("active_count", &self.active_count)
            .field("max_memory", &self.max_memory)
            .field("reset_reason", &self.reset_reason)
            .finish()
    }
}

impl Default for TransactionBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

impl TransactionBuffer {
    /// Creates an empty buffer reset with the configured startup reason.
    pub fn new(config: BufferConfig) -> Self {
        let mut buffer = Self {
            transactions: VecDeque::new(),
            undo_count: 0,
            active_count: 0,
            depth_marks: Vec::new(),
            current: None,
            max_memory: config.max_memory_bytes,
            reset_reason: String::new(),
            suspended_reporting: 0,
            listeners: Vec::new(),
            next_listener_id: 1,
        };
        buffer.reset(config.startup_reason);
        info!(max_memory = buffer.max_memory, "transaction tracking system initialized");
        buffer
    }

    /// Opens a recording bracket and returns the depth before the call.
    ///
    /// At depth zero this drops the redo tail, evicts the oldest
    /// transactions while over budget, and starts a new transaction.
    /// Nested calls reuse the open transaction.
    pub fn begin(&mut self, context: &str, title: &str) -> usize {
        self.check_state();
        let result = self.active_count;
        if self.active_count == 0 {
            if self.undo_count > 0 {
                let keep = self.transactions.len() - self.undo_count;
                debug!(discarded = self.undo_count, "dropping redo tail");
                self.transactions.truncate(keep);
            }
            self.undo_count = 0;

            let mut size = self.undo_size();
            while size > self.max_memory {
                let Some(evicted) = self.transactions.pop_front() else {
                    break;
                };
                size -= evicted.data_size();
                debug!(title = evicted.title(), bytes = evicted.data_size(), "evicted transaction");
            }

            self.transactions.push_back(Transaction::new(context, title, true));
            self.current = Some(self.transactions.len() - 1);
            self.depth_marks.clear();
            debug!(context, title, "transaction begun");
        }
        let mark = self.current_transaction().map_or(0, Transaction::len);
        self.depth_marks.push(mark);
        self.active_count += 1;
        self.check_state();
        result
    }

    /// Closes a recording bracket and returns the depth before the call.
    ///
    /// Only the call that brings the depth to zero finalizes the transaction.
    pub fn end(&mut self) -> usize {
        self.check_state();
        let result = self.active_count;
        if self.active_count == 0 {
            // Reset may have purged the bracket the caller is closing.
            warn!("end called with no active transaction");
            return result;
        }
        self.active_count -= 1;
        self.depth_marks.pop();
        if self.active_count == 0 {
            if let Some(transaction) = self.current_transaction() {
                debug!(title = transaction.title(), records = transaction.len(), "transaction ended");
            }
            self.current = None;
        }
        self.check_state();
        result
    }

    /// Aborts recording back to `start_index`, the value `begin` returned.
    ///
    /// Zero discards the whole open transaction; otherwise only the records
    /// captured since that nested `begin` are dropped.
    pub fn cancel(&mut self, start_index: usize) {
        self.check_state();
        if self.active_count == 0 {
            warn!(start_index, "cancel called with no active transaction");
            return;
        }
        assert!(
            start_index < self.active_count,
            "cancel to depth {start_index} while only {} deep",
            self.active_count
        );

        if start_index == 0 {
            self.current = None;
            self.transactions.pop_back();
            self.depth_marks.clear();
        } else {
            let mark = self.depth_marks[start_index];
            self.depth_marks.truncate(start_index);
            if let Some(transaction) = self.current_transaction_mut() {
                transaction.truncate_records(mark);
            }
        }
        debug!(start_index, "transaction cancelled");
        self.active_count = start_index;
        self.check_state();
    }

    /// Discards the entire history.
    pub fn reset(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.check_state();
        if self.active_count != 0 {
            warn!(
                active_count = self.active_count,
                context = %self.undo_context(false).context,
                reason = %reason,
                "non-zero active count in reset; purging the undo buffer"
            );
            self.cancel(0);
        }

        self.transactions.clear();
        self.undo_count = 0;
        self.active_count = 0;
        self.depth_marks.clear();
        self.current = None;
        self.reset_reason = reason.clone();
        self.check_state();
        self.broadcast(&TransactionEvent::Reset { reason });
    }

    /// Snapshots `obj` into the open transaction, if any.
    pub fn save_object(&mut self, obj: &ObjectRef) {
        if let Some(transaction) = self.current_transaction_mut() {
            transaction.save_object(obj);
        }
    }

    /// Captures an array range into the open transaction, if any.
    pub fn save_array(
        &mut self,
        obj: &ObjectRef,
        handle: ArrayHandle,
        index: usize,
        count: usize,
        op: ArrayOp,
        element: ElementOps,
    ) {
        if let Some(transaction) = self.current_transaction_mut() {
            transaction.save_array(obj, handle, index, count, op, element);
        }
    }

    /// Sets the headline object of the transaction at the current position.
    pub fn set_primary_object(&mut self, obj: &ObjectRef) {
        if !obj.borrow().is_transactable() {
            return;
        }
        if let Some(idx) = self.transactions.len().checked_sub(self.undo_count + 1) {
            self.transactions[idx].set_primary_object(obj);
        }
    }

    /// Whether undo is available, with the reason when it is not.
    pub fn can_undo(&self) -> Result<(), Unavailable> {
        self.check_state();
        if self.active_count > 0 {
            return Err(Unavailable::UndoDuringTransaction);
        }
        if self.transactions.len() == self.undo_count {
            return Err(Unavailable::NothingToUndo(self.reset_reason.clone()));
        }
        Ok(())
    }

    /// Whether redo is available, with the reason when it is not.
    pub fn can_redo(&self) -> Result<(), Unavailable> {
        self.check_state();
        if self.active_count > 0 {
            return Err(Unavailable::RedoDuringTransaction);
        }
        if self.undo_count == 0 {
            return Err(Unavailable::NothingToRedo);
        }
        Ok(())
    }

    /// Reverts the newest transaction that has not been undone.
    pub fn undo(&mut self) -> bool {
        self.check_state();
        if self.can_undo().is_err() {
            self.broadcast(&TransactionEvent::Undone {
                context: UndoSessionContext::default(),
                success: false,
            });
            return false;
        }

        self.undo_count += 1;
        let idx = self.transactions.len() - self.undo_count;
        let context = self.transactions[idx].context();
        info!(title = %context.title, "undo");

        self.broadcast(&TransactionEvent::BeforeUndoRedo {
            context: context.clone(),
        });
        self.transactions[idx].apply();
        self.broadcast(&TransactionEvent::Undone {
            context,
            success: true,
        });

        self.check_state();
        true
    }

    /// Replays the oldest undone transaction.
    pub fn redo(&mut self) -> bool {
        self.check_state();
        if self.can_redo().is_err() {
            self.broadcast(&TransactionEvent::Redone {
                context: UndoSessionContext::default(),
                success: false,
            });
            return false;
        }

        let idx = self.transactions.len() - self.undo_count;
        self.undo_count -= 1;
        let context = self.transactions[idx].context();
        info!(title = %context.title, "redo");

        self.broadcast(&TransactionEvent::BeforeUndoRedo {
            context: context.clone(),
        });
        self.transactions[idx].apply();
        self.broadcast(&TransactionEvent::Redone {
            context,
            success: true,
        });

        self.check_state();
        true
    }

    /// Context of the next undo, or a context titled with the reason it is unavailable.
    pub fn undo_context(&self, check_whether_possible: bool) -> UndoSessionContext {
        if check_whether_possible {
            if let Err(reason) = self.can_undo() {
                return UndoSessionContext {
                    title: reason.to_string(),
                    ..UndoSessionContext::default()
                };
            }
        }
        self.transactions
            .len()
            .checked_sub(self.undo_count + 1)
            .map(|idx| self.transactions[idx].context())
            .unwrap_or_default()
    }

    /// Context of the next redo, or a context titled with the reason it is unavailable.
    pub fn redo_context(&self) -> UndoSessionContext {
        if let Err(reason) = self.can_redo() {
            return UndoSessionContext {
                title: reason.to_string(),
                ..UndoSessionContext::default()
            };
        }
        self.transactions[self.transactions.len() - self.undo_count].context()
    }

    /// Transaction at `index`, oldest first.
    pub fn get_transaction(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    /// Number of transactions held, including redoable ones.
    pub fn queue_len(&self) -> usize {
        self.transactions.len()
    }

    /// Number of undone transactions that can be redone.
    pub fn undo_count(&self) -> usize {
        self.undo_count
    }

    /// Current nesting depth.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// True while a recording bracket is open.
    pub fn is_active(&self) -> bool {
        self.active_count > 0
    }

    /// Reason passed to the last reset.
    pub fn reset_reason(&self) -> &str {
        &self.reset_reason
    }

    /// Sum of the captured bytes of every transaction.
    pub fn undo_size(&self) -> usize {
        self.transactions.iter().map(Transaction::data_size).sum()
    }

    /// Memory budget enforced at `begin`.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// A standalone, non-flipping transaction for one-shot restores.
    ///
    /// It is not part of the history and is never evicted.
    pub fn create_internal_transaction(&self) -> Transaction {
        Transaction::new("Internal", "", false)
    }

    /// Stops reporting references to collectors. Calls nest.
    pub fn suspend_reference_reporting(&mut self) {
        self.suspended_reporting += 1;
    }

    /// Undoes one [`TransactionBuffer::suspend_reference_reporting`].
    /// Returns true once reporting is enabled again.
    pub fn resume_reference_reporting(&mut self) -> bool {
        self.suspended_reporting = self.suspended_reporting.saturating_sub(1);
        self.suspended_reporting == 0
    }

    /// True unless reporting is suspended.
    pub fn reports_references(&self) -> bool {
        self.suspended_reporting == 0
    }

    /// Reports every object held by the history so a collector can treat
    /// the buffer as a root set.
    pub fn add_referenced_objects(&self, collector: &mut dyn ReferenceCollector) {
        self.check_state();
        if !self.reports_references() {
            return;
        }
        for transaction in &self.transactions {
            transaction.add_referenced_objects(collector);
        }
    }

    /// Distinct objects held by the history.
    pub fn referenced_objects(&self) -> HashSet<ObjectRef> {
        let mut out = HashSet::new();
        self.add_referenced_objects(&mut out);
        out
    }

    /// Registers an event listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&TransactionEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Serializable summary for diagnostics.
    pub fn summary(&self) -> BufferSummary {
        BufferSummary {
            transactions: self
                .transactions
                .iter()
                .map(|t| {
                    let ctx = t.context();
                    TransactionSummary {
                        title: ctx.title,
                        context: ctx.context,
                        records: t.len(),
                        data_size: t.data_size(),
                    }
                })
                .collect(),
            undo_count: self.undo_count,
            active_count: self.active_count,
            reset_reason: self.reset_reason.clone(),
            undo_size: self.undo_size(),
        }
    }

    fn current_transaction(&self) -> Option<&Transaction> {
        self.current.and_then(|idx| self.transactions.get(idx))
    }

    fn current_transaction_mut(&mut self) -> Option<&mut Transaction> {
        self.current.and_then(|idx| self.transactions.get_mut(idx))
    }

    fn broadcast(&mut self, event: &TransactionEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    fn check_state(&self) {
        debug_assert!(self.transactions.len() >= self.undo_count);
        debug_assert_eq!(self.active_count, self.depth_marks.len());
        debug_assert_eq!(self.current.is_some(), self.active_count > 0);
    }
}
