//! C8 — event emitter. Two fire-and-forget streams: transaction status
//! events and audit records of committed operations. A publish failure is
//! logged and swallowed; it must never propagate into C6/C7 — the reference
//! source's fatal-log-that-terminates-the-runtime bug (§9) is exactly what
//! this crate avoids.

use ledger_core::{Operation, Transaction, TransactionStatus};
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct TransactionEvent {
    pub transaction_id: ledger_core::TransactionId,
    pub status: TransactionStatus,
}

#[derive(Clone, Debug)]
pub struct AuditRecord {
    pub transaction_id: ledger_core::TransactionId,
    pub operations: Vec<Operation>,
}

pub struct EventEmitter {
    events_tx: broadcast::Sender<TransactionEvent>,
    audit_tx: broadcast::Sender<AuditRecord>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        let (audit_tx, _) = broadcast::channel(capacity);
        Self { events_tx, audit_tx }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TransactionEvent> {
        self.events_tx.subscribe()
    }

    pub fn subscribe_audit(&self) -> broadcast::Receiver<AuditRecord> {
        self.audit_tx.subscribe()
    }

    /// Publish the outcome of a committed (or declined) transaction. Never
    /// fails the caller: a missing subscriber is not an error.
    pub fn emit_transaction(&self, tx: &Transaction) {
        let event = TransactionEvent {
            transaction_id: tx.id,
            status: tx.status.clone(),
        };
        if self.events_tx.send(event).is_err() {
            warn!(transaction_id = %tx.id, "no subscribers for transaction events");
        }
    }

    pub fn emit_audit(&self, transaction_id: ledger_core::TransactionId, operations: Vec<Operation>) {
        let record = AuditRecord { transaction_id, operations };
        if self.audit_tx.send(record).is_err() {
            warn!(%transaction_id, "no subscribers for audit records");
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1024)
    }
}
