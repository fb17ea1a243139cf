use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;
use crate::types::Timestamp;

/// `(key, state, transactionID?, result?, expiresAt)` — a per-client-key slot
/// that is either an in-flight reservation or a completed result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum IdempotencySlotState {
    Reserved,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencySlot {
    pub key: String,
    pub state: IdempotencySlotState,
    pub transaction_id: Option<crate::types::TransactionId>,
    pub result: Option<Transaction>,
    pub expires_at: Timestamp,
}

/// Outcome of `reserveOrFetch`.
#[derive(Debug)]
pub enum ReserveOutcome {
    ReservedNew,
    Existing(IdempotencySlot),
}
