//! Durable tier of C4. Written through on every reservation and completion
//! so the crash-recovery sweep (§9) can find `COMPLETED` slots after restart.

use std::sync::Arc;

use ledger_core::{IdempotencySlot, IdempotencySlotState, LedgerError, LedgerId, OrgId};
use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::db::StoreDb;

fn storage_err(e: impl ToString) -> LedgerError {
    LedgerError::StoreUnavailable(e.to_string())
}

fn tx_err(e: TransactionError<LedgerError>) -> LedgerError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => LedgerError::StoreUnavailable(e.to_string()),
    }
}

fn slot_key(org_id: &OrgId, ledger_id: &LedgerId, key: &str) -> Vec<u8> {
    let mut v = org_id.as_uuid().as_bytes().to_vec();
    v.extend_from_slice(ledger_id.as_uuid().as_bytes());
    v.extend_from_slice(key.as_bytes());
    v
}

pub struct IdempotencyStore {
    db: Arc<StoreDb>,
}

impl IdempotencyStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    pub fn find(&self, org_id: &OrgId, ledger_id: &LedgerId, key: &str) -> Result<Option<IdempotencySlot>, LedgerError> {
        match self.db.idempotency.get(slot_key(org_id, ledger_id, key)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Atomic test-and-set: reserves the slot iff absent or expired.
    /// Returns the existing slot when a live reservation already exists.
    pub fn reserve(
        &self,
        org_id: &OrgId,
        ledger_id: &LedgerId,
        key: &str,
        expires_at: ledger_core::Timestamp,
        now: ledger_core::Timestamp,
    ) -> Result<ledger_core::ReserveOutcome, LedgerError> {
        let db_key = slot_key(org_id, ledger_id, key);
        let new_slot = IdempotencySlot {
            key: key.to_string(),
            state: IdempotencySlotState::Reserved,
            transaction_id: None,
            result: None,
            expires_at,
        };
        let new_bytes = bincode::serialize(&new_slot).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let outcome = self
            .db
            .idempotency
            .transaction(move |tree| {
                if let Some(existing) = tree.get(&db_key)? {
                    let slot: IdempotencySlot = bincode::deserialize(&existing)
                        .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                    if slot.expires_at > now {
                        return Ok(ledger_core::ReserveOutcome::Existing(slot));
                    }
                }
                tree.insert(db_key.clone(), new_bytes.clone())?;
                Ok(ledger_core::ReserveOutcome::ReservedNew)
            })
            .map_err(tx_err)?;
        Ok(outcome)
    }

    pub fn complete(
        &self,
        org_id: &OrgId,
        ledger_id: &LedgerId,
        key: &str,
        transaction_id: ledger_core::TransactionId,
        result: ledger_core::Transaction,
    ) -> Result<(), LedgerError> {
        let db_key = slot_key(org_id, ledger_id, key);
        let mut slot = self
            .find(org_id, ledger_id, key)?
            .ok_or_else(|| LedgerError::EntityNotFound(format!("idempotency slot {key}")))?;
        slot.state = IdempotencySlotState::Completed;
        slot.transaction_id = Some(transaction_id);
        slot.result = Some(result);
        let bytes = bincode::serialize(&slot).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.db.idempotency.insert(db_key, bytes).map_err(storage_err)?;
        Ok(())
    }
}
