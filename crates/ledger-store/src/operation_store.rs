//! Durable store for Operation rows — immutable after creation (§3).

use std::sync::Arc;

use ledger_core::{LedgerError, Operation, OperationId, TransactionId};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};

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

pub struct OperationStore {
    db: Arc<StoreDb>,
}

impl OperationStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    pub fn create(&self, op: &Operation) -> Result<(), LedgerError> {
        let bytes = bincode::serialize(op).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let mut by_tx_key = op.transaction_id.as_uuid().as_bytes().to_vec();
        by_tx_key.extend_from_slice(op.id.as_uuid().as_bytes());

        (&self.db.operations, &self.db.operations_by_tx)
            .transaction(|(ops, by_tx)| {
                ops.insert(op.id.as_uuid().as_bytes().as_slice(), bytes.as_slice())?;
                by_tx.insert(by_tx_key.as_slice(), &[][..])?;
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)?;
        Ok(())
    }

    pub fn create_batch(&self, ops: &[Operation]) -> Result<(), LedgerError> {
        for op in ops {
            self.create(op)?;
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, LedgerError> {
        match self.db.operations.get(id.as_uuid().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn list_by_transaction(&self, tx_id: &TransactionId) -> Result<Vec<Operation>, LedgerError> {
        let prefix = tx_id.as_uuid().as_bytes().to_vec();
        let mut out = Vec::new();
        for item in self.db.operations_by_tx.scan_prefix(prefix) {
            let (key, _) = item.map_err(storage_err)?;
            let id_bytes = &key[key.len() - 16..];
            let id = OperationId::from_uuid(uuid::Uuid::from_slice(id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?);
            if let Some(op) = self.find_by_id(&id)? {
                out.push(op);
            }
        }
        Ok(out)
    }
}
