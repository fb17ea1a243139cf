//! Durable store for RouteRecord rows backing C9/C3.

use std::sync::Arc;

use ledger_core::{LedgerError, LedgerId, RouteRecord, RouteId};
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

pub struct RouteStore {
    db: Arc<StoreDb>,
}

impl RouteStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    pub fn upsert(&self, route: &RouteRecord) -> Result<(), LedgerError> {
        let bytes = bincode::serialize(route).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let mut by_ledger_key = route.ledger_id.as_uuid().as_bytes().to_vec();
        by_ledger_key.extend_from_slice(route.id.as_uuid().as_bytes());

        (&self.db.routes, &self.db.routes_by_ledger)
            .transaction(|(routes, by_ledger)| {
                routes.insert(route.id.as_uuid().as_bytes().as_slice(), bytes.as_slice())?;
                by_ledger.insert(by_ledger_key.as_slice(), &[][..])?;
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &RouteId) -> Result<Option<RouteRecord>, LedgerError> {
        match self.db.routes.get(id.as_uuid().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn list_by_ledger(&self, ledger_id: &LedgerId) -> Result<Vec<RouteRecord>, LedgerError> {
        let prefix = ledger_id.as_uuid().as_bytes().to_vec();
        let mut out = Vec::new();
        for item in self.db.routes_by_ledger.scan_prefix(prefix) {
            let (key, _) = item.map_err(storage_err)?;
            let id_bytes = &key[key.len() - 16..];
            let id = RouteId::from_uuid(uuid::Uuid::from_slice(id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?);
            if let Some(r) = self.find_by_id(&id)? {
                out.push(r);
            }
        }
        Ok(out)
    }
}
