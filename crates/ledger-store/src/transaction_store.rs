//! Durable store for Transaction rows (part of C1's schema, §6).

use std::sync::Arc;

use ledger_core::{
    Balance, Cursor, CursorDirection, LedgerError, LedgerId, Operation, Transaction, TransactionId,
    DEFAULT_PAGE_LIMIT,
};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::warn;

use crate::db::{ledger_sorted_key, StoreDb};

fn storage_err(e: impl ToString) -> LedgerError {
    LedgerError::StoreUnavailable(e.to_string())
}

fn tx_err(e: TransactionError<LedgerError>) -> LedgerError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => LedgerError::StoreUnavailable(e.to_string()),
    }
}

pub struct TransactionStore {
    db: Arc<StoreDb>,
}

impl TransactionStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    pub fn create(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let bytes = bincode::serialize(tx).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let ledger_key = ledger_sorted_key(&tx.ledger_id, tx.created_at, tx.id.as_uuid());

        (&self.db.transactions, &self.db.transactions_by_ledger)
            .transaction(|(txs, by_ledger)| {
                txs.insert(tx.id.as_uuid().as_bytes().as_slice(), bytes.as_slice())?;
                by_ledger.insert(ledger_key.as_slice(), &[][..])?;
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, LedgerError> {
        match self.db.transactions.get(id.as_uuid().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Step 7 of §4.6/§4.7: durably commit a transaction row together with
    /// every operation it produced and the balance mutations those
    /// operations cause, in one sled transaction spanning all three entities.
    /// `tx` is written as given (callers pass it in its final status), so a
    /// crash can never observe balances moved with the transaction still
    /// `PENDING`, or the reverse. Balance rows are applied with the same
    /// optimistic-lock rules as [`crate::balance_store::BalanceStore::batch_update`]:
    /// a stale or deleted row is skipped rather than aborting the whole
    /// commit, and `NoBalancesUpdated` is returned only if none applied.
    pub fn commit(&self, tx: &Transaction, ops: &[Operation], new_balances: &[Balance]) -> Result<(), LedgerError> {
        let tx_bytes = bincode::serialize(tx).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let ledger_key = ledger_sorted_key(&tx.ledger_id, tx.created_at, tx.id.as_uuid());

        let mut op_rows = Vec::with_capacity(ops.len());
        for op in ops {
            let bytes = bincode::serialize(op).map_err(|e| LedgerError::Serialization(e.to_string()))?;
            let mut by_tx_key = op.transaction_id.as_uuid().as_bytes().to_vec();
            by_tx_key.extend_from_slice(op.id.as_uuid().as_bytes());
            op_rows.push((*op.id.as_uuid(), bytes, by_tx_key));
        }

        let mut applied = 0usize;
        (
            &self.db.transactions,
            &self.db.transactions_by_ledger,
            &self.db.operations,
            &self.db.operations_by_tx,
            &self.db.balances,
        )
            .transaction(|(txs, by_ledger, operations, ops_by_tx, balances)| {
                txs.insert(tx.id.as_uuid().as_bytes().as_slice(), tx_bytes.as_slice())?;
                by_ledger.insert(ledger_key.as_slice(), &[][..])?;

                for (op_id, bytes, by_tx_key) in &op_rows {
                    operations.insert(op_id.as_bytes().as_slice(), bytes.as_slice())?;
                    ops_by_tx.insert(by_tx_key.as_slice(), &[][..])?;
                }

                for b in new_balances {
                    let key = b.id.as_uuid().as_bytes();
                    let current = balances.get(key)?;
                    let current: Option<Balance> = match current {
                        Some(bytes) => Some(bincode::deserialize(&bytes).map_err(|e| {
                            ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string()))
                        })?),
                        None => None,
                    };
                    let Some(current) = current else { continue };
                    if current.deleted_at.is_some() || current.version >= b.version {
                        warn!(
                            balance_id = %b.id,
                            stored_version = current.version,
                            attempted_version = b.version,
                            "commit: stale balance snapshot skipped"
                        );
                        continue;
                    }
                    let mut next = current;
                    next.available = b.available;
                    next.on_hold = b.on_hold;
                    next.version = b.version;
                    next.updated_at = b.updated_at;
                    let bytes = bincode::serialize(&next).map_err(|e| {
                        ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string()))
                    })?;
                    balances.insert(key, bytes)?;
                    applied += 1;
                }
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)?;

        if !new_balances.is_empty() && applied == 0 {
            return Err(LedgerError::NoBalancesUpdated);
        }
        Ok(())
    }

    /// Replace a transaction in place — used for status transitions and
    /// description/metadata edits, never for `sources`/`destinations`.
    pub fn update(&self, tx: &Transaction) -> Result<(), LedgerError> {
        if self.find_by_id(&tx.id)?.is_none() {
            return Err(LedgerError::EntityNotFound(format!("transaction {}", tx.id)));
        }
        let bytes = bincode::serialize(tx).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.db
            .transactions
            .insert(tx.id.as_uuid().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Full scan for `PENDING` rows — used only by the startup crash-recovery
    /// sweep (§9), never on a request path.
    pub fn list_pending(&self) -> Result<Vec<Transaction>, LedgerError> {
        let mut out = Vec::new();
        for item in self.db.transactions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let tx: Transaction =
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?;
            if tx.status == ledger_core::TransactionStatus::Pending {
                out.push(tx);
            }
        }
        Ok(out)
    }

    pub fn list_by_ledger(
        &self,
        ledger_id: &LedgerId,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<(Vec<Transaction>, Option<String>), LedgerError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        let prefix = ledger_id.as_uuid().as_bytes().to_vec();
        let mut ids = Vec::new();
        for item in self.db.transactions_by_ledger.scan_prefix(prefix) {
            let (key, _) = item.map_err(storage_err)?;
            let id_bytes = &key[key.len() - 16..];
            ids.push(TransactionId::from_uuid(
                uuid::Uuid::from_slice(id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            ));
        }
        let mut all = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(tx) = self.find_by_id(id)? {
                all.push(tx);
            }
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_uuid().cmp(b.id.as_uuid())));

        let start = match cursor {
            Some(c) => {
                let cur = Cursor::decode(c)?;
                match cur.direction {
                    CursorDirection::Next => all.iter().position(|t| t.id.as_uuid() == &cur.last_id).map(|i| i + 1).unwrap_or(0),
                    CursorDirection::Previous => all.iter().position(|t| t.id.as_uuid() == &cur.last_id).unwrap_or(0),
                }
            }
            None => 0,
        };

        let page: Vec<Transaction> = all.into_iter().skip(start).take(limit).collect();
        let next_cursor = if page.len() == limit {
            page.last()
                .map(|t| {
                    Cursor {
                        last_id: *t.id.as_uuid(),
                        direction: CursorDirection::Next,
                    }
                    .encode()
                })
                .transpose()?
        } else {
            None
        };
        Ok((page, next_cursor))
    }
}
