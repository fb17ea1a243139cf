//! C1 — the durable Balance Store. §4.1 of the ledger spec.

use std::sync::Arc;

use ledger_core::{
    AccountId, Balance, BalanceId, BalanceKey, Cursor, CursorDirection, LedgerError, LedgerId,
    Timestamp, DEFAULT_PAGE_LIMIT,
};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::warn;

use crate::db::{acct_key_index_key, alias_index_key, ledger_sorted_key, StoreDb};

fn ser(b: &Balance) -> Result<Vec<u8>, LedgerError> {
    bincode::serialize(b).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn deser(bytes: &[u8]) -> Result<Balance, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn storage_err(e: impl ToString) -> LedgerError {
    LedgerError::StoreUnavailable(e.to_string())
}

pub struct BalanceStore {
    db: Arc<StoreDb>,
}

impl BalanceStore {
    pub fn new(db: Arc<StoreDb>) -> Self {
        Self { db }
    }

    pub fn create(&self, balance: &Balance) -> Result<(), LedgerError> {
        if self.exists_by_account_and_key(&balance.account_id, &balance.key)? {
            return Err(LedgerError::AlreadyExists(format!(
                "balance for account {} key {}",
                balance.account_id, balance.key
            )));
        }
        if !balance.key.is_default() {
            if balance.account_type == ledger_core::AccountType::External {
                return Err(LedgerError::ValidationError(format!(
                    "account {} is EXTERNAL and may hold only the default key",
                    balance.account_id
                )));
            }
            if !self.exists_by_account_and_key(&balance.account_id, &BalanceKey::default_key())? {
                return Err(LedgerError::EntityNotFound(format!(
                    "default balance must be created first for account {}",
                    balance.account_id
                )));
            }
        }
        let bytes = ser(balance)?;
        let acct_key = acct_key_index_key(&balance.account_id, &balance.key);
        let ledger_key = ledger_sorted_key(&balance.ledger_id, balance.created_at, balance.id.as_uuid());
        let alias_key = alias_index_key(&balance.alias, &balance.key);

        (
            &self.db.balances,
            &self.db.balances_by_acct_key,
            &self.db.balances_by_ledger,
            &self.db.balances_by_alias,
        )
            .transaction(|(balances, by_acct, by_ledger, by_alias)| {
                balances.insert(balance.id.as_uuid().as_bytes().as_slice(), bytes.as_slice())?;
                by_acct.insert(acct_key.as_slice(), balance.id.as_uuid().as_bytes().as_slice())?;
                by_ledger.insert(ledger_key.as_slice(), &[][..])?;
                by_alias.insert(alias_key.as_slice(), balance.id.as_uuid().as_bytes().as_slice())?;
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)?;
        Ok(())
    }

    pub fn find_by_id(&self, id: &BalanceId) -> Result<Option<Balance>, LedgerError> {
        match self.db.balances.get(id.as_uuid().as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(deser(&b)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_account_and_key(
        &self,
        account_id: &AccountId,
        key: &BalanceKey,
    ) -> Result<Option<Balance>, LedgerError> {
        let idx_key = acct_key_index_key(account_id, key);
        match self.db.balances_by_acct_key.get(idx_key).map_err(storage_err)? {
            Some(id_bytes) => {
                let id = BalanceId::from_uuid(uuid::Uuid::from_slice(&id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?);
                self.find_by_id(&id)
            }
            None => Ok(None),
        }
    }

    pub fn exists_by_account_and_key(&self, account_id: &AccountId, key: &BalanceKey) -> Result<bool, LedgerError> {
        let idx_key = acct_key_index_key(account_id, key);
        Ok(self.db.balances_by_acct_key.contains_key(idx_key).map_err(storage_err)?)
    }

    pub fn list_by_account_ids(&self, account_ids: &[AccountId]) -> Result<Vec<Balance>, LedgerError> {
        let mut out = Vec::new();
        for acct in account_ids {
            let prefix = acct.as_uuid().as_bytes().to_vec();
            for item in self.db.balances_by_acct_key.scan_prefix(prefix) {
                let (_, id_bytes) = item.map_err(storage_err)?;
                let id = BalanceId::from_uuid(uuid::Uuid::from_slice(&id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?);
                if let Some(b) = self.find_by_id(&id)? {
                    out.push(b);
                }
            }
        }
        Ok(out)
    }

    pub fn list_by_aliases(&self, aliases: &[ledger_core::Alias]) -> Result<Vec<Balance>, LedgerError> {
        let mut out = Vec::new();
        for alias in aliases {
            let prefix = {
                let mut v = alias.0.as_bytes().to_vec();
                v.push(0u8);
                v
            };
            for item in self.db.balances_by_alias.scan_prefix(prefix) {
                let (_, id_bytes) = item.map_err(storage_err)?;
                let id = BalanceId::from_uuid(uuid::Uuid::from_slice(&id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?);
                if let Some(b) = self.find_by_id(&id)? {
                    out.push(b);
                }
            }
        }
        Ok(out)
    }

    pub fn list_by_alias_key_pairs(
        &self,
        pairs: &[(ledger_core::Alias, BalanceKey)],
    ) -> Result<Vec<Balance>, LedgerError> {
        let mut out = Vec::with_capacity(pairs.len());
        for (alias, key) in pairs {
            let idx_key = alias_index_key(alias, key);
            match self.db.balances_by_alias.get(idx_key).map_err(storage_err)? {
                Some(id_bytes) => {
                    let id = BalanceId::from_uuid(uuid::Uuid::from_slice(&id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?);
                    match self.find_by_id(&id)? {
                        Some(b) => out.push(b),
                        None => return Err(LedgerError::EntityNotFound(format!("balance {alias}#{key}"))),
                    }
                }
                None => return Err(LedgerError::EntityNotFound(format!("balance {alias}#{key}"))),
            }
        }
        Ok(out)
    }

    /// Cursor-paginated, ordered by `createdAt`, scoped to a single account.
    pub fn list_all_by_account(
        &self,
        account_id: &AccountId,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<(Vec<Balance>, Option<String>), LedgerError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        let all = self.list_by_account_ids(std::slice::from_ref(account_id))?;
        paginate_by_created_at(all, cursor, limit)
    }

    /// Cursor-paginated, ordered by `createdAt`, scoped to a ledger.
    pub fn list_all_by_ledger(
        &self,
        ledger_id: &LedgerId,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<(Vec<Balance>, Option<String>), LedgerError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        let prefix = ledger_id.as_uuid().as_bytes().to_vec();
        let mut ids = Vec::new();
        for item in self.db.balances_by_ledger.scan_prefix(prefix) {
            let (key, _) = item.map_err(storage_err)?;
            let id_bytes = &key[key.len() - 16..];
            ids.push(BalanceId::from_uuid(
                uuid::Uuid::from_slice(id_bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?,
            ));
        }
        let mut all = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(b) = self.find_by_id(id)? {
                all.push(b);
            }
        }
        paginate_by_created_at(all, cursor, limit)
    }

    /// The central primitive (§4.1): optimistic-locking batch commit.
    ///
    /// For each input, the stored row is updated iff `stored.version <
    /// input.version && stored.deleted_at.is_none()`. If every row in the
    /// batch was stale, the whole batch fails with `NoBalancesUpdated`;
    /// otherwise rows that didn't match are silently skipped (logged).
    pub fn batch_update(&self, balances: &[Balance]) -> Result<(), LedgerError> {
        if balances.is_empty() {
            return Ok(());
        }
        let mut applied = 0usize;

        self.db
            .balances
            .transaction(|balances_tree| {
                for b in balances {
                    let key = b.id.as_uuid().as_bytes();
                    let current = balances_tree.get(key)?;
                    let current: Option<Balance> = match current {
                        Some(bytes) => Some(
                            bincode::deserialize(&bytes)
                                .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?,
                        ),
                        None => None,
                    };
                    let Some(current) = current else { continue };
                    if current.deleted_at.is_some() || current.version >= b.version {
                        warn!(balance_id = %b.id, stored_version = current.version, attempted_version = b.version, "batch_update: stale row skipped");
                        continue;
                    }
                    let mut next = current;
                    next.available = b.available;
                    next.on_hold = b.on_hold;
                    next.version = b.version;
                    next.updated_at = b.updated_at;
                    let bytes = bincode::serialize(&next)
                        .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                    balances_tree.insert(key, bytes)?;
                    applied += 1;
                }
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)?;

        if applied == 0 {
            return Err(LedgerError::NoBalancesUpdated);
        }
        Ok(())
    }

    pub fn update_flags(
        &self,
        id: &BalanceId,
        allow_sending: Option<bool>,
        allow_receiving: Option<bool>,
    ) -> Result<(), LedgerError> {
        self.db
            .balances
            .transaction(|balances_tree| {
                let bytes = balances_tree.get(id.as_uuid().as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(LedgerError::EntityNotFound(format!("balance {id}")))
                })?;
                let mut b: Balance = bincode::deserialize(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                if let Some(v) = allow_sending {
                    b.allow_sending = v;
                }
                if let Some(v) = allow_receiving {
                    b.allow_receiving = v;
                }
                let bytes = bincode::serialize(&b)
                    .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                balances_tree.insert(id.as_uuid().as_bytes(), bytes)?;
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)
    }

    pub fn update_all_flags_by_account(
        &self,
        account_id: &AccountId,
        allow_sending: bool,
        allow_receiving: bool,
    ) -> Result<(), LedgerError> {
        let rows = self.list_by_account_ids(std::slice::from_ref(account_id))?;
        for b in rows {
            self.update_flags(&b.id, Some(allow_sending), Some(allow_receiving))?;
        }
        Ok(())
    }

    /// Soft delete with the zero-balance precondition enforced by the caller
    /// (executor); the store itself re-checks it for defense in depth.
    pub fn delete(&self, id: &BalanceId, now: Timestamp) -> Result<(), LedgerError> {
        self.db
            .balances
            .transaction(|balances_tree| {
                let bytes = balances_tree.get(id.as_uuid().as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(LedgerError::EntityNotFound(format!("balance {id}")))
                })?;
                let mut b: Balance = bincode::deserialize(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                if !b.is_zeroed() {
                    return Err(ConflictableTransactionError::Abort(LedgerError::BalancesCantBeDeleted(
                        id.to_string(),
                    )));
                }
                b.deleted_at = Some(now);
                b.updated_at = now;
                let bytes = bincode::serialize(&b)
                    .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                balances_tree.insert(id.as_uuid().as_bytes(), bytes)?;
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            })
            .map_err(tx_err)
    }

    /// Transactional bulk soft delete. Fails atomically with `PartialDelete`
    /// if fewer rows matched than were requested.
    pub fn delete_all_by_ids(&self, ids: &[BalanceId], now: Timestamp) -> Result<(), LedgerError> {
        let requested = ids.len();
        let mut deleted = 0usize;

        let result = self.db.balances.transaction(|balances_tree| {
            let mut staged = Vec::new();
            for id in ids {
                let Some(bytes) = balances_tree.get(id.as_uuid().as_bytes())? else { continue };
                let mut b: Balance = bincode::deserialize(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                if !b.is_zeroed() {
                    return Err(ConflictableTransactionError::Abort(LedgerError::BalancesCantBeDeleted(
                        id.to_string(),
                    )));
                }
                b.deleted_at = Some(now);
                b.updated_at = now;
                staged.push((*id, b));
            }
            deleted = staged.len();
            for (id, b) in &staged {
                let bytes = bincode::serialize(b)
                    .map_err(|e| ConflictableTransactionError::Abort(LedgerError::Serialization(e.to_string())))?;
                balances_tree.insert(id.as_uuid().as_bytes(), bytes)?;
            }
            Ok::<(), ConflictableTransactionError<LedgerError>>(())
        });
        result.map_err(tx_err)?;

        if deleted < requested {
            return Err(LedgerError::PartialDelete { requested, deleted });
        }
        Ok(())
    }

    /// Write-through from C2: applies iff `stored.version < b.version`.
    /// Returns whether the write was applied.
    pub fn sync_from_cache(&self, b: &Balance) -> Result<bool, LedgerError> {
        match self.batch_update(std::slice::from_ref(b)) {
            Ok(()) => Ok(true),
            Err(LedgerError::NoBalancesUpdated) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn tx_err(e: TransactionError<LedgerError>) -> LedgerError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => LedgerError::StoreUnavailable(e.to_string()),
    }
}

fn paginate_by_created_at(
    mut all: Vec<Balance>,
    cursor: Option<&str>,
    limit: usize,
) -> Result<(Vec<Balance>, Option<String>), LedgerError> {
    all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_uuid().cmp(b.id.as_uuid())));

    let start = match cursor {
        Some(c) => {
            let cur = Cursor::decode(c)?;
            match cur.direction {
                CursorDirection::Next => all.iter().position(|b| b.id.as_uuid() == &cur.last_id).map(|i| i + 1).unwrap_or(0),
                CursorDirection::Previous => all.iter().position(|b| b.id.as_uuid() == &cur.last_id).unwrap_or(0),
            }
        }
        None => 0,
    };

    let page: Vec<Balance> = all.into_iter().skip(start).take(limit).collect();
    let next_cursor = if page.len() == limit {
        page.last().map(|b| {
            Cursor {
                last_id: *b.id.as_uuid(),
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
