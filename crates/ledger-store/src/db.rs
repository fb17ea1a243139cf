use std::path::Path;

use ledger_core::LedgerError;

/// Durable state database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   balances              — BalanceId bytes                    → bincode(Balance)
///   balances_by_acct_key  — AccountId || 0x00 || key utf8       → BalanceId bytes   (secondary index)
///   balances_by_ledger    — LedgerId || createdAt be || BalanceId → []             (sorted index)
///   balances_by_alias     — alias utf8 || 0x00 || key utf8      → BalanceId bytes   (secondary index)
///   transactions          — TransactionId bytes                 → bincode(Transaction)
///   transactions_by_ledger— LedgerId || createdAt be || TxId     → []               (sorted index)
///   operations            — OperationId bytes                   → bincode(Operation)
///   operations_by_tx      — TransactionId || OperationId         → []
///   routes                — RouteId bytes                       → bincode(RouteRecord)
///   routes_by_ledger      — LedgerId || RouteId                  → []
///   idempotency           — OrgId || LedgerId || key utf8        → bincode(IdempotencySlot)
pub struct StoreDb {
    _db: sled::Db,
    pub(crate) balances: sled::Tree,
    pub(crate) balances_by_acct_key: sled::Tree,
    pub(crate) balances_by_ledger: sled::Tree,
    pub(crate) balances_by_alias: sled::Tree,
    pub(crate) transactions: sled::Tree,
    pub(crate) transactions_by_ledger: sled::Tree,
    pub(crate) operations: sled::Tree,
    pub(crate) operations_by_tx: sled::Tree,
    pub(crate) routes: sled::Tree,
    pub(crate) routes_by_ledger: sled::Tree,
    pub(crate) idempotency: sled::Tree,
}

fn storage_err(e: impl ToString) -> LedgerError {
    LedgerError::StoreUnavailable(e.to_string())
}

impl StoreDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            balances: db.open_tree("balances").map_err(storage_err)?,
            balances_by_acct_key: db.open_tree("balances_by_acct_key").map_err(storage_err)?,
            balances_by_ledger: db.open_tree("balances_by_ledger").map_err(storage_err)?,
            balances_by_alias: db.open_tree("balances_by_alias").map_err(storage_err)?,
            transactions: db.open_tree("transactions").map_err(storage_err)?,
            transactions_by_ledger: db.open_tree("transactions_by_ledger").map_err(storage_err)?,
            operations: db.open_tree("operations").map_err(storage_err)?,
            operations_by_tx: db.open_tree("operations_by_tx").map_err(storage_err)?,
            routes: db.open_tree("routes").map_err(storage_err)?,
            routes_by_ledger: db.open_tree("routes_by_ledger").map_err(storage_err)?,
            idempotency: db.open_tree("idempotency").map_err(storage_err)?,
            _db: db,
        })
    }

    /// Open a temporary, throwaway database. Used by tests across the
    /// workspace that need a real sled backend without a fixture path.
    pub fn open_temp() -> Result<Self, LedgerError> {
        let cfg = sled::Config::new().temporary(true);
        let db = cfg.open().map_err(storage_err)?;
        Ok(Self {
            balances: db.open_tree("balances").map_err(storage_err)?,
            balances_by_acct_key: db.open_tree("balances_by_acct_key").map_err(storage_err)?,
            balances_by_ledger: db.open_tree("balances_by_ledger").map_err(storage_err)?,
            balances_by_alias: db.open_tree("balances_by_alias").map_err(storage_err)?,
            transactions: db.open_tree("transactions").map_err(storage_err)?,
            transactions_by_ledger: db.open_tree("transactions_by_ledger").map_err(storage_err)?,
            operations: db.open_tree("operations").map_err(storage_err)?,
            operations_by_tx: db.open_tree("operations_by_tx").map_err(storage_err)?,
            routes: db.open_tree("routes").map_err(storage_err)?,
            routes_by_ledger: db.open_tree("routes_by_ledger").map_err(storage_err)?,
            idempotency: db.open_tree("idempotency").map_err(storage_err)?,
            _db: db,
        })
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

/// `created_at` encoded big-endian so lexicographic byte order == time order.
pub(crate) fn sortable_timestamp(ts: ledger_core::Timestamp) -> [u8; 8] {
    ts.timestamp_micros().to_be_bytes()
}

pub(crate) fn acct_key_index_key(account_id: &ledger_core::AccountId, key: &ledger_core::BalanceKey) -> Vec<u8> {
    let mut v = account_id.as_uuid().as_bytes().to_vec();
    v.push(0u8);
    v.extend_from_slice(key.0.as_bytes());
    v
}

pub(crate) fn alias_index_key(alias: &ledger_core::Alias, key: &ledger_core::BalanceKey) -> Vec<u8> {
    let mut v = alias.0.as_bytes().to_vec();
    v.push(0u8);
    v.extend_from_slice(key.0.as_bytes());
    v
}

pub(crate) fn ledger_sorted_key(ledger_id: &ledger_core::LedgerId, created_at: ledger_core::Timestamp, id: &uuid::Uuid) -> Vec<u8> {
    let mut v = ledger_id.as_uuid().as_bytes().to_vec();
    v.extend_from_slice(&sortable_timestamp(created_at));
    v.extend_from_slice(id.as_bytes());
    v
}
