pub mod balance_store;
pub mod db;
pub mod idempotency_store;
pub mod operation_store;
pub mod route_store;
pub mod transaction_store;

pub use balance_store::BalanceStore;
pub use db::StoreDb;
pub use idempotency_store::IdempotencyStore;
pub use operation_store::OperationStore;
pub use route_store::RouteStore;
pub use transaction_store::TransactionStore;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ledger_core::{
        AccountId, AccountType, Alias, AssetCode, Balance, BalanceId, BalanceKey, LedgerError,
        LedgerId, Money, OrgId,
    };

    use super::*;

    fn new_balance(account_id: AccountId, ledger_id: LedgerId, alias: &str, available: i64) -> Balance {
        let now = chrono::Utc::now();
        Balance {
            id: BalanceId::new(),
            organization_id: OrgId::new(),
            ledger_id,
            account_id,
            alias: Alias::new(alias),
            key: BalanceKey::default_key(),
            asset_code: AssetCode::new("USD"),
            available: Money::new(available, 0),
            on_hold: Money::ZERO,
            version: 1,
            account_type: AccountType::Deposit,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn create_then_find_round_trips() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        let b = new_balance(account_id, ledger_id, "@a", 100);

        store.create(&b).unwrap();
        let found = store.find_by_id(&b.id).unwrap().unwrap();
        assert_eq!(found.available, Money::new(100, 0));

        assert!(store.exists_by_account_and_key(&account_id, &BalanceKey::default_key()).unwrap());
        assert!(store.create(&b).is_err());
    }

    #[test]
    fn batch_update_all_stale_fails() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        let mut b = new_balance(account_id, ledger_id, "@a", 100);
        b.version = 5;
        store.create(&b).unwrap();

        let mut stale = b.clone();
        stale.version = 5; // not greater than stored version
        stale.available = Money::new(50, 0);
        let err = store.batch_update(&[stale]).unwrap_err();
        assert!(matches!(err, LedgerError::NoBalancesUpdated));
    }

    #[test]
    fn batch_update_highest_version_wins_under_contention() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        let b = new_balance(account_id, ledger_id, "@a", 100);
        store.create(&b).unwrap();

        for v in 2..=11u64 {
            let mut racer = b.clone();
            racer.version = v;
            racer.available = Money::new(v as i64, 0);
            let _ = store.batch_update(&[racer]);
        }

        let final_row = store.find_by_id(&b.id).unwrap().unwrap();
        assert_eq!(final_row.version, 11);
        assert_eq!(final_row.available, Money::new(11, 0));
    }

    #[test]
    fn delete_requires_zero_balance() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        let b = new_balance(account_id, ledger_id, "@a", 100);
        store.create(&b).unwrap();

        let err = store.delete(&b.id, chrono::Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::BalancesCantBeDeleted(_)));

        let mut zeroed = b.clone();
        zeroed.available = Money::ZERO;
        zeroed.version = 2;
        store.batch_update(&[zeroed]).unwrap();
        store.delete(&b.id, chrono::Utc::now()).unwrap();
        assert!(store.find_by_id(&b.id).unwrap().unwrap().is_deleted());
    }

    #[test]
    fn list_all_by_account_paginates() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        // The default-key balance must exist before any other key for the
        // same account can be created.
        store.create(&new_balance(account_id, ledger_id, "@a", 1)).unwrap();
        for i in 0..2 {
            let mut b = new_balance(account_id, ledger_id, "@a", 1);
            b.key = BalanceKey(format!("k{i}"));
            store.create(&b).unwrap();
        }
        let (page, cursor) = store.list_all_by_account(&account_id, None, Some(2)).unwrap();
        assert_eq!(page.len(), 2);
        assert!(cursor.is_some());
        let (page2, cursor2) = store.list_all_by_account(&account_id, cursor.as_deref(), Some(2)).unwrap();
        assert_eq!(page2.len(), 1);
        assert!(cursor2.is_none());
    }

    #[test]
    fn create_with_non_default_key_requires_default_first() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        let mut savings = new_balance(account_id, ledger_id, "@a", 1);
        savings.key = BalanceKey("savings".to_string());

        let err = store.create(&savings).unwrap_err();
        assert!(matches!(err, LedgerError::EntityNotFound(_)));

        store.create(&new_balance(account_id, ledger_id, "@a", 0)).unwrap();
        store.create(&savings).unwrap();
    }

    #[test]
    fn external_account_rejects_non_default_key() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let store = BalanceStore::new(db);
        let account_id = AccountId::new();
        let ledger_id = LedgerId::new();
        let mut mint = new_balance(account_id, ledger_id, "@mint", 0);
        mint.account_type = AccountType::External;
        store.create(&mint).unwrap();

        let mut extra = new_balance(account_id, ledger_id, "@mint", 0);
        extra.account_type = AccountType::External;
        extra.key = BalanceKey("extra".to_string());
        let err = store.create(&extra).unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)));
    }
}
