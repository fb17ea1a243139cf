//! C2 — the hot balance cache. A write-through copy of C1 rows, never
//! exposing a `version` lower than what C1 currently holds.

use dashmap::{DashMap, DashSet};
use ledger_core::{AliasKey, Balance, LedgerId, OrgId};

fn cache_key(org_id: &OrgId, ledger_id: &LedgerId, alias_key: &AliasKey) -> String {
    format!("{org_id}:{ledger_id}:{alias_key}")
}

#[derive(Default)]
pub struct BalanceCache {
    entries: DashMap<String, Balance>,
    /// Keys written since the last successful drain to C1 (§4.2 syncer).
    dirty: DashSet<String>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, org_id: &OrgId, ledger_id: &LedgerId, alias_key: &AliasKey) -> Option<Balance> {
        self.entries.get(&cache_key(org_id, ledger_id, alias_key)).map(|e| e.clone())
    }

    /// Write-through: never regresses `version` for the same key.
    pub fn put(&self, org_id: &OrgId, ledger_id: &LedgerId, alias_key: &AliasKey, balance: Balance) {
        let key = cache_key(org_id, ledger_id, alias_key);
        let should_insert = match self.entries.get(&key) {
            Some(existing) => balance.version > existing.version,
            None => true,
        };
        if should_insert {
            self.entries.insert(key.clone(), balance);
            self.dirty.insert(key);
        }
    }

    pub fn list_by_key_prefix(&self, org_id: &OrgId, ledger_id: &LedgerId, alias: &ledger_core::Alias) -> Vec<Balance> {
        let prefix = format!("{org_id}:{ledger_id}:{}#", alias.0);
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn invalidate(&self, org_id: &OrgId, ledger_id: &LedgerId, alias_key: &AliasKey) {
        let key = cache_key(org_id, ledger_id, alias_key);
        self.entries.remove(&key);
        self.dirty.remove(&key);
    }

    /// Drain dirty entries for the background syncer (§4.2). Entries remain
    /// in the cache; only the dirty marker is cleared.
    pub fn drain_dirty(&self) -> Vec<Balance> {
        let keys: Vec<String> = self.dirty.iter().map(|k| k.clone()).collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.entries.get(&key) {
                out.push(entry.clone());
            }
            self.dirty.remove(&key);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{AccountId, AccountType, Alias, AssetCode, BalanceId, BalanceKey, Money};

    fn sample(version: u64) -> Balance {
        let now = chrono::Utc::now();
        Balance {
            id: BalanceId::new(),
            organization_id: OrgId::new(),
            ledger_id: LedgerId::new(),
            account_id: AccountId::new(),
            alias: Alias::new("a"),
            key: BalanceKey::default_key(),
            asset_code: AssetCode::new("USD"),
            available: Money::ZERO,
            on_hold: Money::ZERO,
            version,
            account_type: AccountType::Deposit,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn never_regresses_version() {
        let cache = BalanceCache::new();
        let org = OrgId::new();
        let ledger = LedgerId::new();
        let alias_key = AliasKey::compose(&Alias::new("a"), &BalanceKey::default_key());

        cache.put(&org, &ledger, &alias_key, sample(5));
        cache.put(&org, &ledger, &alias_key, sample(3));
        assert_eq!(cache.get(&org, &ledger, &alias_key).unwrap().version, 5);

        cache.put(&org, &ledger, &alias_key, sample(9));
        assert_eq!(cache.get(&org, &ledger, &alias_key).unwrap().version, 9);
    }

    #[test]
    fn drain_dirty_clears_marker_not_entry() {
        let cache = BalanceCache::new();
        let org = OrgId::new();
        let ledger = LedgerId::new();
        let alias_key = AliasKey::compose(&Alias::new("a"), &BalanceKey::default_key());
        cache.put(&org, &ledger, &alias_key, sample(1));

        let drained = cache.drain_dirty();
        assert_eq!(drained.len(), 1);
        assert!(cache.drain_dirty().is_empty());
        assert!(cache.get(&org, &ledger, &alias_key).is_some());
    }
}
