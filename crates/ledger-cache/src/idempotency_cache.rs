//! In-memory fast path fronting C4's durable store (§4.4): the same atomic
//! test-and-set semantics, backed by a `dashmap` instead of a transaction.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ledger_core::{IdempotencySlot, IdempotencySlotState, LedgerId, OrgId, ReserveOutcome, Timestamp};

fn cache_key(org_id: &OrgId, ledger_id: &LedgerId, key: &str) -> String {
    format!("{org_id}:{ledger_id}:{key}")
}

#[derive(Default)]
pub struct IdempotencyCache {
    entries: DashMap<String, IdempotencySlot>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, org_id: &OrgId, ledger_id: &LedgerId, key: &str) -> Option<IdempotencySlot> {
        self.entries.get(&cache_key(org_id, ledger_id, key)).map(|e| e.clone())
    }

    /// Atomic test-and-set against the in-memory map only; the caller
    /// (C4/executor) is responsible for writing through to the durable store
    /// on `ReservedNew`.
    pub fn reserve(
        &self,
        org_id: &OrgId,
        ledger_id: &LedgerId,
        key: &str,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> ReserveOutcome {
        match self.entries.entry(cache_key(org_id, ledger_id, key)) {
            Entry::Occupied(mut occ) => {
                if occ.get().expires_at > now {
                    ReserveOutcome::Existing(occ.get().clone())
                } else {
                    let slot = IdempotencySlot {
                        key: key.to_string(),
                        state: IdempotencySlotState::Reserved,
                        transaction_id: None,
                        result: None,
                        expires_at,
                    };
                    occ.insert(slot);
                    ReserveOutcome::ReservedNew
                }
            }
            Entry::Vacant(vac) => {
                vac.insert(IdempotencySlot {
                    key: key.to_string(),
                    state: IdempotencySlotState::Reserved,
                    transaction_id: None,
                    result: None,
                    expires_at,
                });
                ReserveOutcome::ReservedNew
            }
        }
    }

    pub fn complete(
        &self,
        org_id: &OrgId,
        ledger_id: &LedgerId,
        key: &str,
        transaction_id: ledger_core::TransactionId,
        result: ledger_core::Transaction,
    ) {
        let cache_key = cache_key(org_id, ledger_id, key);
        if let Some(mut slot) = self.entries.get_mut(&cache_key) {
            slot.state = IdempotencySlotState::Completed;
            slot.transaction_id = Some(transaction_id);
            slot.result = Some(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn reserve_twice_returns_existing() {
        let cache = IdempotencyCache::new();
        let org = OrgId::new();
        let ledger = LedgerId::new();
        let now = chrono::Utc::now();
        let expires = now + Duration::hours(1);

        let first = cache.reserve(&org, &ledger, "k1", expires, now);
        assert!(matches!(first, ReserveOutcome::ReservedNew));
        let second = cache.reserve(&org, &ledger, "k1", expires, now);
        assert!(matches!(second, ReserveOutcome::Existing(_)));
    }

    #[test]
    fn expired_reservation_can_be_retaken() {
        let cache = IdempotencyCache::new();
        let org = OrgId::new();
        let ledger = LedgerId::new();
        let now = chrono::Utc::now();
        let already_expired = now - Duration::hours(1);

        cache.reserve(&org, &ledger, "k1", already_expired, now - Duration::hours(2));
        let retaken = cache.reserve(&org, &ledger, "k1", now + Duration::hours(1), now);
        assert!(matches!(retaken, ReserveOutcome::ReservedNew));
    }
}
