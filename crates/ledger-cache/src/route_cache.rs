//! C3 — the routing cache. No TTL; entries are invalidated explicitly on
//! mutation of the underlying rule and repopulated from C1 on next read.

use dashmap::DashMap;
use ledger_core::{LedgerId, OrgId, RouteId, RouteRecord};

fn cache_key(org_id: &OrgId, ledger_id: &LedgerId, route_id: &RouteId) -> String {
    format!("{org_id}:{ledger_id}:{route_id}")
}

#[derive(Default)]
pub struct RouteCache {
    entries: DashMap<String, RouteRecord>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, org_id: &OrgId, ledger_id: &LedgerId, route_id: &RouteId) -> Option<RouteRecord> {
        self.entries.get(&cache_key(org_id, ledger_id, route_id)).map(|e| e.clone())
    }

    pub fn put(&self, org_id: &OrgId, ledger_id: &LedgerId, route: RouteRecord) {
        self.entries.insert(cache_key(org_id, ledger_id, &route.id), route);
    }

    /// Unconditionally deletes the entry — never overwrites in place.
    pub fn invalidate(&self, org_id: &OrgId, ledger_id: &LedgerId, route_id: &RouteId) {
        self.entries.remove(&cache_key(org_id, ledger_id, route_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_removes_not_overwrites() {
        let cache = RouteCache::new();
        let org = OrgId::new();
        let ledger = LedgerId::new();
        let route = RouteRecord {
            id: RouteId::new(),
            organization_id: org,
            ledger_id: ledger,
            source_selector: ledger_core::Selector::ByAlias(ledger_core::Alias::new("a")),
            destination_selector: ledger_core::Selector::ByAlias(ledger_core::Alias::new("b")),
            updated_at: chrono::Utc::now(),
        };
        cache.put(&org, &ledger, route.clone());
        assert!(cache.get(&org, &ledger, &route.id).is_some());
        cache.invalidate(&org, &ledger, &route.id);
        assert!(cache.get(&org, &ledger, &route.id).is_none());
    }
}
