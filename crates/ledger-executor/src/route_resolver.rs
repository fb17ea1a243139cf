//! C9 — route resolver. Expands a routing identifier into the concrete
//! aliases a plan needs. Trivial in structure but on the hot path; reads go
//! through C3 first, falling back to C1 on a cache miss.

use std::sync::Arc;

use ledger_cache::RouteCache;
use ledger_core::{Alias, AssetCode, LedgerError, LedgerId, OrgId, RouteId, RouteRecord, Selector};
use ledger_store::{BalanceStore, RouteStore};

pub struct RouteResolver {
    cache: Arc<RouteCache>,
    routes: Arc<RouteStore>,
    balances: Arc<BalanceStore>,
}

/// The concrete aliases a routing identifier expands to on each side.
pub struct ResolvedRoute {
    pub source_aliases: Vec<Alias>,
    pub destination_aliases: Vec<Alias>,
}

impl RouteResolver {
    pub fn new(cache: Arc<RouteCache>, routes: Arc<RouteStore>, balances: Arc<BalanceStore>) -> Self {
        Self { cache, routes, balances }
    }

    pub fn resolve(
        &self,
        org_id: &OrgId,
        ledger_id: &LedgerId,
        route_id: &RouteId,
        asset_code: &AssetCode,
    ) -> Result<ResolvedRoute, LedgerError> {
        let record = match self.cache.get(org_id, ledger_id, route_id) {
            Some(r) => r,
            None => {
                let r = self
                    .routes
                    .find_by_id(route_id)?
                    .ok_or_else(|| LedgerError::RouteUnresolved(route_id.to_string()))?;
                self.cache.put(org_id, ledger_id, r.clone());
                r
            }
        };

        Ok(ResolvedRoute {
            source_aliases: self.expand_selector(&record.source_selector, ledger_id, asset_code)?,
            destination_aliases: self.expand_selector(&record.destination_selector, ledger_id, asset_code)?,
        })
    }

    /// Writes a route rule and invalidates C3 unconditionally (§4.3) rather
    /// than overwriting it, so the next `resolve` repopulates from C1.
    pub fn upsert_route(&self, org_id: &OrgId, route: RouteRecord) -> Result<(), LedgerError> {
        let ledger_id = route.ledger_id;
        let route_id = route.id;
        self.routes.upsert(&route)?;
        self.cache.invalidate(org_id, &ledger_id, &route_id);
        Ok(())
    }

    fn expand_selector(
        &self,
        selector: &Selector,
        ledger_id: &LedgerId,
        asset_code: &AssetCode,
    ) -> Result<Vec<Alias>, LedgerError> {
        match selector {
            Selector::ByAlias(alias) => Ok(vec![alias.clone()]),
            Selector::ByAccountType(account_type) => {
                let candidates = self.balances.list_all_by_ledger(ledger_id, None, Some(ledger_core::MAX_PAGE_LIMIT))?.0;
                let aliases: Vec<Alias> = candidates
                    .into_iter()
                    .filter(|b| b.account_type == *account_type && b.asset_code == *asset_code && !b.is_deleted())
                    .map(|b| b.alias)
                    .collect();
                if aliases.is_empty() {
                    return Err(LedgerError::RouteUnresolved(format!("no balances for account type {account_type:?}")));
                }
                Ok(aliases)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ledger_core::RouteId;
    use ledger_store::StoreDb;

    use super::*;

    #[test]
    fn resolve_caches_and_upsert_invalidates() {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let routes = Arc::new(RouteStore::new(db.clone()));
        let balances = Arc::new(BalanceStore::new(db));
        let cache = Arc::new(RouteCache::new());
        let resolver = RouteResolver::new(cache.clone(), routes, balances);

        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let route = RouteRecord {
            id: RouteId::new(),
            organization_id: org_id,
            ledger_id,
            source_selector: Selector::ByAlias(Alias::new("@treasury")),
            destination_selector: Selector::ByAlias(Alias::new("@client")),
            updated_at: chrono::Utc::now(),
        };
        resolver.upsert_route(&org_id, route.clone()).unwrap();
        assert!(cache.get(&org_id, &ledger_id, &route.id).is_none());

        let asset = AssetCode::new("USD");
        let resolved = resolver.resolve(&org_id, &ledger_id, &route.id, &asset).unwrap();
        assert_eq!(resolved.source_aliases, vec![Alias::new("@treasury")]);
        assert!(cache.get(&org_id, &ledger_id, &route.id).is_some());

        let mut updated = route.clone();
        updated.destination_selector = Selector::ByAlias(Alias::new("@other"));
        resolver.upsert_route(&org_id, updated).unwrap();
        assert!(cache.get(&org_id, &ledger_id, &route.id).is_none());
        let resolved2 = resolver.resolve(&org_id, &ledger_id, &route.id, &asset).unwrap();
        assert_eq!(resolved2.destination_aliases, vec![Alias::new("@other")]);
    }
}
