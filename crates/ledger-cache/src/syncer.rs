//! Background drain of C2's dirty entries to C1 (§4.2). `version`
//! monotonicity at the store makes this safe against arbitrary interleaving
//! with synchronous commits.

use std::sync::Arc;
use std::time::Duration;

use ledger_store::BalanceStore;
use tracing::{debug, warn};

use crate::balance_cache::BalanceCache;

pub struct Syncer {
    cache: Arc<BalanceCache>,
    store: Arc<BalanceStore>,
    interval: Duration,
}

impl Syncer {
    pub fn new(cache: Arc<BalanceCache>, store: Arc<BalanceStore>, interval: Duration) -> Self {
        Self { cache, store, interval }
    }

    /// Runs until cancelled. Intended to be `tokio::spawn`ed once at startup.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.drain_once();
        }
    }

    pub fn drain_once(&self) {
        let dirty = self.cache.drain_dirty();
        if dirty.is_empty() {
            return;
        }
        debug!(count = dirty.len(), "syncer: draining dirty cache entries to store");
        for balance in dirty {
            match self.store.sync_from_cache(&balance) {
                Ok(true) => {}
                Ok(false) => debug!(balance_id = %balance.id, "syncer: store already at or ahead of cached version"),
                Err(e) => warn!(balance_id = %balance.id, error = %e, "syncer: failed to write back balance"),
            }
        }
    }
}
