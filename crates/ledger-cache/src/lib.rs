pub mod balance_cache;
pub mod idempotency_cache;
pub mod keyed_lock;
pub mod route_cache;
pub mod syncer;

pub use balance_cache::BalanceCache;
pub use idempotency_cache::IdempotencyCache;
pub use keyed_lock::KeyedLocks;
pub use route_cache::RouteCache;
pub use syncer::Syncer;
