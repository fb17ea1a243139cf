use thiserror::Error;

/// Every business and infrastructure error the ledger can surface.
///
/// Business errors cross layers unchanged; infrastructure errors may be
/// wrapped with context but never swallowed.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ── Input validation ─────────────────────────────────────────────────────
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("invalid path parameter: {0}")]
    InvalidPathParameter(String),

    // ── Entity lifecycle ─────────────────────────────────────────────────────
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    // ── Balance / transfer semantics ─────────────────────────────────────────
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("capability denied: {0} disallows the requested direction")]
    CapabilityDenied(String),

    #[error("double-entry broken: sources and destinations do not balance for asset {0}")]
    DoubleEntryBroken(String),

    #[error("balance {0} cannot be deleted: available or on-hold funds remain")]
    BalancesCantBeDeleted(String),

    #[error("partial delete: {requested} requested, {deleted} matched")]
    PartialDelete { requested: usize, deleted: usize },

    // ── Routing ───────────────────────────────────────────────────────────────
    #[error("route unresolved: {0}")]
    RouteUnresolved(String),

    // ── Idempotency ───────────────────────────────────────────────────────────
    #[error("request with this idempotency key is already in progress")]
    InProgress,

    // ── Optimistic locking / concurrency ─────────────────────────────────────
    #[error("no balances updated: caller's snapshot is stale")]
    NoBalancesUpdated,

    #[error("concurrency exhausted after {attempts} attempts")]
    ConcurrencyExhausted { attempts: u32 },

    // ── Cancellation ──────────────────────────────────────────────────────────
    #[error("commit cancelled before it reached the durable commit point")]
    Cancelled,

    // ── Infrastructure ────────────────────────────────────────────────────────
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Local-retry errors per the retry taxonomy in §4.6/§7: the caller should
    /// re-read and retry the commit, not surface the error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::NoBalancesUpdated | LedgerError::StoreUnavailable(_))
    }
}
