//! ─── Ledger protocol constants ──────────────────────────────────────────────

/// Default TTL for a freshly reserved idempotency slot.
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 24 * 3600;

/// Recommended bound on local retries of a stale `batchUpdate` before
/// surfacing `ConcurrencyExhausted` (§4.6 step 7).
pub const MAX_COMMIT_RETRIES: u32 = 3;

/// Maximum length of a client-supplied `Idempotency-Key` (§6).
pub const MAX_IDEMPOTENCY_KEY_BYTES: usize = 255;

/// Default page size for cursor-paginated list operations.
pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;
