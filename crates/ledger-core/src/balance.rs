//! The central entity: a versioned, per-account, per-key balance row.
//!
//! Invariants (enforced by `ledger-store`, not by this type):
//! 1. `(accountID, key)` is unique over non-deleted rows.
//! 2. A non-`default` key may exist only if `default` already exists.
//! 3. `External` accounts may hold only the `default` key.
//! 4. `version` increments by exactly 1 on every successful mutation.
//! 5. Soft-delete requires `available == 0 && onHold == 0`.

use serde::{Deserialize, Serialize};

use crate::types::{
    Alias, AssetCode, BalanceId, BalanceKey, LedgerId, Money, OrgId, Timestamp,
};
use crate::AccountId;

/// Drives business rules: which capability checks and key constraints apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Deposit,
    Savings,
    Loans,
    Marketplace,
    CreditCard,
    /// May hold only the `default` key (invariant 3).
    External,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub organization_id: OrgId,
    pub ledger_id: LedgerId,
    pub account_id: AccountId,
    pub alias: Alias,
    pub key: BalanceKey,
    pub asset_code: AssetCode,
    pub available: Money,
    pub on_hold: Money,
    pub version: u64,
    pub account_type: AccountType,
    pub allow_sending: bool,
    pub allow_receiving: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Balance {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Precondition for soft-delete (invariant 5).
    pub fn is_zeroed(&self) -> bool {
        self.available.is_zero() && self.on_hold.is_zero()
    }

    /// Funds a client can still move: `available` only (`onHold` is reserved).
    pub fn spendable(&self) -> Money {
        self.available
    }
}
