use serde::{Deserialize, Serialize};

use crate::types::{Alias, AssetCode, BalanceKey, LedgerId, Money, OrgId, Timestamp, TransactionId};

/// `PENDING → APPROVED` (happy) | `PENDING → DECLINED` (terminal) | `PENDING`
/// terminal only transiently, across a crash — the recovery sweep in §9
/// resolves it one way or the other before new traffic is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Approved | TransactionStatus::Declined)
    }
}

/// One leg of a transaction: `(alias, key, amount, assetCode)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub alias: Alias,
    pub key: BalanceKey,
    pub amount: Money,
    pub asset_code: AssetCode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub organization_id: OrgId,
    pub ledger_id: LedgerId,
    pub status: TransactionStatus,
    pub sources: Vec<TransactionEntry>,
    pub destinations: Vec<TransactionEntry>,
    pub holds: Vec<TransactionEntry>,
    pub releases: Vec<TransactionEntry>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Transaction {
    /// Σ source amounts per asset code == Σ destination amounts per asset
    /// code (the double-entry invariant). Used by tests and by C5 validation.
    pub fn is_balanced(&self) -> bool {
        use std::collections::HashMap;
        let mut per_asset: HashMap<&str, Money> = HashMap::new();
        for s in &self.sources {
            *per_asset.entry(s.asset_code.0.as_str()).or_insert(Money::ZERO) -= s.amount;
        }
        for d in &self.destinations {
            *per_asset.entry(d.asset_code.0.as_str()).or_insert(Money::ZERO) += d.amount;
        }
        per_asset.values().all(|v| v.is_zero())
    }
}
