use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::transaction::TransactionEntry;
use crate::types::{AliasKey, Money};

/// The validated, concrete description of a transfer produced by C5: who
/// pays, who receives, how much, in what asset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plan {
    pub sources: Vec<TransactionEntry>,
    pub destinations: Vec<TransactionEntry>,
    /// Legs that move funds from `available` to `onHold` on the same balance.
    pub holds: Vec<TransactionEntry>,
    /// Legs that move funds from `onHold` back to `available` on the same balance.
    pub releases: Vec<TransactionEntry>,
    /// `"alias#key"` set, locked in lexicographic order by the executor to
    /// avoid deadlock (§5).
    pub aliases_to_lock: BTreeSet<AliasKey>,
    /// Signed per-`alias#key` delta: negative for sources, positive for
    /// destinations. Drives C6 step 6 (compute new states).
    pub per_alias_delta: BTreeMap<AliasKey, Money>,
    /// Signed per-`alias#key` hold delta: positive for a HOLD leg (available
    /// → onHold), negative for a RELEASE leg (onHold → available).
    pub per_alias_hold_delta: BTreeMap<AliasKey, Money>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
