//! The AST a transfer DSL (or an equivalent JSON plan request) parses to.
//! The grammar itself is mechanical glue (§1 non-goals); this is the shape
//! the validator (§4.5) consumes either way.

use ledger_core::{Alias, AssetCode, BalanceKey, Money};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AstEntry {
    pub alias: Alias,
    pub key: BalanceKey,
    pub amount: Money,
    pub asset_code: AssetCode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetRate {
    pub from: AssetCode,
    pub to: AssetCode,
    pub rate: Money,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TransferAst {
    pub sources: Vec<AstEntry>,
    pub destinations: Vec<AstEntry>,
    /// Legs that move funds from `available` to `onHold` on the same balance.
    #[serde(default)]
    pub holds: Vec<AstEntry>,
    /// Legs that move funds from `onHold` back to `available` on the same balance.
    #[serde(default)]
    pub releases: Vec<AstEntry>,
    pub rate: Option<AssetRate>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
