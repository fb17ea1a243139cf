use serde::{Deserialize, Serialize};

use ledger_core::{AccountType, Balance, Transaction, TransactionStatus};

/// JSON-serializable balance row. `available`/`on_hold` are decimal strings,
/// matching the teacher's convention of stringifying arbitrary-precision
/// amounts rather than risking float precision loss over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcBalance {
    pub id: String,
    pub organization_id: String,
    pub ledger_id: String,
    pub account_id: String,
    pub alias: String,
    pub key: String,
    pub asset_code: String,
    pub available: String,
    pub on_hold: String,
    pub version: u64,
    pub account_type: String,
    pub allow_sending: bool,
    pub allow_receiving: bool,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl From<Balance> for RpcBalance {
    fn from(b: Balance) -> Self {
        Self {
            id: b.id.to_string(),
            organization_id: b.organization_id.to_string(),
            ledger_id: b.ledger_id.to_string(),
            account_id: b.account_id.to_string(),
            alias: b.alias.0,
            key: b.key.0,
            asset_code: b.asset_code.0,
            available: b.available.to_string(),
            on_hold: b.on_hold.to_string(),
            version: b.version,
            account_type: account_type_str(b.account_type).to_string(),
            allow_sending: b.allow_sending,
            allow_receiving: b.allow_receiving,
            created_at: b.created_at.to_rfc3339(),
            updated_at: b.updated_at.to_rfc3339(),
            deleted_at: b.deleted_at.map(|t| t.to_rfc3339()),
        }
    }
}

pub fn account_type_str(t: AccountType) -> &'static str {
    match t {
        AccountType::Deposit => "DEPOSIT",
        AccountType::Savings => "SAVINGS",
        AccountType::Loans => "LOANS",
        AccountType::Marketplace => "MARKETPLACE",
        AccountType::CreditCard => "CREDIT_CARD",
        AccountType::External => "EXTERNAL",
    }
}

pub fn parse_account_type(s: &str) -> Option<AccountType> {
    match s.to_ascii_uppercase().as_str() {
        "DEPOSIT" => Some(AccountType::Deposit),
        "SAVINGS" => Some(AccountType::Savings),
        "LOANS" => Some(AccountType::Loans),
        "MARKETPLACE" => Some(AccountType::Marketplace),
        "CREDIT_CARD" | "CREDITCARD" => Some(AccountType::CreditCard),
        "EXTERNAL" => Some(AccountType::External),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEntry {
    pub alias: String,
    pub key: Option<String>,
    pub amount: String,
    pub asset_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub id: String,
    pub organization_id: String,
    pub ledger_id: String,
    pub status: String,
    pub sources: Vec<RpcEntry>,
    pub destinations: Vec<RpcEntry>,
    pub holds: Vec<RpcEntry>,
    pub releases: Vec<RpcEntry>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Transaction> for RpcTransaction {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            organization_id: tx.organization_id.to_string(),
            ledger_id: tx.ledger_id.to_string(),
            status: status_str(tx.status).to_string(),
            sources: tx.sources.into_iter().map(entry_to_rpc).collect(),
            destinations: tx.destinations.into_iter().map(entry_to_rpc).collect(),
            holds: tx.holds.into_iter().map(entry_to_rpc).collect(),
            releases: tx.releases.into_iter().map(entry_to_rpc).collect(),
            description: tx.description,
            metadata: tx.metadata,
            idempotency_key: tx.idempotency_key,
            created_at: tx.created_at.to_rfc3339(),
            updated_at: tx.updated_at.to_rfc3339(),
        }
    }
}

fn entry_to_rpc(e: ledger_core::TransactionEntry) -> RpcEntry {
    RpcEntry {
        alias: e.alias.0,
        key: Some(e.key.0),
        amount: e.amount.to_string(),
        asset_code: e.asset_code.0,
    }
}

pub fn status_str(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Pending => "PENDING",
        TransactionStatus::Approved => "APPROVED",
        TransactionStatus::Declined => "DECLINED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransactionPage {
    pub items: Vec<RpcTransaction>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDeleteSummary {
    pub requested: usize,
    pub deleted: usize,
}
