pub mod balance;
pub mod constants;
pub mod cursor;
pub mod error;
pub mod idempotency;
pub mod operation;
pub mod plan;
pub mod route;
pub mod transaction;
pub mod types;

pub use balance::{AccountType, Balance};
pub use constants::*;
pub use cursor::{Cursor, CursorDirection};
pub use error::LedgerError;
pub use idempotency::{IdempotencySlot, IdempotencySlotState, ReserveOutcome};
pub use operation::{Operation, OperationType};
pub use plan::Plan;
pub use route::{RouteRecord, Selector};
pub use transaction::{Transaction, TransactionEntry, TransactionStatus};
pub use types::{
    Alias, AliasKey, AssetCode, BalanceId, BalanceKey, LedgerId, Money, OperationId, OrgId,
    RouteId, Timestamp, TransactionId, DEFAULT_KEY,
};
pub use types::AccountId;
