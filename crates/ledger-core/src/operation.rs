use serde::{Deserialize, Serialize};

use crate::types::{AssetCode, BalanceId, Money, OperationId, Timestamp, TransactionId};

/// One signed movement against one balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Debit,
    Credit,
    Hold,
    Release,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub transaction_id: TransactionId,
    pub balance_id: BalanceId,
    pub operation_type: OperationType,
    pub amount: Money,
    pub asset_code: AssetCode,
    pub created_at: Timestamp,
}
