use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{RpcBalance, RpcDeleteSummary, RpcTransaction, RpcTransactionPage};

/// Ledger JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "ledger_" via `namespace = "ledger"`.
/// `Idempotency-Key` and the tracing correlation id (`Midaz-Id` in the
/// reference source) have no header concept in jsonrpsee, so both become
/// explicit `Option<String>` parameters here rather than implicit headers.
#[rpc(server, namespace = "ledger")]
pub trait LedgerApi {
    #[method(name = "createBalance")]
    #[allow(clippy::too_many_arguments)]
    async fn create_balance(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
        alias: String,
        key: Option<String>,
        asset_code: String,
        account_type: String,
        allow_sending: bool,
        allow_receiving: bool,
    ) -> RpcResult<RpcBalance>;

    #[method(name = "getBalance")]
    async fn get_balance(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
        key: Option<String>,
    ) -> RpcResult<Option<RpcBalance>>;

    #[method(name = "deleteBalance")]
    async fn delete_balance(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
        key: Option<String>,
    ) -> RpcResult<()>;

    #[method(name = "deleteAllBalancesByAccountId")]
    async fn delete_all_balances_by_account_id(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
    ) -> RpcResult<RpcDeleteSummary>;

    #[method(name = "postTransactionJson")]
    async fn post_transaction_json(
        &self,
        organization_id: String,
        ledger_id: String,
        idempotency_key: Option<String>,
        plan: serde_json::Value,
        request_id: Option<String>,
    ) -> RpcResult<RpcTransaction>;

    #[method(name = "postTransactionDsl")]
    async fn post_transaction_dsl(
        &self,
        organization_id: String,
        ledger_id: String,
        idempotency_key: Option<String>,
        dsl: String,
        request_id: Option<String>,
    ) -> RpcResult<RpcTransaction>;

    #[method(name = "patchTransaction")]
    async fn patch_transaction(
        &self,
        transaction_id: String,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> RpcResult<RpcTransaction>;

    #[method(name = "getTransaction")]
    async fn get_transaction(&self, transaction_id: String) -> RpcResult<Option<RpcTransaction>>;

    #[method(name = "listTransactions")]
    async fn list_transactions(
        &self,
        ledger_id: String,
        cursor: Option<String>,
        limit: Option<u32>,
    ) -> RpcResult<RpcTransactionPage>;
}
