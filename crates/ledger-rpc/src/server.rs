use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, Instrument};

use ledger_core::{
    AccountId, BalanceKey, LedgerError, LedgerId, OrgId, TransactionId, DEFAULT_PAGE_LIMIT,
};
use ledger_dsl::TransferAst;
use ledger_executor::{CommitRequest, ExecutorInput, Queue, TransactionExecutor};
use ledger_store::{BalanceStore, TransactionStore};

use crate::api::LedgerApiServer;
use crate::types::{parse_account_type, RpcBalance, RpcDeleteSummary, RpcTransaction, RpcTransactionPage};

/// Recommended internal cap on the whole commit (§5): a request-scoped
/// cancellation the executor checks once before its durable commit point.
const COMMIT_DEADLINE: Duration = Duration::from_secs(5);

fn commit_deadline_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(COMMIT_DEADLINE).await;
        cancel.cancel();
    });
    token
}

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn invalid_param(field: &str, e: impl std::fmt::Display) -> ErrorObject<'static> {
    err_to_rpc(LedgerError::InvalidPathParameter(format!("invalid {field}: {e}")))
}

fn err_to_rpc(e: LedgerError) -> ErrorObject<'static> {
    match &e {
        LedgerError::ValidationError(_)
        | LedgerError::InvalidPathParameter(_)
        | LedgerError::InsufficientFunds(_)
        | LedgerError::CapabilityDenied(_)
        | LedgerError::DoubleEntryBroken(_)
        | LedgerError::BalancesCantBeDeleted(_)
        | LedgerError::PartialDelete { .. }
        | LedgerError::RouteUnresolved(_) => rpc_err(-32602, e.to_string()),
        LedgerError::EntityNotFound(_) => rpc_err(-32001, e.to_string()),
        LedgerError::AlreadyExists(_) => rpc_err(-32002, e.to_string()),
        LedgerError::InProgress => rpc_err(-32003, e.to_string()),
        LedgerError::NoBalancesUpdated | LedgerError::ConcurrencyExhausted { .. } => {
            rpc_err(-32004, e.to_string())
        }
        LedgerError::Cancelled => rpc_err(-32005, e.to_string()),
        LedgerError::StoreUnavailable(_) | LedgerError::Serialization(_) | LedgerError::Internal(_) => {
            rpc_err(-32603, e.to_string())
        }
    }
}

fn parse_org(s: &str) -> Result<OrgId, ErrorObject<'static>> {
    OrgId::parse(s).map_err(|e| invalid_param("organizationId", e))
}

fn parse_ledger(s: &str) -> Result<LedgerId, ErrorObject<'static>> {
    LedgerId::parse(s).map_err(|e| invalid_param("ledgerId", e))
}

fn parse_account(s: &str) -> Result<AccountId, ErrorObject<'static>> {
    AccountId::parse(s).map_err(|e| invalid_param("accountId", e))
}

fn parse_tx_id(s: &str) -> Result<TransactionId, ErrorObject<'static>> {
    TransactionId::parse(s).map_err(|e| invalid_param("transactionId", e))
}

fn key_or_default(key: Option<String>) -> BalanceKey {
    key.map(BalanceKey).unwrap_or_else(BalanceKey::default_key)
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub balances: Arc<BalanceStore>,
    pub transactions: Arc<TransactionStore>,
    pub executor: Arc<TransactionExecutor>,
    /// Set when the async commit path (C7, `RABBITMQ_TRANSACTION_ASYNC`) is
    /// enabled. When present, `post_transaction_*` enqueue through it instead
    /// of committing synchronously.
    pub queue: Option<Arc<dyn Queue>>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl LedgerApiServer for RpcServer {
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
    ) -> RpcResult<RpcBalance> {
        let organization_id = parse_org(&organization_id)?;
        let ledger_id = parse_ledger(&ledger_id)?;
        let account_id = parse_account(&account_id)?;
        let account_type = parse_account_type(&account_type)
            .ok_or_else(|| rpc_err(-32602, format!("unknown account type: {account_type}")))?;
        let now = chrono::Utc::now();

        let balance = ledger_core::Balance {
            id: ledger_core::BalanceId::new(),
            organization_id,
            ledger_id,
            account_id,
            alias: ledger_core::Alias::new(alias),
            key: key_or_default(key),
            asset_code: ledger_core::AssetCode::new(asset_code),
            available: ledger_core::Money::ZERO,
            on_hold: ledger_core::Money::ZERO,
            version: 1,
            account_type,
            allow_sending,
            allow_receiving,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.state.balances.create(&balance).map_err(err_to_rpc)?;
        Ok(balance.into())
    }

    async fn get_balance(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
        key: Option<String>,
    ) -> RpcResult<Option<RpcBalance>> {
        let _ = (parse_org(&organization_id)?, parse_ledger(&ledger_id)?);
        let account_id = parse_account(&account_id)?;
        let key = key_or_default(key);
        Ok(self
            .state
            .balances
            .find_by_account_and_key(&account_id, &key)
            .map_err(err_to_rpc)?
            .map(RpcBalance::from))
    }

    async fn delete_balance(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
        key: Option<String>,
    ) -> RpcResult<()> {
        let _ = (parse_org(&organization_id)?, parse_ledger(&ledger_id)?);
        let account_id = parse_account(&account_id)?;
        let key = key_or_default(key);
        let balance = self
            .state
            .balances
            .find_by_account_and_key(&account_id, &key)
            .map_err(err_to_rpc)?
            .ok_or_else(|| rpc_err(-32001, "balance not found"))?;
        self.state
            .balances
            .delete(&balance.id, chrono::Utc::now())
            .map_err(err_to_rpc)
    }

    async fn delete_all_balances_by_account_id(
        &self,
        organization_id: String,
        ledger_id: String,
        account_id: String,
    ) -> RpcResult<RpcDeleteSummary> {
        let _ = (parse_org(&organization_id)?, parse_ledger(&ledger_id)?);
        let account_id = parse_account(&account_id)?;
        let balances = self
            .state
            .balances
            .list_by_account_ids(&[account_id])
            .map_err(err_to_rpc)?;
        let requested = balances.len();
        let ids: Vec<_> = balances.into_iter().map(|b| b.id).collect();
        match self.state.balances.delete_all_by_ids(&ids, chrono::Utc::now()) {
            Ok(()) => Ok(RpcDeleteSummary { requested, deleted: requested }),
            Err(LedgerError::PartialDelete { requested, deleted }) => {
                Ok(RpcDeleteSummary { requested, deleted })
            }
            Err(e) => Err(err_to_rpc(e)),
        }
    }

    async fn post_transaction_json(
        &self,
        organization_id: String,
        ledger_id: String,
        idempotency_key: Option<String>,
        plan: serde_json::Value,
        request_id: Option<String>,
    ) -> RpcResult<RpcTransaction> {
        let span = info_span!("post_transaction_json", request_id = request_id.as_deref().unwrap_or(""));
        async move {
            let organization_id = parse_org(&organization_id)?;
            let ledger_id = parse_ledger(&ledger_id)?;
            let ast: TransferAst = serde_json::from_value(plan)
                .map_err(|e| rpc_err(-32602, format!("invalid transfer plan: {e}")))?;
            let tx = match &self.state.queue {
                Some(queue) => {
                    let req = CommitRequest::new(organization_id, ledger_id, idempotency_key, ExecutorInput::Plan(ast));
                    self.state.executor.enqueue(req, queue).await.map_err(err_to_rpc)?
                }
                None => {
                    let req = CommitRequest {
                        cancellation: commit_deadline_token(),
                        ..CommitRequest::new(organization_id, ledger_id, idempotency_key, ExecutorInput::Plan(ast))
                    };
                    self.state.executor.execute(req).await.map_err(err_to_rpc)?
                }
            };
            Ok(tx.into())
        }
        .instrument(span)
        .await
    }

    async fn post_transaction_dsl(
        &self,
        organization_id: String,
        ledger_id: String,
        idempotency_key: Option<String>,
        dsl: String,
        request_id: Option<String>,
    ) -> RpcResult<RpcTransaction> {
        let span = info_span!("post_transaction_dsl", request_id = request_id.as_deref().unwrap_or(""));
        async move {
            let organization_id = parse_org(&organization_id)?;
            let ledger_id = parse_ledger(&ledger_id)?;
            let tx = match &self.state.queue {
                Some(queue) => {
                    let req = CommitRequest::new(organization_id, ledger_id, idempotency_key, ExecutorInput::Dsl(dsl));
                    self.state.executor.enqueue(req, queue).await.map_err(err_to_rpc)?
                }
                None => {
                    let req = CommitRequest {
                        cancellation: commit_deadline_token(),
                        ..CommitRequest::new(organization_id, ledger_id, idempotency_key, ExecutorInput::Dsl(dsl))
                    };
                    self.state.executor.execute(req).await.map_err(err_to_rpc)?
                }
            };
            Ok(tx.into())
        }
        .instrument(span)
        .await
    }

    async fn patch_transaction(
        &self,
        transaction_id: String,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> RpcResult<RpcTransaction> {
        let id = parse_tx_id(&transaction_id)?;
        let mut tx = self
            .state
            .transactions
            .find_by_id(&id)
            .map_err(err_to_rpc)?
            .ok_or_else(|| rpc_err(-32001, "transaction not found"))?;
        if let Some(d) = description {
            tx.description = Some(d);
        }
        if let Some(m) = metadata {
            tx.metadata = Some(m);
        }
        tx.updated_at = chrono::Utc::now();
        self.state.transactions.update(&tx).map_err(err_to_rpc)?;
        Ok(tx.into())
    }

    async fn get_transaction(&self, transaction_id: String) -> RpcResult<Option<RpcTransaction>> {
        let id = parse_tx_id(&transaction_id)?;
        Ok(self
            .state
            .transactions
            .find_by_id(&id)
            .map_err(err_to_rpc)?
            .map(RpcTransaction::from))
    }

    async fn list_transactions(
        &self,
        ledger_id: String,
        cursor: Option<String>,
        limit: Option<u32>,
    ) -> RpcResult<RpcTransactionPage> {
        let ledger_id = parse_ledger(&ledger_id)?;
        let limit = limit.map(|l| l as usize).unwrap_or(DEFAULT_PAGE_LIMIT);
        let (items, next_cursor) = self
            .state
            .transactions
            .list_by_ledger(&ledger_id, cursor.as_deref(), Some(limit))
            .map_err(err_to_rpc)?;
        Ok(RpcTransactionPage {
            items: items.into_iter().map(RpcTransaction::from).collect(),
            next_cursor,
        })
    }
}
