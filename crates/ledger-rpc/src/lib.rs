//! ledger-rpc
//!
//! JSON-RPC 2.0 server exposing the ledger's commit and query surface.
//!
//! Namespace: "ledger"
//! Methods:
//!   ledger_createBalance
//!   ledger_getBalance
//!   ledger_deleteBalance
//!   ledger_deleteAllBalancesByAccountId
//!   ledger_postTransactionJson
//!   ledger_postTransactionDsl
//!   ledger_patchTransaction
//!   ledger_getTransaction
//!   ledger_listTransactions

pub mod api;
pub mod server;
pub mod types;

pub use api::LedgerApiServer;
pub use server::{RpcServer, RpcServerState};
pub use types::{RpcBalance, RpcDeleteSummary, RpcEntry, RpcTransaction, RpcTransactionPage};
