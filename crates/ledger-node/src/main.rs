//! ledger-node — the ledger node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the durable state database
//!   2. Run the crash-recovery sweep over any `PENDING` transactions left by
//!      a previous crash, before accepting new traffic
//!   3. Start the background cache syncer and (optionally) the async commit
//!      worker
//!   4. Start the JSON-RPC 2.0 server and serve until shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use ledger_cache::{BalanceCache, IdempotencyCache, KeyedLocks, Syncer};
use ledger_core::{IdempotencySlotState, TransactionStatus};
use ledger_executor::{CommitWorker, EventEmitter, InProcessQueue, TransactionExecutor};
use ledger_rpc::{RpcServer, RpcServerState};
use ledger_store::{BalanceStore, IdempotencyStore, OperationStore, StoreDb, TransactionStore};

#[derive(Parser, Debug)]
#[command(name = "ledger-node", version, about = "Ledger node — double-entry transaction engine")]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8545")]
    rpc_addr: SocketAddr,

    /// Interval between cache-to-store sync sweeps, in milliseconds.
    #[arg(long, default_value_t = 500)]
    sync_interval_ms: u64,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true" || v == "1").unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ledger=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("ledger node starting");

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating data dir {}", args.data_dir.display()))?;
    let db = Arc::new(StoreDb::open(&args.data_dir).context("opening state database")?);

    let balances = Arc::new(BalanceStore::new(db.clone()));
    let transactions = Arc::new(TransactionStore::new(db.clone()));
    let operations = Arc::new(OperationStore::new(db.clone()));
    let idempotency_store = Arc::new(IdempotencyStore::new(db));

    // ── Crash-recovery sweep (§9): resolve every PENDING transaction before
    // accepting new traffic ─────────────────────────────────────────────────
    recover_pending_transactions(&transactions, &idempotency_store)?;

    let balance_cache = Arc::new(BalanceCache::new());
    let idempotency_cache = Arc::new(IdempotencyCache::new());
    let keyed_locks = Arc::new(KeyedLocks::new());
    let events = Arc::new(EventEmitter::default());

    let syncer = Syncer::new(balance_cache.clone(), balances.clone(), Duration::from_millis(args.sync_interval_ms));
    tokio::spawn(syncer.run());

    if env_flag("RABBITMQ_TRANSACTION_EVENTS_ENABLED") {
        let mut rx = events.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                info!(transaction_id = %event.transaction_id, status = ?event.status, "transaction event");
            }
        });
    }
    if env_flag("AUDIT_LOG_ENABLED") {
        let mut rx = events.subscribe_audit();
        tokio::spawn(async move {
            while let Ok(record) = rx.recv().await {
                info!(transaction_id = %record.transaction_id, operations = record.operations.len(), "audit record");
            }
        });
    }
    if env_flag("GRPC_REFLECTION_ENABLED") {
        warn!("GRPC_REFLECTION_ENABLED is set but gRPC transport is out of scope for this node; ignoring");
    }

    let executor = Arc::new(TransactionExecutor::new(
        balances.clone(),
        transactions.clone(),
        idempotency_store.clone(),
        balance_cache.clone(),
        idempotency_cache.clone(),
        keyed_locks.clone(),
        events.clone(),
        None,
    ));

    // The async commit path (C7): an independent consumer of the same
    // commit primitives, gated separately from the synchronous RPC path so
    // batch/bulk producers can enqueue without blocking on C6 directly.
    let queue: Option<Arc<InProcessQueue>> = if env_flag("RABBITMQ_TRANSACTION_ASYNC") {
        let queue = Arc::new(InProcessQueue::new(1024));
        let worker = CommitWorker::new(
            queue.clone(),
            balances.clone(),
            transactions.clone(),
            operations,
            idempotency_store,
            balance_cache,
            idempotency_cache,
            keyed_locks,
            events,
        );
        tokio::spawn(worker.run());
        info!("async commit worker enabled (RABBITMQ_TRANSACTION_ASYNC)");
        Some(queue)
    } else {
        None
    };

    let rpc_state = Arc::new(RpcServerState {
        balances,
        transactions,
        executor,
        queue: queue.map(|q| q as Arc<dyn ledger_executor::Queue>),
    });
    let rpc_handle = RpcServer::new(rpc_state)
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    rpc_handle.stop().ok();
    Ok(())
}

/// §9 crash recovery: a transaction found `PENDING` at startup is resolved
/// by (a) marking `APPROVED` if its idempotency slot completed with this id,
/// or (b) marking `DECLINED` otherwise.
fn recover_pending_transactions(
    transactions: &TransactionStore,
    idempotency_store: &IdempotencyStore,
) -> anyhow::Result<()> {
    let pending = transactions.list_pending().context("scanning pending transactions")?;
    if pending.is_empty() {
        return Ok(());
    }
    warn!(count = pending.len(), "recovering PENDING transactions from a prior crash");

    for mut tx in pending {
        let resolved_status = match &tx.idempotency_key {
            Some(key) => {
                match idempotency_store.find(&tx.organization_id, &tx.ledger_id, key)? {
                    Some(slot)
                        if matches!(slot.state, IdempotencySlotState::Completed)
                            && slot.transaction_id == Some(tx.id) =>
                    {
                        TransactionStatus::Approved
                    }
                    _ => TransactionStatus::Declined,
                }
            }
            None => TransactionStatus::Declined,
        };
        tx.status = resolved_status;
        tx.updated_at = chrono::Utc::now();
        transactions.update(&tx)?;
        info!(transaction_id = %tx.id, status = ?resolved_status, "resolved pending transaction");
    }
    Ok(())
}
