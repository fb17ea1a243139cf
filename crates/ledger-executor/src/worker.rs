//! C7 — the asynchronous worker. Consumes `QueuedCommit`s and performs the
//! same steps 4-10 the synchronous executor performs for step-1/2/3 already
//! durable `PENDING` transactions (§4.7). A crash mid-processing leaves the
//! transaction `PENDING`; the crash-recovery sweep (§9) reconciles it.

use std::sync::Arc;

use ledger_core::{LedgerError, Plan, TransactionStatus};
use tracing::{error, info, warn};

use crate::event_emitter::EventEmitter;
use crate::queue::{AckOutcome, Queue, QueuedCommit};
use ledger_cache::{BalanceCache, IdempotencyCache, KeyedLocks};
use ledger_store::{BalanceStore, IdempotencyStore, OperationStore, TransactionStore};

pub struct CommitWorker {
    queue: Arc<dyn Queue>,
    balances: Arc<BalanceStore>,
    transactions: Arc<TransactionStore>,
    operations: Arc<OperationStore>,
    idempotency_store: Arc<IdempotencyStore>,
    balance_cache: Arc<BalanceCache>,
    idempotency_cache: Arc<IdempotencyCache>,
    keyed_locks: Arc<KeyedLocks>,
    events: Arc<EventEmitter>,
}

impl CommitWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn Queue>,
        balances: Arc<BalanceStore>,
        transactions: Arc<TransactionStore>,
        operations: Arc<OperationStore>,
        idempotency_store: Arc<IdempotencyStore>,
        balance_cache: Arc<BalanceCache>,
        idempotency_cache: Arc<IdempotencyCache>,
        keyed_locks: Arc<KeyedLocks>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            queue,
            balances,
            transactions,
            operations,
            idempotency_store,
            balance_cache,
            idempotency_cache,
            keyed_locks,
            events,
        }
    }

    /// Runs until the queue is closed. Intended to be spawned as its own
    /// task; one or more workers may run against the same `Queue`.
    pub async fn run(self) {
        while let Some(commit) = self.queue.consume().await {
            let outcome = self.process(&commit).await;
            self.queue.report(&commit, outcome).await;
        }
        info!("commit worker: queue closed, exiting");
    }

    async fn process(&self, commit: &QueuedCommit) -> AckOutcome {
        match self.commit_once(commit).await {
            Ok(()) => AckOutcome::Ack,
            Err(e) if e.is_retryable() => {
                warn!(transaction_id = %commit.transaction_id, error = %e, "retryable commit failure, nacking");
                AckOutcome::Nack
            }
            Err(e) => {
                error!(transaction_id = %commit.transaction_id, error = %e, "non-retryable commit failure, dead-lettering");
                AckOutcome::DeadLetter(e.to_string())
            }
        }
    }

    async fn commit_once(&self, commit: &QueuedCommit) -> Result<(), LedgerError> {
        let tx = self
            .transactions
            .find_by_id(&commit.transaction_id)?
            .ok_or_else(|| LedgerError::EntityNotFound(format!("transaction {}", commit.transaction_id)))?;
        if tx.status.is_terminal() {
            return Ok(());
        }

        let lock_keys: Vec<String> = commit.plan.aliases_to_lock.iter().map(|k| k.0.clone()).collect();
        let _guards = self.keyed_locks.lock_many(&lock_keys).await;

        let new_balances = self.resolve_and_apply(&commit.plan)?;
        let ops = operations_for(commit, &new_balances);

        let mut approved = tx;
        approved.status = TransactionStatus::Approved;
        approved.updated_at = chrono::Utc::now();

        // Transaction row, operations, and balance mutations commit
        // atomically — see the synchronous executor's step 7 for why.
        self.transactions.commit(&approved, &ops, &new_balances)?;

        for b in &new_balances {
            let ak = ledger_core::AliasKey::compose(&b.alias, &b.key);
            self.balance_cache.put(&commit.organization_id, &commit.ledger_id, &ak, b.clone());
        }

        if let Some(key) = &commit.idempotency_key {
            self.idempotency_store
                .complete(&commit.organization_id, &commit.ledger_id, key, approved.id, approved.clone())?;
            self.idempotency_cache
                .complete(&commit.organization_id, &commit.ledger_id, key, approved.id, approved.clone());
        }

        self.events.emit_transaction(&approved);
        let ops = self.operations.list_by_transaction(&approved.id)?;
        self.events.emit_audit(approved.id, ops);
        Ok(())
    }

    fn resolve_and_apply(&self, plan: &Plan) -> Result<Vec<ledger_core::Balance>, LedgerError> {
        let pairs: Vec<_> = plan
            .sources
            .iter()
            .chain(plan.destinations.iter())
            .chain(plan.holds.iter())
            .chain(plan.releases.iter())
            .map(|e| (e.alias.clone(), e.key.clone()))
            .collect();
        let balances = self.balances.list_by_alias_key_pairs(&pairs)?;
        let mut by_alias_key = std::collections::HashMap::new();
        for b in balances {
            let ak = ledger_core::AliasKey::compose(&b.alias, &b.key);
            by_alias_key.insert(ak, b);
        }

        let mut touched: std::collections::BTreeSet<ledger_core::AliasKey> = plan.per_alias_delta.keys().cloned().collect();
        touched.extend(plan.per_alias_hold_delta.keys().cloned());

        let mut out = Vec::with_capacity(touched.len());
        for ak in &touched {
            let b = by_alias_key
                .get(ak)
                .ok_or_else(|| LedgerError::EntityNotFound(format!("balance {ak}")))?;
            let mut next = b.clone();
            if let Some(delta) = plan.per_alias_delta.get(ak) {
                next.available += *delta;
            }
            if let Some(hold_delta) = plan.per_alias_hold_delta.get(ak) {
                next.available -= *hold_delta;
                next.on_hold += *hold_delta;
            }
            if next.available.is_sign_negative() {
                return Err(LedgerError::InsufficientFunds(format!("{ak} would go negative")));
            }
            if next.on_hold.is_sign_negative() {
                return Err(LedgerError::InsufficientFunds(format!("{ak} hold would go negative")));
            }
            next.version += 1;
            next.updated_at = chrono::Utc::now();
            out.push(next);
        }
        Ok(out)
    }
}

fn operations_for(commit: &QueuedCommit, new_balances: &[ledger_core::Balance]) -> Vec<ledger_core::Operation> {
    let by_alias_key: std::collections::HashMap<_, _> = new_balances
        .iter()
        .map(|b| (ledger_core::AliasKey::compose(&b.alias, &b.key), b))
        .collect();
    let now = chrono::Utc::now();
    let mut ops = Vec::with_capacity(
        commit.plan.sources.len() + commit.plan.destinations.len() + commit.plan.holds.len() + commit.plan.releases.len(),
    );
    let mut push = |entries: &[ledger_core::TransactionEntry], op_type: ledger_core::OperationType| {
        for e in entries {
            let ak = ledger_core::AliasKey::compose(&e.alias, &e.key);
            if let Some(b) = by_alias_key.get(&ak) {
                ops.push(ledger_core::Operation {
                    id: ledger_core::OperationId::new(),
                    transaction_id: commit.transaction_id,
                    balance_id: b.id,
                    operation_type: op_type,
                    amount: e.amount,
                    asset_code: e.asset_code.clone(),
                    created_at: now,
                });
            }
        }
    };
    push(&commit.plan.sources, ledger_core::OperationType::Debit);
    push(&commit.plan.destinations, ledger_core::OperationType::Credit);
    push(&commit.plan.holds, ledger_core::OperationType::Hold);
    push(&commit.plan.releases, ledger_core::OperationType::Release);
    ops
}
