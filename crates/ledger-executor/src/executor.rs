//! C6 — the synchronous transaction executor. The tightest contract in the
//! system (§4.6): idempotency gate, plan, route expansion, balance
//! resolution, deterministic locking, commit with bounded retry, cache
//! write-back, idempotency completion, fire-and-forget events.

use std::sync::Arc;
use std::time::Duration;

use ledger_core::{
    Alias, AliasKey, BalanceKey, LedgerError, LedgerId, Operation, OperationId, OperationType,
    OrgId, Plan, ReserveOutcome, Transaction, TransactionEntry, TransactionId, TransactionStatus,
    MAX_COMMIT_RETRIES,
};
use ledger_dsl::{parse_transfer_dsl, validate_plan, TransferAst};
use ledger_cache::{BalanceCache, IdempotencyCache, KeyedLocks};
use ledger_store::{BalanceStore, IdempotencyStore, TransactionStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::event_emitter::EventEmitter;
use crate::queue::{Queue, QueuedCommit};
use crate::route_resolver::RouteResolver;

pub enum ExecutorInput {
    Dsl(String),
    Plan(TransferAst),
}

/// Result of the idempotency gate (step 1): either no prior attempt is in
/// flight and the caller should proceed, or a completed attempt's result
/// should be replayed verbatim.
enum IdempotencyGate {
    Proceed,
    Replay(Transaction),
}

pub struct CommitRequest {
    pub organization_id: OrgId,
    pub ledger_id: LedgerId,
    pub idempotency_key: Option<String>,
    pub input: ExecutorInput,
    /// Request-scoped cancellation (§5). Checked once before the durable
    /// commit point (step 7); ignored afterwards — a transaction that has
    /// reached `PENDING` persistence runs the rest of the pipeline to
    /// completion best-effort regardless of cancellation.
    pub cancellation: CancellationToken,
}

impl CommitRequest {
    /// Build a request with no deadline (never cancelled).
    pub fn new(organization_id: OrgId, ledger_id: LedgerId, idempotency_key: Option<String>, input: ExecutorInput) -> Self {
        Self {
            organization_id,
            ledger_id,
            idempotency_key,
            input,
            cancellation: CancellationToken::new(),
        }
    }
}

pub struct TransactionExecutor {
    balances: Arc<BalanceStore>,
    transactions: Arc<TransactionStore>,
    idempotency_store: Arc<IdempotencyStore>,
    balance_cache: Arc<BalanceCache>,
    idempotency_cache: Arc<IdempotencyCache>,
    keyed_locks: Arc<KeyedLocks>,
    events: Arc<EventEmitter>,
    route_resolver: Option<Arc<RouteResolver>>,
}

/// Sentinel alias prefix a plan can use to mean "resolve via C9/C3 before
/// locking", e.g. `@route:<route-id>`. Resolution substitutes the first
/// concrete alias the route expands to; fan-out across multiple resolved
/// aliases is left to callers composing several plan entries explicitly.
const ROUTE_ALIAS_PREFIX: &str = "@route:";

impl TransactionExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        balances: Arc<BalanceStore>,
        transactions: Arc<TransactionStore>,
        idempotency_store: Arc<IdempotencyStore>,
        balance_cache: Arc<BalanceCache>,
        idempotency_cache: Arc<IdempotencyCache>,
        keyed_locks: Arc<KeyedLocks>,
        events: Arc<EventEmitter>,
        route_resolver: Option<Arc<RouteResolver>>,
    ) -> Self {
        Self {
            balances,
            transactions,
            idempotency_store,
            balance_cache,
            idempotency_cache,
            keyed_locks,
            events,
            route_resolver,
        }
    }

    pub async fn execute(&self, req: CommitRequest) -> Result<Transaction, LedgerError> {
        let now = chrono::Utc::now();

        // ── Step 1: idempotency gate ─────────────────────────────────────
        if let IdempotencyGate::Replay(tx) = self.idempotency_gate(&req, now)? {
            return Ok(tx);
        }

        match self.execute_inner(&req, now).await {
            Ok(tx) => {
                if let Some(key) = &req.idempotency_key {
                    self.idempotency_store
                        .complete(&req.organization_id, &req.ledger_id, key, tx.id, tx.clone())?;
                    self.idempotency_cache.complete(&req.organization_id, &req.ledger_id, key, tx.id, tx.clone());
                }
                Ok(tx)
            }
            Err(e) => Err(e),
        }
    }

    /// C7 entry point: steps 1-3 run synchronously (idempotency gate, plan,
    /// route expansion), then the plan is attached to a durably persisted
    /// `PENDING` transaction row and handed to `queue` — a `CommitWorker`
    /// performs steps 4-10 against it later. Returns the `PENDING` row;
    /// callers poll for its eventual terminal status.
    pub async fn enqueue(&self, req: CommitRequest, queue: &Arc<dyn Queue>) -> Result<Transaction, LedgerError> {
        let now = chrono::Utc::now();

        if let IdempotencyGate::Replay(tx) = self.idempotency_gate(&req, now)? {
            return Ok(tx);
        }

        let plan = self.build_plan(&req)?;
        let tx = Transaction {
            id: TransactionId::new(),
            organization_id: req.organization_id,
            ledger_id: req.ledger_id,
            status: TransactionStatus::Pending,
            sources: plan.sources.clone(),
            destinations: plan.destinations.clone(),
            holds: plan.holds.clone(),
            releases: plan.releases.clone(),
            description: plan.description.clone(),
            metadata: plan.metadata.clone(),
            idempotency_key: req.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        };
        self.transactions.create(&tx)?;

        queue
            .publish(QueuedCommit {
                organization_id: req.organization_id,
                ledger_id: req.ledger_id,
                transaction_id: tx.id,
                plan,
                idempotency_key: req.idempotency_key.clone(),
            })
            .await?;

        Ok(tx)
    }

    fn idempotency_gate(&self, req: &CommitRequest, now: ledger_core::Timestamp) -> Result<IdempotencyGate, LedgerError> {
        let Some(key) = &req.idempotency_key else { return Ok(IdempotencyGate::Proceed) };
        if key.len() > ledger_core::MAX_IDEMPOTENCY_KEY_BYTES {
            return Err(LedgerError::ValidationError("idempotency key exceeds 255 bytes".into()));
        }
        let expires_at = now + chrono::Duration::seconds(ledger_core::DEFAULT_IDEMPOTENCY_TTL_SECS);
        match self
            .idempotency_store
            .reserve(&req.organization_id, &req.ledger_id, key, expires_at, now)?
        {
            ReserveOutcome::ReservedNew => {
                self.idempotency_cache.reserve(&req.organization_id, &req.ledger_id, key, expires_at, now);
                Ok(IdempotencyGate::Proceed)
            }
            ReserveOutcome::Existing(slot) => match slot.state {
                ledger_core::IdempotencySlotState::Completed => Ok(IdempotencyGate::Replay(
                    slot.result
                        .ok_or_else(|| LedgerError::Internal("completed idempotency slot missing result".into()))?,
                )),
                ledger_core::IdempotencySlotState::Reserved => Err(LedgerError::InProgress),
            },
        }
    }

    fn build_plan(&self, req: &CommitRequest) -> Result<Plan, LedgerError> {
        let ast = match &req.input {
            ExecutorInput::Dsl(text) => parse_transfer_dsl(text)?,
            ExecutorInput::Plan(ast) => ast.clone(),
        };
        let ast = self.expand_routes(req, ast)?;
        validate_plan(&ast)
    }

    async fn execute_inner(&self, req: &CommitRequest, now: ledger_core::Timestamp) -> Result<Transaction, LedgerError> {
        // ── Steps 2-3: plan and route expansion ──────────────────────────
        let plan = self.build_plan(req)?;

        // ── Steps 4-7 with bounded retry on NoBalancesUpdated ────────────
        let mut attempt = 0u32;
        loop {
            match self.try_commit(req, &plan, now).await {
                Ok(tx) => return Ok(tx),
                Err(LedgerError::NoBalancesUpdated) => {
                    attempt += 1;
                    if attempt >= MAX_COMMIT_RETRIES {
                        return Err(LedgerError::ConcurrencyExhausted { attempts: attempt });
                    }
                    let backoff = Duration::from_millis(20 * 2u64.pow(attempt));
                    warn!(attempt, "commit: stale balance snapshot, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn expand_routes(&self, req: &CommitRequest, mut ast: TransferAst) -> Result<TransferAst, LedgerError> {
        let Some(resolver) = &self.route_resolver else { return Ok(ast) };
        for entry in ast.sources.iter_mut().chain(ast.destinations.iter_mut()).chain(ast.holds.iter_mut()).chain(ast.releases.iter_mut()) {
            if let Some(route_id_str) = entry.alias.0.strip_prefix(ROUTE_ALIAS_PREFIX) {
                let route_id = ledger_core::RouteId::parse(route_id_str)
                    .map_err(|e| LedgerError::ValidationError(format!("invalid route id: {e}")))?;
                let resolved = resolver.resolve(&req.organization_id, &req.ledger_id, &route_id, &entry.asset_code)?;
                let alias = resolved
                    .source_aliases
                    .first()
                    .or_else(|| resolved.destination_aliases.first())
                    .cloned()
                    .ok_or_else(|| LedgerError::RouteUnresolved(route_id.to_string()))?;
                entry.alias = alias;
            }
        }
        Ok(ast)
    }

    /// Steps 4-7 of §4.6: balance resolution through commit. Re-run fresh on
    /// every retry so a stale snapshot is never reused.
    async fn try_commit(
        &self,
        req: &CommitRequest,
        plan: &Plan,
        now: ledger_core::Timestamp,
    ) -> Result<Transaction, LedgerError> {
        let lock_keys: Vec<String> = plan.aliases_to_lock.iter().map(|k| k.0.clone()).collect();
        let _guards = self.keyed_locks.lock_many(&lock_keys).await;

        // ── Step 4: balance resolution ───────────────────────────────────
        let pairs = alias_key_pairs(plan);
        let balances = self.balances.list_by_alias_key_pairs(&pairs)?;

        let source_aliases: std::collections::HashSet<AliasKey> =
            plan.sources.iter().map(|e| AliasKey::compose(&e.alias, &e.key)).collect();
        let dest_aliases: std::collections::HashSet<AliasKey> =
            plan.destinations.iter().map(|e| AliasKey::compose(&e.alias, &e.key)).collect();
        let asset_by_alias: std::collections::HashMap<AliasKey, &ledger_core::AssetCode> = plan
            .sources
            .iter()
            .chain(plan.destinations.iter())
            .map(|e| (AliasKey::compose(&e.alias, &e.key), &e.asset_code))
            .collect();

        let mut by_alias_key = std::collections::HashMap::new();
        for b in balances {
            if b.is_deleted() {
                return Err(LedgerError::EntityNotFound(format!("balance {}#{} is deleted", b.alias, b.key)));
            }
            let ak = AliasKey::compose(&b.alias, &b.key);
            if let Some(expected_asset) = asset_by_alias.get(&ak) {
                if b.asset_code != **expected_asset {
                    return Err(LedgerError::ValidationError(format!(
                        "asset code mismatch for {ak}: plan says {}, balance is {}",
                        expected_asset, b.asset_code
                    )));
                }
            }
            if source_aliases.contains(&ak) && !b.allow_sending {
                return Err(LedgerError::CapabilityDenied(format!("{ak} does not allow sending")));
            }
            if dest_aliases.contains(&ak) && !b.allow_receiving {
                return Err(LedgerError::CapabilityDenied(format!("{ak} does not allow receiving")));
            }
            by_alias_key.insert(ak, b);
        }

        // ── Step 6: compute new states ───────────────────────────────────
        // If the operation is a HOLD, move the amount from `available` to
        // `onHold` instead of applying it as a transfer delta; a RELEASE
        // reverses it. An alias touched by both a transfer leg and a
        // hold/release leg gets one merged version bump, not two.
        let mut touched: std::collections::BTreeSet<AliasKey> = plan.per_alias_delta.keys().cloned().collect();
        touched.extend(plan.per_alias_hold_delta.keys().cloned());

        let mut new_balances = Vec::with_capacity(touched.len());
        let mut ops = Vec::with_capacity(plan.sources.len() + plan.destinations.len() + plan.holds.len() + plan.releases.len());
        let tx_id = TransactionId::new();

        for ak in &touched {
            let b = by_alias_key.get(ak).expect("resolved above");
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
            next.updated_at = now;
            new_balances.push(next);
        }
        for e in &plan.sources {
            ops.push(operation_for(tx_id, &by_alias_key, e, OperationType::Debit, now)?);
        }
        for e in &plan.destinations {
            ops.push(operation_for(tx_id, &by_alias_key, e, OperationType::Credit, now)?);
        }
        for e in &plan.holds {
            ops.push(operation_for(tx_id, &by_alias_key, e, OperationType::Hold, now)?);
        }
        for e in &plan.releases {
            ops.push(operation_for(tx_id, &by_alias_key, e, OperationType::Release, now)?);
        }

        let approved = Transaction {
            id: tx_id,
            organization_id: req.organization_id,
            ledger_id: req.ledger_id,
            status: TransactionStatus::Approved,
            sources: plan.sources.clone(),
            destinations: plan.destinations.clone(),
            holds: plan.holds.clone(),
            releases: plan.releases.clone(),
            description: plan.description.clone(),
            metadata: plan.metadata.clone(),
            idempotency_key: req.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        };

        // ── Step 7: commit ────────────────────────────────────────────────
        // Post-gate work up to here may be abandoned on cancellation; once we
        // cross this point the transaction is durable and runs to completion.
        // The transaction row, every operation, and the balance mutations
        // they cause are written atomically — a crash can never leave money
        // moved with the transaction row missing or stuck `PENDING`.
        if req.cancellation.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        self.transactions.commit(&approved, &ops, &new_balances)?;

        // ── Step 8: cache write-back ──────────────────────────────────────
        for b in &new_balances {
            let ak = AliasKey::compose(&b.alias, &b.key);
            self.balance_cache.put(&req.organization_id, &req.ledger_id, &ak, b.clone());
        }

        // ── Step 10: events (fire-and-forget, never fails the transaction) ─
        self.events.emit_transaction(&approved);
        self.events.emit_audit(approved.id, ops);

        info!(transaction_id = %approved.id, "transaction approved");
        Ok(approved)
    }
}

fn alias_key_pairs(plan: &Plan) -> Vec<(Alias, BalanceKey)> {
    plan.sources
        .iter()
        .chain(plan.destinations.iter())
        .chain(plan.holds.iter())
        .chain(plan.releases.iter())
        .map(|e| (e.alias.clone(), e.key.clone()))
        .collect()
}

fn operation_for(
    tx_id: TransactionId,
    by_alias_key: &std::collections::HashMap<AliasKey, ledger_core::Balance>,
    entry: &TransactionEntry,
    op_type: OperationType,
    now: ledger_core::Timestamp,
) -> Result<Operation, LedgerError> {
    let ak = AliasKey::compose(&entry.alias, &entry.key);
    let b = by_alias_key
        .get(&ak)
        .ok_or_else(|| LedgerError::EntityNotFound(format!("balance {ak}")))?;
    Ok(Operation {
        id: OperationId::new(),
        transaction_id: tx_id,
        balance_id: b.id,
        operation_type: op_type,
        amount: entry.amount,
        asset_code: entry.asset_code.clone(),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{AccountId, AccountType, Balance, BalanceId, BalanceKey, Money};
    use ledger_dsl::AstEntry;
    use ledger_store::StoreDb;

    fn new_balance(org_id: OrgId, ledger_id: LedgerId, alias: &str, available: i64) -> Balance {
        let now = chrono::Utc::now();
        Balance {
            id: BalanceId::new(),
            organization_id: org_id,
            ledger_id,
            account_id: AccountId::new(),
            alias: Alias::new(alias),
            key: BalanceKey::default_key(),
            asset_code: ledger_core::AssetCode::new("USD"),
            available: Money::new(available, 0),
            on_hold: Money::ZERO,
            version: 1,
            account_type: AccountType::Deposit,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn build_executor() -> (TransactionExecutor, Arc<BalanceStore>) {
        let db = Arc::new(StoreDb::open_temp().unwrap());
        let balances = Arc::new(BalanceStore::new(db.clone()));
        let executor = TransactionExecutor::new(
            balances.clone(),
            Arc::new(TransactionStore::new(db.clone())),
            Arc::new(IdempotencyStore::new(db)),
            Arc::new(BalanceCache::new()),
            Arc::new(IdempotencyCache::new()),
            Arc::new(KeyedLocks::new()),
            Arc::new(EventEmitter::default()),
            None,
        );
        (executor, balances)
    }

    fn entry(alias: &str, amount: i64) -> AstEntry {
        AstEntry {
            alias: Alias::new(alias),
            key: BalanceKey::default_key(),
            amount: Money::new(amount, 0),
            asset_code: ledger_core::AssetCode::new("USD"),
        }
    }

    #[tokio::test]
    async fn commits_a_balanced_transfer_and_moves_funds() {
        let (executor, balances) = build_executor();
        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let from = new_balance(org_id, ledger_id, "@alice", 100);
        let to = new_balance(org_id, ledger_id, "@bob", 0);
        balances.create(&from).unwrap();
        balances.create(&to).unwrap();

        let ast = TransferAst {
            sources: vec![entry("@alice", 40)],
            destinations: vec![entry("@bob", 40)],
            rate: None,
            description: Some("test transfer".into()),
            metadata: None,
        };
        let req = CommitRequest::new(org_id, ledger_id, None, ExecutorInput::Plan(ast));
        let tx = executor.execute(req).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Approved);

        let alice = balances.find_by_id(&from.id).unwrap().unwrap();
        let bob = balances.find_by_id(&to.id).unwrap().unwrap();
        assert_eq!(alice.available, Money::new(60, 0));
        assert_eq!(bob.available, Money::new(40, 0));
        assert_eq!(alice.version, 2);
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_balances_untouched() {
        let (executor, balances) = build_executor();
        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let from = new_balance(org_id, ledger_id, "@alice", 10);
        let to = new_balance(org_id, ledger_id, "@bob", 0);
        balances.create(&from).unwrap();
        balances.create(&to).unwrap();

        let ast = TransferAst {
            sources: vec![entry("@alice", 40)],
            destinations: vec![entry("@bob", 40)],
            rate: None,
            description: None,
            metadata: None,
        };
        let req = CommitRequest::new(org_id, ledger_id, None, ExecutorInput::Plan(ast));
        let err = executor.execute(req).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
        assert_eq!(balances.find_by_id(&from.id).unwrap().unwrap().available, Money::new(10, 0));
    }

    #[tokio::test]
    async fn hold_moves_funds_from_available_to_on_hold() {
        let (executor, balances) = build_executor();
        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let alice = new_balance(org_id, ledger_id, "@alice", 100);
        balances.create(&alice).unwrap();

        let ast = TransferAst {
            holds: vec![entry("@alice", 30)],
            ..Default::default()
        };
        let req = CommitRequest::new(org_id, ledger_id, None, ExecutorInput::Plan(ast));
        let tx = executor.execute(req).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Approved);

        let row = balances.find_by_id(&alice.id).unwrap().unwrap();
        assert_eq!(row.available, Money::new(70, 0));
        assert_eq!(row.on_hold, Money::new(30, 0));
    }

    #[tokio::test]
    async fn release_moves_funds_back_from_on_hold_to_available() {
        let (executor, balances) = build_executor();
        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let mut alice = new_balance(org_id, ledger_id, "@alice", 70);
        alice.on_hold = Money::new(30, 0);
        balances.create(&alice).unwrap();

        let ast = TransferAst {
            releases: vec![entry("@alice", 30)],
            ..Default::default()
        };
        let req = CommitRequest::new(org_id, ledger_id, None, ExecutorInput::Plan(ast));
        executor.execute(req).await.unwrap();

        let row = balances.find_by_id(&alice.id).unwrap().unwrap();
        assert_eq!(row.available, Money::new(100, 0));
        assert_eq!(row.on_hold, Money::ZERO);
    }

    #[tokio::test]
    async fn repeated_idempotency_key_replays_the_same_result() {
        let (executor, balances) = build_executor();
        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let from = new_balance(org_id, ledger_id, "@alice", 100);
        let to = new_balance(org_id, ledger_id, "@bob", 0);
        balances.create(&from).unwrap();
        balances.create(&to).unwrap();

        let build_req = || {
            CommitRequest::new(
                org_id,
                ledger_id,
                Some("req-1".into()),
                ExecutorInput::Plan(TransferAst {
                    sources: vec![entry("@alice", 40)],
                    destinations: vec![entry("@bob", 40)],
                    rate: None,
                    description: None,
                    metadata: None,
                }),
            )
        };

        let first = executor.execute(build_req()).await.unwrap();
        let second = executor.execute(build_req()).await.unwrap();
        assert_eq!(first.id, second.id);

        let alice = balances.find_by_id(&from.id).unwrap().unwrap();
        assert_eq!(alice.available, Money::new(60, 0));
    }

    #[tokio::test]
    async fn enqueue_persists_a_pending_transaction_and_publishes_a_queued_commit() {
        let (executor, balances) = build_executor();
        let org_id = OrgId::new();
        let ledger_id = LedgerId::new();
        let from = new_balance(org_id, ledger_id, "@alice", 100);
        let to = new_balance(org_id, ledger_id, "@bob", 0);
        balances.create(&from).unwrap();
        balances.create(&to).unwrap();

        let queue: Arc<dyn Queue> = Arc::new(crate::queue::InProcessQueue::new(8));
        let ast = TransferAst {
            sources: vec![entry("@alice", 40)],
            destinations: vec![entry("@bob", 40)],
            rate: None,
            description: None,
            metadata: None,
        };
        let req = CommitRequest::new(org_id, ledger_id, None, ExecutorInput::Plan(ast));
        let tx = executor.enqueue(req, &queue).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        // the PENDING row is durable before the worker ever sees the commit
        let row = executor.transactions.find_by_id(&tx.id).unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Pending);

        let commit = queue.consume().await.expect("queued commit");
        assert_eq!(commit.transaction_id, tx.id);
        assert_eq!(commit.organization_id, org_id);

        // balances are untouched until a worker actually processes the commit
        let alice = balances.find_by_id(&from.id).unwrap().unwrap();
        assert_eq!(alice.available, Money::new(100, 0));
    }
}
