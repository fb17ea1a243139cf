//! The `Queue` abstraction C7 is written against. Transport plumbing
//! (exchange/routing-key wiring, per §6) is out of scope; this crate ships
//! one in-process implementation backed by `tokio::sync::mpsc`, mirroring
//! the teacher's inbound-transaction channel in its node main loop. A
//! production deployment swaps this for an AMQP client without touching
//! C7's retry/dead-letter logic.

use async_trait::async_trait;
use ledger_core::{LedgerId, OrgId, Plan};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One unit of asynchronously-executed work: the durable `PENDING`
/// transaction id already exists; the worker performs steps 4-10 of the
/// synchronous procedure against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedCommit {
    pub organization_id: OrgId,
    pub ledger_id: LedgerId,
    pub transaction_id: ledger_core::TransactionId,
    pub plan: Plan,
    pub idempotency_key: Option<String>,
}

/// Outcome a worker reports back after attempting a queued commit.
pub enum AckOutcome {
    /// Commit succeeded; drop the message.
    Ack,
    /// A surface-immediately error; dead-letter with the reason.
    DeadLetter(String),
    /// A local-retry error; redeliver with backoff.
    Nack,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn publish(&self, commit: QueuedCommit) -> Result<(), ledger_core::LedgerError>;

    /// Pulls the next message, or `None` if the queue is closed.
    async fn consume(&self) -> Option<QueuedCommit>;

    /// Reports the outcome of processing a previously-consumed message.
    async fn report(&self, commit: &QueuedCommit, outcome: AckOutcome);
}

/// In-process, single-exchange queue. Not durable across restarts — a
/// crash drops in-flight messages, which is why the synchronous path (C6)
/// never depends on C7 for correctness, only for throughput.
pub struct InProcessQueue {
    tx: mpsc::Sender<QueuedCommit>,
    rx: tokio::sync::Mutex<mpsc::Receiver<QueuedCommit>>,
    dead_letters: tokio::sync::Mutex<Vec<(QueuedCommit, String)>>,
}

impl InProcessQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            dead_letters: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().await.len()
    }
}

#[async_trait]
impl Queue for InProcessQueue {
    async fn publish(&self, commit: QueuedCommit) -> Result<(), ledger_core::LedgerError> {
        self.tx
            .send(commit)
            .await
            .map_err(|e| ledger_core::LedgerError::Internal(format!("queue closed: {e}")))
    }

    async fn consume(&self) -> Option<QueuedCommit> {
        self.rx.lock().await.recv().await
    }

    async fn report(&self, commit: &QueuedCommit, outcome: AckOutcome) {
        match outcome {
            AckOutcome::Ack => {}
            AckOutcome::DeadLetter(reason) => {
                self.dead_letters.lock().await.push((commit.clone(), reason));
            }
            AckOutcome::Nack => {
                // Best-effort redelivery: re-publish to the back of the queue.
                let _ = self.tx.send(commit.clone()).await;
            }
        }
    }
}
