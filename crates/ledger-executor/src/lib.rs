pub mod event_emitter;
pub mod executor;
pub mod queue;
pub mod route_resolver;
pub mod worker;

pub use event_emitter::{AuditRecord, EventEmitter, TransactionEvent};
pub use executor::{CommitRequest, ExecutorInput, TransactionExecutor};
pub use queue::{AckOutcome, InProcessQueue, Queue, QueuedCommit};
pub use route_resolver::{ResolvedRoute, RouteResolver};
pub use worker::CommitWorker;
