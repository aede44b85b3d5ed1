//! Offline-first client for the ledger.
//!
//! - [`MutationGateway`]: turns user intents into optimistic cache updates and
//!   queued or direct calls to the store
//! - [`OfflineQueue`]: durable per-resource FIFO of intents
//! - [`SyncEngine`]: rate-limited replay of the queue
//! - [`LedgerBackend`]: the store, over HTTP or in-process

pub use backend::{BackendError, HttpBackend, LedgerBackend, LocalBackend};
pub use cache::{CachedTransaction, OptimisticCache, Snapshot};
pub use config::{ClientConfig, SyncConfig};
pub use error::{ClientError, Result};
pub use gateway::{MutationGateway, MutationReceipt, MutationStatus};
pub use ids::{IdMap, LocalId, TempId};
pub use operation::{Operation, OperationKind, TransactionEdit, TransferEdit};
pub use queue::{OfflineQueue, OperationState, QueuedOperation};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use sync::{DrainReport, OperationReport, OperationResult, SyncEngine};

pub mod backend;
pub mod cache;
pub mod config;
mod error;
mod gateway;
mod ids;
mod operation;
pub mod queue;
mod rate_limit;
mod retry;
pub mod store;
pub mod sync;
