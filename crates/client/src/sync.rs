//! Replays queued intents against the authoritative store.

use api_types::{
    ledger::DeleteScope,
    reply::{Rejection, Reply, ResultCode},
    transaction::TransactionDelete,
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, stream};
use uuid::Uuid;

use crate::{
    backend::{BackendError, LedgerBackend},
    config::SyncConfig,
    error::Result,
    ids::{IdMap, LocalId},
    operation::{Operation, OperationKind},
    queue::{OfflineQueue, QueuedOperation},
    rate_limit::RateLimiter,
    retry::BackoffPolicy,
};

/// What the store handed back for an applied intent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Confirmation {
    /// Temporary ids to authoritative ids.
    pub ids: IdMap,
    /// Authoritative balances reported alongside the write.
    pub balances: Vec<(Uuid, i64)>,
}

/// Result of one authoritative call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Applied(Confirmation),
    Rejected { code: ResultCode, message: String },
    /// Lock contention or a missing transfer pair; worth one immediate retry.
    Conflict(String),
    /// Outcome unknown; replay later.
    Transient(String),
}

fn unresolved(target: &LocalId) -> Dispatch {
    Dispatch::Rejected {
        code: ResultCode::InvalidInput,
        message: format!("{target} was never confirmed by the server"),
    }
}

fn settle<T>(
    reply: std::result::Result<Reply<T>, BackendError>,
    applied: impl FnOnce(T) -> Confirmation,
) -> Dispatch {
    match reply {
        Ok(reply) => match reply.into_result() {
            Ok(data) => Dispatch::Applied(applied(data)),
            Err(Rejection { code, reason }) if code == ResultCode::InternalError => {
                Dispatch::Transient(reason)
            }
            Err(Rejection { code, reason }) => Dispatch::Rejected {
                code,
                message: reason,
            },
        },
        Err(BackendError::Conflict(reason)) => Dispatch::Conflict(reason),
        Err(err) if err.is_transient() => Dispatch::Transient(err.to_string()),
        Err(err) => Dispatch::Rejected {
            code: ResultCode::InvalidInput,
            message: err.to_string(),
        },
    }
}

/// Sends one operation. Deletes answered with `not-found` count as applied:
/// an earlier attempt already removed the row.
pub async fn dispatch(backend: &dyn LedgerBackend, operation: &Operation) -> Dispatch {
    match operation {
        Operation::CreateTransaction { temp_id, request } => {
            let account_id = request.account_id;
            settle(
                backend.create_transaction(request.clone()).await,
                |created| Confirmation {
                    ids: IdMap::from([(temp_id.clone(), created.transaction_id)]),
                    balances: vec![(account_id, created.new_balance)],
                },
            )
        }
        Operation::EditTransaction { target, edit } => {
            let Some(id) = target.real() else {
                return unresolved(target);
            };
            settle(
                backend
                    .update_transaction(edit.clone().into_request(id))
                    .await,
                |_| Confirmation::default(),
            )
        }
        Operation::DeleteTransaction { target, scope } => {
            let Some(id) = target.real() else {
                return unresolved(target);
            };
            delete(backend, id, *scope).await
        }
        Operation::CreateTransfer { temp_id, request } => {
            let (from, to) = (request.from_account_id, request.to_account_id);
            settle(backend.create_transfer(request.clone()).await, |created| {
                Confirmation {
                    ids: IdMap::from([
                        (temp_id.clone(), created.outgoing_id),
                        (temp_id.incoming_leg(), created.incoming_id),
                    ]),
                    balances: vec![(from, created.from_balance), (to, created.to_balance)],
                }
            })
        }
        Operation::EditTransfer { target, edit } => {
            let Some(id) = target.real() else {
                return unresolved(target);
            };
            settle(
                backend.update_transfer(edit.clone().into_request(id)).await,
                |_| Confirmation::default(),
            )
        }
        Operation::DeleteTransfer { target } => {
            let Some(id) = target.real() else {
                return unresolved(target);
            };
            delete(backend, id, DeleteScope::Current).await
        }
        Operation::CreateRecurringSeries { temp_id, request } => settle(
            backend.create_recurring_series(request.clone()).await,
            |created| {
                let mut ids = IdMap::from([(temp_id.clone(), created.template_id)]);
                ids.extend(
                    created
                        .instance_ids
                        .iter()
                        .enumerate()
                        .map(|(index, id)| (temp_id.instance(index), *id)),
                );
                Confirmation {
                    ids,
                    balances: Vec::new(),
                }
            },
        ),
    }
}

async fn delete(backend: &dyn LedgerBackend, transaction_id: Uuid, scope: DeleteScope) -> Dispatch {
    let reply = backend
        .delete_transaction(TransactionDelete {
            transaction_id,
            scope,
        })
        .await;
    match settle(reply, |_| Confirmation::default()) {
        Dispatch::Rejected {
            code: ResultCode::NotFound,
            ..
        } => {
            tracing::debug!(%transaction_id, "delete replay found nothing, already applied");
            Dispatch::Applied(Confirmation::default())
        }
        other => other,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Confirmed(Confirmation),
    /// Rejected by the store, or failed because an earlier operation on the
    /// same resource was.
    Rejected { code: ResultCode, message: String },
    Retrying {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: String,
    },
    /// Out of retries; kept as a failure until retried or discarded.
    Exhausted { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationReport {
    pub op_id: Uuid,
    pub seq: u64,
    pub kind: OperationKind,
    pub result: OperationResult,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// In queue order.
    pub results: Vec<OperationReport>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn confirmed(&self) -> usize {
        self.count(|result| matches!(result, OperationResult::Confirmed(_)))
    }

    pub fn rejected(&self) -> usize {
        self.count(|result| matches!(result, OperationResult::Rejected { .. }))
    }

    pub fn retrying(&self) -> usize {
        self.count(|result| matches!(result, OperationResult::Retrying { .. }))
    }

    pub fn exhausted(&self) -> usize {
        self.count(|result| matches!(result, OperationResult::Exhausted { .. }))
    }

    fn count(&self, predicate: impl Fn(&OperationResult) -> bool) -> usize {
        self.results
            .iter()
            .filter(|report| predicate(&report.result))
            .count()
    }
}

pub struct SyncEngine {
    config: SyncConfig,
    limiter: RateLimiter,
    backoff: BackoffPolicy,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        let limiter = RateLimiter::new(
            config.bucket_capacity,
            config.refill_per_sec,
            config.min_dispatch_interval(),
        );
        let backoff = config.backoff();
        Self {
            config,
            limiter,
            backoff,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Rate-limited, time-boxed [`dispatch`] with one immediate retry on
    /// conflict.
    pub async fn send(&self, backend: &dyn LedgerBackend, operation: &Operation) -> Dispatch {
        self.limiter.acquire().await;
        match self.attempt(backend, operation).await {
            Dispatch::Conflict(reason) => {
                tracing::debug!(kind = %operation.kind(), %reason, "conflict, retrying once");
                match self.attempt(backend, operation).await {
                    Dispatch::Conflict(reason) => Dispatch::Transient(reason),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn attempt(&self, backend: &dyn LedgerBackend, operation: &Operation) -> Dispatch {
        match tokio::time::timeout(self.config.request_timeout(), dispatch(backend, operation))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Dispatch::Transient("request timed out".to_string()),
        }
    }

    /// Drains every ready group once and records the outcome in `queue`.
    pub async fn drain(
        &self,
        queue: &mut OfflineQueue,
        backend: &dyn LedgerBackend,
    ) -> Result<DrainReport> {
        let groups = queue.ready_groups(Utc::now());
        if groups.is_empty() {
            return Ok(DrainReport::default());
        }
        tracing::debug!(groups = groups.len(), "draining offline queue");

        let mut results: Vec<OperationReport> = stream::iter(groups)
            .map(|group| self.run_group(group, backend))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();
        results.sort_by_key(|report| report.seq);

        for report in &results {
            match &report.result {
                OperationResult::Confirmed(confirmation) => {
                    queue.confirm(report.op_id, &confirmation.ids)?;
                }
                OperationResult::Rejected { code, message } => {
                    queue.mark_failed(report.op_id, *code, message.as_str(), true)?;
                }
                OperationResult::Retrying {
                    next_attempt_at,
                    error,
                    ..
                } => {
                    queue.schedule_retry(report.op_id, error.as_str(), *next_attempt_at)?;
                }
                OperationResult::Exhausted { message } => {
                    queue.mark_failed(
                        report.op_id,
                        ResultCode::InternalError,
                        message.as_str(),
                        false,
                    )?;
                }
            }
        }

        let report = DrainReport { results };
        tracing::info!(
            confirmed = report.confirmed(),
            rejected = report.rejected(),
            retrying = report.retrying(),
            exhausted = report.exhausted(),
            "drain finished"
        );
        Ok(report)
    }

    /// Runs one resource's operations in order, stopping at the first that
    /// does not apply.
    async fn run_group(
        &self,
        group: Vec<QueuedOperation>,
        backend: &dyn LedgerBackend,
    ) -> Vec<OperationReport> {
        let mut ids = IdMap::new();
        let mut reports = Vec::with_capacity(group.len());
        let mut ops = group.into_iter();

        while let Some(mut op) = ops.next() {
            op.operation.resolve(&ids);
            let kind = op.operation.kind();
            let result = match self.send(backend, &op.operation).await {
                Dispatch::Applied(confirmation) => {
                    ids.extend(confirmation.ids.clone());
                    OperationResult::Confirmed(confirmation)
                }
                Dispatch::Rejected { code, message } => {
                    tracing::warn!(op_id = %op.id, %kind, %code, %message, "operation rejected");
                    let cascade = format!("depends on rejected operation {}: {message}", op.id);
                    reports.push(report(&op, OperationResult::Rejected { code, message }));
                    reports.extend(ops.by_ref().map(|later| {
                        report(
                            &later,
                            OperationResult::Rejected {
                                code,
                                message: cascade.clone(),
                            },
                        )
                    }));
                    break;
                }
                Dispatch::Transient(error) | Dispatch::Conflict(error) => {
                    let result = self.transient(&op, error);
                    reports.push(report(&op, result));
                    break;
                }
            };
            reports.push(report(&op, result));
        }
        reports
    }

    fn transient(&self, op: &QueuedOperation, error: String) -> OperationResult {
        if op.retry_count >= self.config.max_retries {
            tracing::warn!(op_id = %op.id, retries = op.retry_count, %error, "giving up on operation");
            return OperationResult::Exhausted { message: error };
        }
        let retry_count = op.retry_count + 1;
        let delay = TimeDelta::from_std(self.backoff.delay_for(retry_count))
            .unwrap_or(TimeDelta::MAX);
        let next_attempt_at = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        tracing::debug!(op_id = %op.id, retry_count, %next_attempt_at, %error, "operation will be retried");
        OperationResult::Retrying {
            retry_count,
            next_attempt_at,
            error,
        }
    }
}

fn report(op: &QueuedOperation, result: OperationResult) -> OperationReport {
    OperationReport {
        op_id: op.id,
        seq: op.seq,
        kind: op.operation.kind(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use api_types::{
        account::{AccountGet, AccountView},
        recurring::{RecurringSeriesCreated, RecurringSeriesNew},
        transaction::{
            Deleted, TransactionCreated, TransactionNew, TransactionUpdate, TransactionUpdated,
        },
        transfer::{TransferCreated, TransferNew, TransferUpdate, TransferUpdated},
    };
    use async_trait::async_trait;

    use super::*;
    use crate::backend::BackendResult;

    enum Step {
        Conflict,
        Stall(Duration),
        Deleted,
    }

    /// Answers deletes from a script, one step per call.
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LedgerBackend for Scripted {
        async fn create_transaction(&self, _: TransactionNew) -> BackendResult<TransactionCreated> {
            unreachable!("only deletes are scripted")
        }
        async fn update_transaction(
            &self,
            _: TransactionUpdate,
        ) -> BackendResult<TransactionUpdated> {
            unreachable!("only deletes are scripted")
        }
        async fn delete_transaction(&self, _: TransactionDelete) -> BackendResult<Deleted> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Conflict) => Err(BackendError::Conflict("row locked".to_string())),
                Some(Step::Stall(delay)) => {
                    tokio::time::sleep(delay).await;
                    Err(BackendError::Server("too late".to_string()))
                }
                Some(Step::Deleted) | None => Ok(Reply::applied(Deleted {
                    deleted_count: 2,
                    message: "deleted 2 transaction(s)".to_string(),
                })),
            }
        }
        async fn create_transfer(&self, _: TransferNew) -> BackendResult<TransferCreated> {
            unreachable!("only deletes are scripted")
        }
        async fn update_transfer(&self, _: TransferUpdate) -> BackendResult<TransferUpdated> {
            unreachable!("only deletes are scripted")
        }
        async fn create_recurring_series(
            &self,
            _: RecurringSeriesNew,
        ) -> BackendResult<RecurringSeriesCreated> {
            unreachable!("only deletes are scripted")
        }
        async fn get_account(&self, _: AccountGet) -> BackendResult<AccountView> {
            unreachable!("only deletes are scripted")
        }
    }

    fn unthrottled() -> SyncEngine {
        SyncEngine::new(SyncConfig {
            refill_per_sec: 0,
            min_dispatch_interval_ms: 0,
            request_timeout_ms: 50,
            ..SyncConfig::default()
        })
    }

    fn delete_transfer() -> Operation {
        Operation::DeleteTransfer {
            target: LocalId::Real(Uuid::from_u128(9)),
        }
    }

    #[tokio::test]
    async fn conflict_is_retried_once() {
        let backend = Scripted::new([Step::Conflict, Step::Deleted]);
        let outcome = unthrottled().send(&backend, &delete_transfer()).await;
        assert!(matches!(outcome, Dispatch::Applied(_)));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn second_conflict_is_left_for_a_later_pass() {
        let backend = Scripted::new([Step::Conflict, Step::Conflict, Step::Deleted]);
        let outcome = unthrottled().send(&backend, &delete_transfer()).await;
        assert_eq!(outcome, Dispatch::Transient("row locked".to_string()));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn slow_reply_times_out_as_transient() {
        let backend = Scripted::new([Step::Stall(Duration::from_secs(5))]);
        let outcome = unthrottled().send(&backend, &delete_transfer()).await;
        assert_eq!(outcome, Dispatch::Transient("request timed out".to_string()));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn internal_error_reply_is_transient() {
        let reply: Reply<()> = Reply::rejected(ResultCode::InternalError, "db restarting");
        assert_eq!(
            settle(Ok(reply), |_| Confirmation::default()),
            Dispatch::Transient("db restarting".to_string())
        );
    }

    #[test]
    fn business_rejection_is_permanent() {
        let reply: Reply<()> = Reply::rejected(ResultCode::NotOwned, "account not owned");
        assert_eq!(
            settle(Ok(reply), |_| Confirmation::default()),
            Dispatch::Rejected {
                code: ResultCode::NotOwned,
                message: "account not owned".to_string()
            }
        );
    }

    #[test]
    fn transport_classification() {
        let conflict = settle::<()>(
            Err(BackendError::Conflict("pair missing".to_string())),
            |_| Confirmation::default(),
        );
        assert_eq!(conflict, Dispatch::Conflict("pair missing".to_string()));

        let refused = settle::<()>(
            Err(BackendError::Refused("unknown variant".to_string())),
            |_| Confirmation::default(),
        );
        assert!(matches!(
            refused,
            Dispatch::Rejected {
                code: ResultCode::InvalidInput,
                ..
            }
        ));

        let down = settle::<()>(Err(BackendError::Server("502".to_string())), |_| {
            Confirmation::default()
        });
        assert!(matches!(down, Dispatch::Transient(_)));
    }

    #[test]
    fn retry_budget_is_bounded() {
        let engine = SyncEngine::new(SyncConfig {
            max_retries: 2,
            ..SyncConfig::default()
        });
        let mut op = QueuedOperation {
            id: Uuid::nil(),
            seq: 0,
            resource: "r".to_string(),
            operation: Operation::DeleteTransfer {
                target: LocalId::Real(Uuid::nil()),
            },
            created_at: Utc::now(),
            retry_count: 1,
            last_error: None,
            next_attempt_at: None,
            state: crate::queue::OperationState::Pending,
        };
        assert!(matches!(
            engine.transient(&op, "timeout".to_string()),
            OperationResult::Retrying { retry_count: 2, .. }
        ));
        op.retry_count = 2;
        assert!(matches!(
            engine.transient(&op, "timeout".to_string()),
            OperationResult::Exhausted { .. }
        ));
    }
}
