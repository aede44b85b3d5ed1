//! Single entry point for user intents.
//!
//! Each intent is projected onto the [`OptimisticCache`] first, then either
//! sent straight to the store or persisted in the [`OfflineQueue`]. A
//! rejection puts the projected rows back the way they were.

use std::{collections::BTreeSet, sync::Arc};

use api_types::{
    account::{AccountGet, AccountView},
    ledger::{DeleteScope, TransactionKind, TransactionStatus},
    recurring::RecurringSeriesNew,
    reply::ResultCode,
    transaction::TransactionNew,
    transfer::TransferNew,
};
use engine::schedule::series_dates;
use uuid::Uuid;

use crate::{
    backend::LedgerBackend,
    cache::{CachedTransaction, OptimisticCache, Snapshot},
    config::SyncConfig,
    error::{ClientError, Result},
    ids::{LocalId, TempId},
    operation::{Operation, TransactionEdit, TransferEdit},
    queue::{OfflineQueue, QueuedOperation},
    store::StateStore,
    sync::{Confirmation, Dispatch, DrainReport, OperationResult, SyncEngine},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationStatus {
    /// Applied by the store.
    Confirmed,
    /// Saved locally; the store has not seen it yet.
    PendingSync,
    Rejected { code: ResultCode, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationReceipt {
    /// The row the intent created or touched, authoritative once confirmed.
    pub id: LocalId,
    /// Set when the intent went through the queue.
    pub op_id: Option<Uuid>,
    pub status: MutationStatus,
}

impl MutationReceipt {
    pub fn is_rejected(&self) -> bool {
        matches!(self.status, MutationStatus::Rejected { .. })
    }
}

pub struct MutationGateway {
    store: Arc<dyn StateStore>,
    backend: Arc<dyn LedgerBackend>,
    cache: OptimisticCache,
    queue: OfflineQueue,
    sync: SyncEngine,
    online: bool,
}

impl MutationGateway {
    /// Loads the cache and queue persisted in `store`. Starts offline.
    pub fn open(
        store: Arc<dyn StateStore>,
        backend: Arc<dyn LedgerBackend>,
        config: SyncConfig,
    ) -> Result<Self> {
        let cache = OptimisticCache::load(store.as_ref())?;
        let queue = OfflineQueue::load(store.clone())?;
        Ok(Self {
            store,
            backend,
            cache,
            queue,
            sync: SyncEngine::new(config),
            online: false,
        })
    }

    pub fn cache(&self) -> &OptimisticCache {
        &self.cache
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_online(&mut self, online: bool) {
        if self.online != online {
            tracing::info!(online, "connectivity changed");
        }
        self.online = online;
    }

    /// Replaces the cached account with the store's view.
    pub async fn refresh_account(&mut self, account_id: Uuid) -> Result<AccountView> {
        let account = self.fetch_account(account_id).await?;
        self.cache.upsert_account(account.clone());
        self.cache.save(self.store.as_ref())?;
        Ok(account)
    }

    async fn fetch_account(&self, account_id: Uuid) -> Result<AccountView> {
        self.backend
            .get_account(AccountGet { account_id })
            .await?
            .into_result()
            .map_err(|rejection| ClientError::Rejected {
                code: rejection.code,
                message: rejection.reason,
            })
    }

    pub async fn create_transaction(
        &mut self,
        mut request: TransactionNew,
    ) -> Result<MutationReceipt> {
        let temp_id = TempId::new();
        request.idempotency_key = Some(temp_id.to_string());
        let id = LocalId::Temp(temp_id.clone());
        let snapshot = self
            .cache
            .snapshot(&[request.account_id], std::slice::from_ref(&id));

        self.put(CachedTransaction {
            id: id.clone(),
            account_id: request.account_id,
            category_id: request.category_id,
            description: request.description.clone(),
            amount_minor: request.amount_minor,
            date: request.date,
            kind: request.kind,
            status: request.status,
            linked_id: None,
            parent_id: None,
            is_template: false,
        });

        let resource = temp_id.to_string();
        self.submit(
            resource,
            Operation::CreateTransaction { temp_id, request },
            snapshot,
            id,
        )
        .await
    }

    /// Rows missing from the cache are edited blind; the store decides.
    pub async fn edit_transaction(
        &mut self,
        target: LocalId,
        edit: TransactionEdit,
    ) -> Result<MutationReceipt> {
        let snapshot = match self.cache.transaction(&target).cloned() {
            Some(mut row) => {
                let snapshot = self
                    .cache
                    .snapshot(&[row.account_id], std::slice::from_ref(&target));
                if let Some(description) = &edit.description {
                    row.description = description.clone();
                }
                if let Some(amount_minor) = edit.amount_minor {
                    row.amount_minor = amount_minor;
                }
                if let Some(date) = edit.date {
                    row.date = date;
                }
                if let Some(category_id) = edit.category_id {
                    row.category_id = category_id;
                }
                if let Some(status) = edit.status {
                    row.status = status;
                }
                self.put(row);
                snapshot
            }
            None => Snapshot::default(),
        };

        let resource = self.resource_for(&target);
        self.submit(
            resource,
            Operation::EditTransaction {
                target: target.clone(),
                edit,
            },
            snapshot,
            target,
        )
        .await
    }

    pub async fn delete_transaction(
        &mut self,
        target: LocalId,
        scope: DeleteScope,
    ) -> Result<MutationReceipt> {
        let resource = self.resource_for(&target);
        let removed = self.removal_projection(&target, scope);
        let snapshot = self.drop_rows(&removed);
        self.submit(
            resource,
            Operation::DeleteTransaction {
                target: target.clone(),
                scope,
            },
            snapshot,
            target,
        )
        .await
    }

    pub async fn create_transfer(&mut self, mut request: TransferNew) -> Result<MutationReceipt> {
        let temp_id = TempId::new();
        request.idempotency_key = Some(temp_id.to_string());
        let outgoing = LocalId::Temp(temp_id.clone());
        let incoming = LocalId::Temp(temp_id.incoming_leg());
        let snapshot = self.cache.snapshot(
            &[request.from_account_id, request.to_account_id],
            &[outgoing.clone(), incoming.clone()],
        );

        let leg = |id: &LocalId,
                   pair: &LocalId,
                   account_id: Uuid,
                   amount_minor: i64,
                   text: &str,
                   fallback: &str| {
            CachedTransaction {
                id: id.clone(),
                account_id,
                category_id: None,
                description: if text.trim().is_empty() {
                    fallback.to_string()
                } else {
                    text.trim().to_string()
                },
                amount_minor,
                date: request.date,
                kind: TransactionKind::Transfer,
                status: request.status,
                linked_id: Some(pair.clone()),
                parent_id: None,
                is_template: false,
            }
        };
        let out_row = leg(
            &outgoing,
            &incoming,
            request.from_account_id,
            -request.amount_minor,
            &request.outgoing_description,
            "Transfer out",
        );
        let in_row = leg(
            &incoming,
            &outgoing,
            request.to_account_id,
            request.amount_minor,
            &request.incoming_description,
            "Transfer in",
        );
        self.put(out_row);
        self.put(in_row);

        let resource = temp_id.to_string();
        self.submit(
            resource,
            Operation::CreateTransfer { temp_id, request },
            snapshot,
            outgoing,
        )
        .await
    }

    /// `target` may be either leg.
    pub async fn edit_transfer(
        &mut self,
        target: LocalId,
        edit: TransferEdit,
    ) -> Result<MutationReceipt> {
        let legs: Vec<CachedTransaction> = self.transfer_legs(&target);
        let accounts: Vec<Uuid> = legs.iter().map(|leg| leg.account_id).collect();
        let ids: Vec<LocalId> = legs.iter().map(|leg| leg.id.clone()).collect();
        let snapshot = self.cache.snapshot(&accounts, &ids);

        for mut leg in legs {
            if let Some(magnitude) = edit.amount_minor {
                leg.amount_minor = if leg.amount_minor < 0 {
                    -magnitude
                } else {
                    magnitude
                };
            }
            if let Some(date) = edit.date {
                leg.date = date;
            }
            if leg.id == target
                && let Some(description) = &edit.description
            {
                leg.description = description.clone();
            }
            self.put(leg);
        }

        let resource = self.resource_for(&target);
        self.submit(
            resource,
            Operation::EditTransfer {
                target: target.clone(),
                edit,
            },
            snapshot,
            target,
        )
        .await
    }

    pub async fn delete_transfer(&mut self, target: LocalId) -> Result<MutationReceipt> {
        let resource = self.resource_for(&target);
        let ids: Vec<LocalId> = self
            .transfer_legs(&target)
            .into_iter()
            .map(|leg| leg.id)
            .collect();
        let snapshot = self.drop_rows(&ids);
        self.submit(
            resource,
            Operation::DeleteTransfer {
                target: target.clone(),
            },
            snapshot,
            target,
        )
        .await
    }

    /// Projects the template and one instance per month of the horizon.
    pub async fn create_recurring_series(
        &mut self,
        mut request: RecurringSeriesNew,
    ) -> Result<MutationReceipt> {
        let temp_id = TempId::new();
        request.idempotency_key = Some(temp_id.to_string());
        let template = LocalId::Temp(temp_id.clone());

        let dates = series_dates(request.start_date);
        let mut ids = vec![template.clone()];
        ids.extend((0..dates.len()).map(|index| LocalId::Temp(temp_id.instance(index))));
        let snapshot = self.cache.snapshot(&[request.account_id], &ids);

        let row = |id: LocalId, date, status, parent: Option<&LocalId>| CachedTransaction {
            id,
            account_id: request.account_id,
            category_id: request.category_id,
            description: request.description.clone(),
            amount_minor: request.amount_minor,
            date,
            kind: request.kind,
            status,
            linked_id: None,
            parent_id: parent.cloned(),
            is_template: parent.is_none(),
        };
        let mut rows = vec![row(
            template.clone(),
            request.start_date,
            TransactionStatus::Pending,
            None,
        )];
        for (index, (id, date)) in ids.iter().skip(1).zip(dates).enumerate() {
            let status = if index == 0 {
                request.first_instance_status
            } else {
                TransactionStatus::Pending
            };
            rows.push(row(id.clone(), date, status, Some(&template)));
        }
        for row in rows {
            self.put(row);
        }

        let resource = temp_id.to_string();
        self.submit(
            resource,
            Operation::CreateRecurringSeries { temp_id, request },
            snapshot,
            template,
        )
        .await
    }

    /// Replays the queue. Offline this does nothing.
    pub async fn sync(&mut self) -> Result<DrainReport> {
        if !self.online {
            return Ok(DrainReport::default());
        }
        let report = self
            .sync
            .drain(&mut self.queue, self.backend.as_ref())
            .await?;

        // Undo rejections before applying authoritative balances so their
        // deltas come off the optimistic figures, newest first.
        for entry in report.results.iter().rev() {
            if let OperationResult::Rejected { message, .. } = &entry.result
                && let Some(snapshot) = self.cache.take_rollback(entry.op_id)
            {
                tracing::info!(op_id = %entry.op_id, kind = %entry.kind, %message, "rolling back rejected intent");
                self.cache.rollback(snapshot);
            }
        }

        let confirmed: Vec<(Snapshot, &Confirmation)> = report
            .results
            .iter()
            .filter_map(|entry| match &entry.result {
                OperationResult::Confirmed(confirmation) => Some((
                    self.cache.take_rollback(entry.op_id).unwrap_or_default(),
                    confirmation,
                )),
                _ => None,
            })
            .collect();
        // Groups run concurrently, so a reported balance may predate a write
        // from another group. With more than one confirmation every touched
        // account is read back once at the end.
        let concurrent = confirmed.len() > 1;
        let mut refresh = BTreeSet::new();
        for (snapshot, confirmation) in confirmed {
            refresh.extend(self.settle(&snapshot, confirmation));
            if concurrent {
                refresh.extend(snapshot.account_ids());
                refresh.extend(confirmation.balances.iter().map(|(id, _)| *id));
            }
        }
        let in_flight = self.cache.accounts_in_flight();
        refresh.retain(|id| !in_flight.contains(id));
        self.refresh_settled(refresh).await;

        self.cache.save(self.store.as_ref())?;
        Ok(report)
    }

    pub fn failed_operations(&self) -> Vec<&QueuedOperation> {
        self.queue.failed()
    }

    /// Drops a queued operation and undoes its projection.
    pub fn discard(&mut self, op_id: Uuid) -> Result<QueuedOperation> {
        let discarded = self.queue.discard(op_id)?;
        if let Some(snapshot) = self.cache.take_rollback(op_id) {
            self.cache.rollback(snapshot);
        }
        self.cache.save(self.store.as_ref())?;
        tracing::info!(%op_id, kind = %discarded.operation.kind(), "operation discarded");
        Ok(discarded)
    }

    pub fn retry_failed(&mut self, op_id: Uuid) -> Result<()> {
        self.queue.retry_failed(op_id)
    }

    /// Flushes cache and queue. Nothing queued is lost: the next
    /// [`open`](Self::open) picks it up.
    pub fn shutdown(self) -> Result<()> {
        self.queue.persist()?;
        self.cache.save(self.store.as_ref())?;
        tracing::info!(queued = self.queue.len(), "gateway shut down");
        Ok(())
    }

    async fn submit(
        &mut self,
        resource: String,
        operation: Operation,
        snapshot: Snapshot,
        id: LocalId,
    ) -> Result<MutationReceipt> {
        if self.online && !self.queue.has_queued(&resource) {
            match self.sync.send(self.backend.as_ref(), &operation).await {
                Dispatch::Applied(confirmation) => {
                    let stale = self.settle(&snapshot, &confirmation);
                    self.refresh_settled(stale).await;
                    self.cache.save(self.store.as_ref())?;
                    return Ok(MutationReceipt {
                        id: id.resolve(&confirmation.ids),
                        op_id: None,
                        status: MutationStatus::Confirmed,
                    });
                }
                Dispatch::Rejected { code, message } => {
                    tracing::info!(kind = %operation.kind(), %code, %message, "intent rejected");
                    self.cache.rollback(snapshot);
                    self.cache.save(self.store.as_ref())?;
                    return Ok(MutationReceipt {
                        id,
                        op_id: None,
                        status: MutationStatus::Rejected { code, message },
                    });
                }
                Dispatch::Transient(error) | Dispatch::Conflict(error) => {
                    tracing::warn!(kind = %operation.kind(), %error, "store unreachable, queueing intent");
                }
            }
        }

        let queued = match self.queue.enqueue(resource, operation) {
            Ok(queued) => queued,
            Err(err) => {
                self.cache.restore(snapshot);
                return Err(err);
            }
        };
        self.cache.remember_rollback(queued.id, snapshot);
        self.cache.save(self.store.as_ref())?;
        Ok(MutationReceipt {
            id,
            op_id: Some(queued.id),
            status: MutationStatus::PendingSync,
        })
    }

    /// Swaps temp ids for authoritative ones and takes the store's balances,
    /// except on accounts other queued intents still project onto.
    ///
    /// Returns the accounts the intent touched that still need the store's
    /// view.
    fn settle(&mut self, snapshot: &Snapshot, confirmation: &Confirmation) -> Vec<Uuid> {
        for (temp, real) in &confirmation.ids {
            self.cache.reconcile_id(temp, *real);
        }

        let in_flight = self.cache.accounts_in_flight();
        let mut settled = BTreeSet::new();
        for (account_id, balance_minor) in &confirmation.balances {
            settled.insert(*account_id);
            if !in_flight.contains(account_id) {
                self.cache.set_balance(*account_id, *balance_minor);
            }
        }

        snapshot
            .account_ids()
            .filter(|id| !settled.contains(id) && !in_flight.contains(id))
            .collect()
    }

    async fn refresh_settled(&mut self, accounts: impl IntoIterator<Item = Uuid>) {
        for account_id in accounts {
            match self.fetch_account(account_id).await {
                Ok(account) => self.cache.upsert_account(account),
                Err(err) => {
                    tracing::warn!(%account_id, %err, "could not refresh account after sync");
                }
            }
        }
    }

    fn put(&mut self, row: CachedTransaction) {
        if let Some(previous) = self.cache.remove(&row.id) {
            self.cache
                .adjust_balance(previous.account_id, -previous.balance_effect());
        }
        self.cache.adjust_balance(row.account_id, row.balance_effect());
        self.cache.upsert(row);
    }

    /// Removes `ids` from the cache and returns what they looked like.
    fn drop_rows(&mut self, ids: &[LocalId]) -> Snapshot {
        let accounts: Vec<Uuid> = ids
            .iter()
            .filter_map(|id| self.cache.transaction(id))
            .map(|row| row.account_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let snapshot = self.cache.snapshot(&accounts, ids);
        for id in ids {
            if let Some(row) = self.cache.remove(id) {
                self.cache.adjust_balance(row.account_id, -row.balance_effect());
            }
        }
        snapshot
    }

    fn transfer_legs(&self, target: &LocalId) -> Vec<CachedTransaction> {
        let Some(row) = self.cache.transaction(target) else {
            return Vec::new();
        };
        let mut legs = vec![row.clone()];
        if let Some(pair) = row.linked_id.as_ref().and_then(|id| self.cache.transaction(id)) {
            legs.push(pair.clone());
        }
        legs
    }

    /// Rows the store is expected to remove for a delete of `target`.
    fn removal_projection(&self, target: &LocalId, scope: DeleteScope) -> Vec<LocalId> {
        let Some(row) = self.cache.transaction(target) else {
            return vec![target.clone()];
        };
        if let Some(pair) = &row.linked_id {
            return vec![target.clone(), pair.clone()];
        }

        let (template, scope) = match (&row.parent_id, row.is_template) {
            (Some(parent), _) => (parent.clone(), scope),
            (None, true) => (target.clone(), DeleteScope::All),
            (None, false) => return vec![target.clone()],
        };
        let children = self.cache.children_of(&template);
        let completed = |child: &CachedTransaction| child.status == TransactionStatus::Completed;

        let mut removed: Vec<LocalId> = match scope {
            DeleteScope::Current => vec![target.clone()],
            DeleteScope::CurrentAndRemaining => children
                .iter()
                .filter(|child| child.date >= row.date && !completed(child))
                .map(|child| child.id.clone())
                .collect(),
            DeleteScope::All => children
                .iter()
                .filter(|child| !completed(child))
                .map(|child| child.id.clone())
                .collect(),
        };
        // a template without children left goes with them
        if children.iter().all(|child| removed.contains(&child.id)) {
            removed.push(template);
        }
        removed
    }

    /// Ordering key: the create a row descends from, so intents on rows
    /// created offline wait for that create.
    fn resource_for(&self, id: &LocalId) -> String {
        match id {
            LocalId::Temp(temp) => temp.root().to_string(),
            LocalId::Real(real) => match self.cache.transaction(id) {
                Some(CachedTransaction {
                    parent_id: Some(parent),
                    ..
                }) => self.resource_for(parent),
                Some(CachedTransaction {
                    linked_id: Some(pair),
                    amount_minor,
                    ..
                }) if *amount_minor > 0 => self.resource_for(pair),
                _ => real.to_string(),
            },
        }
    }
}
