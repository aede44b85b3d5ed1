//! Durable FIFO of user intents waiting for the authoritative store.
//!
//! Every mutation of the queue is written through the [`StateStore`] before
//! the call returns. Operations are ordered per resource (the root id of the
//! row they touch); different resources are independent.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use api_types::reply::ResultCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ClientError, Result},
    ids::IdMap,
    operation::Operation,
    store::{StateStore, load_versioned, save_versioned},
};

pub const QUEUE_SCHEMA_VERSION: u32 = 1;
const QUEUE_KEY: &str = "queue";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum OperationState {
    Pending,
    /// Surfaced to the user. Permanent failures were rejected by the store;
    /// the others ran out of retries and may be retried by hand.
    Failed { code: ResultCode, permanent: bool },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub seq: u64,
    /// Ordering key: operations sharing it run strictly in `seq` order.
    pub resource: String,
    pub operation: Operation,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub state: OperationState,
}

impl QueuedOperation {
    pub fn is_pending(&self) -> bool {
        self.state == OperationState::Pending
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    version: u32,
    operations: Vec<QueuedOperation>,
    next_seq: u64,
}

pub struct OfflineQueue {
    store: Arc<dyn StateStore>,
    operations: Vec<QueuedOperation>,
    next_seq: u64,
}

impl OfflineQueue {
    pub fn load(store: Arc<dyn StateStore>) -> Result<Self> {
        let document: Option<QueueDocument> =
            load_versioned(store.as_ref(), QUEUE_KEY, QUEUE_SCHEMA_VERSION)?;
        let (mut operations, next_seq) = match document {
            Some(doc) => (doc.operations, doc.next_seq),
            None => (Vec::new(), 0),
        };
        operations.sort_by_key(|op| op.seq);
        if !operations.is_empty() {
            tracing::info!(queued = operations.len(), "loaded offline queue");
        }
        Ok(Self {
            store,
            operations,
            next_seq,
        })
    }

    /// Appends an operation and persists it before returning.
    pub fn enqueue(
        &mut self,
        resource: impl Into<String>,
        operation: Operation,
    ) -> Result<QueuedOperation> {
        let queued = QueuedOperation {
            id: Uuid::new_v4(),
            seq: self.next_seq,
            resource: resource.into(),
            operation,
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
            next_attempt_at: None,
            state: OperationState::Pending,
        };
        self.operations.push(queued.clone());
        self.next_seq += 1;
        if let Err(err) = self.persist() {
            self.operations.pop();
            self.next_seq -= 1;
            return Err(err);
        }
        tracing::debug!(op_id = %queued.id, kind = %queued.operation.kind(), resource = %queued.resource, "operation queued");
        Ok(queued)
    }

    pub fn operations(&self) -> &[QueuedOperation] {
        &self.operations
    }

    pub fn get(&self, op_id: Uuid) -> Option<&QueuedOperation> {
        self.operations.iter().find(|op| op.id == op_id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_pending()).count()
    }

    /// Whether anything, pending or failed, is queued for `resource`.
    pub fn has_queued(&self, resource: &str) -> bool {
        self.operations.iter().any(|op| op.resource == resource)
    }

    pub fn failed(&self) -> Vec<&QueuedOperation> {
        self.operations
            .iter()
            .filter(|op| !op.is_pending())
            .collect()
    }

    /// Pending operations grouped by resource, each group in `seq` order.
    ///
    /// A group is left out while its head is backing off, and a resource
    /// with a failed operation stays blocked behind it.
    pub fn ready_groups(&self, now: DateTime<Utc>) -> Vec<Vec<QueuedOperation>> {
        let mut groups: Vec<Vec<QueuedOperation>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut blocked: HashSet<&str> = HashSet::new();

        for op in &self.operations {
            let resource = op.resource.as_str();
            if blocked.contains(resource) {
                continue;
            }
            if !op.is_pending() {
                blocked.insert(resource);
                continue;
            }
            match index.get(resource) {
                Some(&group) => groups[group].push(op.clone()),
                None if op.next_attempt_at.is_some_and(|at| at > now) => {
                    blocked.insert(resource);
                }
                None => {
                    index.insert(resource, groups.len());
                    groups.push(vec![op.clone()]);
                }
            }
        }
        groups
    }

    /// Removes a confirmed operation and points the remaining ones at the
    /// authoritative ids it produced.
    pub fn confirm(&mut self, op_id: Uuid, ids: &IdMap) -> Result<()> {
        self.take(op_id)?;
        for op in &mut self.operations {
            op.operation.resolve(ids);
            if let Some(real) = ids.get(op.resource.as_str()) {
                op.resource = real.to_string();
            }
        }
        self.persist()
    }

    /// Records a transient failure; returns the new retry count.
    pub fn schedule_retry(
        &mut self,
        op_id: Uuid,
        error: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<u32> {
        let op = self.get_mut(op_id)?;
        op.retry_count += 1;
        op.last_error = Some(error.into());
        op.next_attempt_at = Some(next_attempt_at);
        let retry_count = op.retry_count;
        self.persist()?;
        Ok(retry_count)
    }

    pub fn mark_failed(
        &mut self,
        op_id: Uuid,
        code: ResultCode,
        message: impl Into<String>,
        permanent: bool,
    ) -> Result<()> {
        let op = self.get_mut(op_id)?;
        op.state = OperationState::Failed { code, permanent };
        op.last_error = Some(message.into());
        self.persist()
    }

    pub fn discard(&mut self, op_id: Uuid) -> Result<QueuedOperation> {
        let op = self.take(op_id)?;
        self.persist()?;
        Ok(op)
    }

    /// Puts a failed operation back in line with fresh retry metadata.
    pub fn retry_failed(&mut self, op_id: Uuid) -> Result<()> {
        let op = self.get_mut(op_id)?;
        if op.is_pending() {
            return Err(ClientError::InvalidInput(format!(
                "operation {op_id} has not failed"
            )));
        }
        op.state = OperationState::Pending;
        op.retry_count = 0;
        op.last_error = None;
        op.next_attempt_at = None;
        self.persist()
    }

    pub fn persist(&self) -> Result<()> {
        save_versioned(
            self.store.as_ref(),
            QUEUE_KEY,
            &QueueDocument {
                version: QUEUE_SCHEMA_VERSION,
                operations: self.operations.clone(),
                next_seq: self.next_seq,
            },
        )
    }

    fn get_mut(&mut self, op_id: Uuid) -> Result<&mut QueuedOperation> {
        self.operations
            .iter_mut()
            .find(|op| op.id == op_id)
            .ok_or(ClientError::UnknownOperation(op_id))
    }

    fn take(&mut self, op_id: Uuid) -> Result<QueuedOperation> {
        let position = self
            .operations
            .iter()
            .position(|op| op.id == op_id)
            .ok_or(ClientError::UnknownOperation(op_id))?;
        Ok(self.operations.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use api_types::ledger::DeleteScope;
    use chrono::TimeDelta;

    use super::*;
    use crate::{
        ids::{LocalId, TempId},
        operation::TransactionEdit,
        store::MemoryStore,
    };

    fn queue() -> (OfflineQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (OfflineQueue::load(store.clone()).unwrap(), store)
    }

    fn delete(target: LocalId) -> Operation {
        Operation::DeleteTransaction {
            target,
            scope: DeleteScope::Current,
        }
    }

    #[test]
    fn enqueue_is_persisted_immediately() {
        let (mut queue, store) = queue();
        let op = queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();

        let reloaded = OfflineQueue::load(store).unwrap();
        assert_eq!(reloaded.operations(), &[op]);
    }

    #[test]
    fn groups_keep_fifo_per_resource() {
        let (mut queue, _) = queue();
        let first = queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();
        let other = queue.enqueue("b", delete(LocalId::Real(Uuid::nil()))).unwrap();
        let second = queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();

        let groups = queue.ready_groups(Utc::now());
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].iter().map(|op| op.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
        assert_eq!(groups[1][0].id, other.id);
    }

    #[test]
    fn backing_off_head_holds_its_group() {
        let (mut queue, _) = queue();
        let head = queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();
        queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();
        queue.enqueue("b", delete(LocalId::Real(Uuid::nil()))).unwrap();

        let now = Utc::now();
        let retries = queue
            .schedule_retry(head.id, "timeout", now + TimeDelta::seconds(30))
            .unwrap();
        assert_eq!(retries, 1);

        let groups = queue.ready_groups(now);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0].resource, "b");
        assert_eq!(queue.ready_groups(now + TimeDelta::seconds(31)).len(), 2);
    }

    #[test]
    fn failed_operation_blocks_its_resource() {
        let (mut queue, _) = queue();
        let head = queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();
        queue.enqueue("a", delete(LocalId::Real(Uuid::nil()))).unwrap();
        queue
            .mark_failed(head.id, ResultCode::InternalError, "gave up", false)
            .unwrap();

        assert!(queue.ready_groups(Utc::now()).is_empty());
        assert_eq!(queue.failed().len(), 1);

        queue.retry_failed(head.id).unwrap();
        let groups = queue.ready_groups(Utc::now());
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][0].retry_count, 0);
    }

    #[test]
    fn confirm_rewrites_temp_ids_in_later_operations() {
        let (mut queue, _) = queue();
        let temp = TempId::new();
        let create = queue
            .enqueue(temp.as_str(), delete(LocalId::Real(Uuid::nil())))
            .unwrap();
        let edit = queue
            .enqueue(
                temp.as_str(),
                Operation::EditTransaction {
                    target: LocalId::Temp(temp.clone()),
                    edit: TransactionEdit::default(),
                },
            )
            .unwrap();

        let real = Uuid::new_v4();
        queue
            .confirm(create.id, &IdMap::from([(temp.clone(), real)]))
            .unwrap();

        let remaining = queue.get(edit.id).unwrap();
        assert_eq!(remaining.operation.target(), Some(&LocalId::Real(real)));
        assert_eq!(remaining.resource, real.to_string());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unknown_operation_is_an_error() {
        let (mut queue, _) = queue();
        assert!(matches!(
            queue.discard(Uuid::nil()),
            Err(ClientError::UnknownOperation(_))
        ));
    }
}
