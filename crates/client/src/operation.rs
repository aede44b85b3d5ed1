//! User intents as they are queued and replayed.

use std::fmt;

use api_types::{
    deserialize_some,
    ledger::{DeleteScope, TransactionStatus},
    recurring::RecurringSeriesNew,
    transaction::{TransactionNew, TransactionUpdate},
    transfer::{TransferNew, TransferUpdate},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{IdMap, LocalId, TempId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CreateTransaction,
    EditTransaction,
    DeleteTransaction,
    CreateTransfer,
    EditTransfer,
    DeleteTransfer,
    CreateRecurringSeries,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateTransaction => "create-transaction",
            Self::EditTransaction => "edit-transaction",
            Self::DeleteTransaction => "delete-transaction",
            Self::CreateTransfer => "create-transfer",
            Self::EditTransfer => "edit-transfer",
            Self::DeleteTransfer => "delete-transfer",
            Self::CreateRecurringSeries => "create-recurring-series",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field changes of a plain transaction; absent fields are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// `Some(None)` clears the category.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_some"
    )]
    pub category_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
}

impl TransactionEdit {
    pub fn into_request(self, transaction_id: Uuid) -> TransactionUpdate {
        TransactionUpdate {
            transaction_id,
            description: self.description,
            amount_minor: self.amount_minor,
            date: self.date,
            category_id: self.category_id,
            status: self.status,
        }
    }
}

/// Changes to a transfer. The amount is the positive transferred amount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransferEdit {
    pub fn into_request(self, transaction_id: Uuid) -> TransferUpdate {
        TransferUpdate {
            transaction_id,
            amount_minor: self.amount_minor,
            date: self.date,
            description: self.description,
        }
    }
}

/// One queued intent. Creates carry the temp id they minted; the request's
/// idempotency key is that same id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Operation {
    CreateTransaction {
        temp_id: TempId,
        request: TransactionNew,
    },
    EditTransaction {
        target: LocalId,
        edit: TransactionEdit,
    },
    DeleteTransaction {
        target: LocalId,
        scope: DeleteScope,
    },
    CreateTransfer {
        temp_id: TempId,
        request: TransferNew,
    },
    EditTransfer {
        target: LocalId,
        edit: TransferEdit,
    },
    DeleteTransfer {
        target: LocalId,
    },
    CreateRecurringSeries {
        temp_id: TempId,
        request: RecurringSeriesNew,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateTransaction { .. } => OperationKind::CreateTransaction,
            Self::EditTransaction { .. } => OperationKind::EditTransaction,
            Self::DeleteTransaction { .. } => OperationKind::DeleteTransaction,
            Self::CreateTransfer { .. } => OperationKind::CreateTransfer,
            Self::EditTransfer { .. } => OperationKind::EditTransfer,
            Self::DeleteTransfer { .. } => OperationKind::DeleteTransfer,
            Self::CreateRecurringSeries { .. } => OperationKind::CreateRecurringSeries,
        }
    }

    pub fn temp_id(&self) -> Option<&TempId> {
        match self {
            Self::CreateTransaction { temp_id, .. }
            | Self::CreateTransfer { temp_id, .. }
            | Self::CreateRecurringSeries { temp_id, .. } => Some(temp_id),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&LocalId> {
        match self {
            Self::EditTransaction { target, .. }
            | Self::DeleteTransaction { target, .. }
            | Self::EditTransfer { target, .. }
            | Self::DeleteTransfer { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteTransaction { .. } | Self::DeleteTransfer { .. }
        )
    }

    /// Rewrites temporary targets that have been confirmed.
    pub fn resolve(&mut self, ids: &IdMap) {
        match self {
            Self::EditTransaction { target, .. }
            | Self::DeleteTransaction { target, .. }
            | Self::EditTransfer { target, .. }
            | Self::DeleteTransfer { target } => *target = target.resolve(ids),
            Self::CreateTransaction { .. }
            | Self::CreateTransfer { .. }
            | Self::CreateRecurringSeries { .. } => {}
        }
    }
}
