//! Command structs for engine operations.
//!
//! These types group parameters for write operations, keeping call sites
//! readable and avoiding long argument lists.

use api_types::ledger::DeleteScope;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{Period, TransactionKind, TransactionStatus};

/// Create an income or expense transaction.
#[derive(Clone, Debug)]
pub struct NewTransactionCmd {
    pub owner: String,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    /// Signed: positive for income, negative for expense.
    pub amount_minor: i64,
    pub date: NaiveDate,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub invoice_period: Option<Period>,
    pub idempotency_key: Option<String>,
}

impl NewTransactionCmd {
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        account_id: Uuid,
        kind: TransactionKind,
        amount_minor: i64,
        date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            account_id,
            kind,
            amount_minor,
            date,
            description: description.into(),
            category_id: None,
            status: TransactionStatus::Completed,
            invoice_period: None,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn invoice_period(mut self, period: Period) -> Self {
        self.invoice_period = Some(period);
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Patch an ordinary, provision or instance row. `None` keeps the field.
#[derive(Clone, Debug, Default)]
pub struct UpdateTransactionCmd {
    pub owner: String,
    pub transaction_id: Uuid,
    pub description: Option<String>,
    pub amount_minor: Option<i64>,
    pub date: Option<NaiveDate>,
    /// `Some(None)` clears the category.
    pub category_id: Option<Option<Uuid>>,
    pub status: Option<TransactionStatus>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new(owner: impl Into<String>, transaction_id: Uuid) -> Self {
        Self {
            owner: owner.into(),
            transaction_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Option<Uuid>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Move money between two accounts of the same owner.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub owner: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    /// Magnitude, must be > 0.
    pub amount_minor: i64,
    pub date: NaiveDate,
    pub outgoing_description: String,
    pub incoming_description: String,
    pub status: TransactionStatus,
    pub idempotency_key: Option<String>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        date: NaiveDate,
    ) -> Self {
        Self {
            owner: owner.into(),
            from_account_id,
            to_account_id,
            amount_minor,
            date,
            outgoing_description: String::new(),
            incoming_description: String::new(),
            status: TransactionStatus::Completed,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn descriptions(mut self, outgoing: impl Into<String>, incoming: impl Into<String>) -> Self {
        self.outgoing_description = outgoing.into();
        self.incoming_description = incoming.into();
        self
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Edit a transfer through either of its legs.
#[derive(Clone, Debug, Default)]
pub struct UpdateTransferCmd {
    pub owner: String,
    pub transaction_id: Uuid,
    pub amount_minor: Option<i64>,
    pub date: Option<NaiveDate>,
    /// Applies to the targeted leg only.
    pub description: Option<String>,
}

impl UpdateTransferCmd {
    #[must_use]
    pub fn new(owner: impl Into<String>, transaction_id: Uuid) -> Self {
        Self {
            owner: owner.into(),
            transaction_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct DeleteTransactionCmd {
    pub owner: String,
    pub transaction_id: Uuid,
    pub scope: DeleteScope,
}

impl DeleteTransactionCmd {
    #[must_use]
    pub fn new(owner: impl Into<String>, transaction_id: Uuid) -> Self {
        Self {
            owner: owner.into(),
            transaction_id,
            scope: DeleteScope::Current,
        }
    }

    #[must_use]
    pub fn scope(mut self, scope: DeleteScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Create a monthly series (or envelope series) from a template.
#[derive(Clone, Debug)]
pub struct RecurringSeriesCmd {
    pub owner: String,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount_minor: i64,
    pub start_date: NaiveDate,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub first_instance_status: TransactionStatus,
    pub is_envelope: bool,
    pub idempotency_key: Option<String>,
}

impl RecurringSeriesCmd {
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        account_id: Uuid,
        kind: TransactionKind,
        amount_minor: i64,
        start_date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            account_id,
            kind,
            amount_minor,
            start_date,
            description: description.into(),
            category_id: None,
            first_instance_status: TransactionStatus::Pending,
            is_envelope: false,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn first_instance_status(mut self, status: TransactionStatus) -> Self {
        self.first_instance_status = status;
        self
    }

    #[must_use]
    pub fn envelope(mut self) -> Self {
        self.is_envelope = true;
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
