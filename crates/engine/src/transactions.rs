//! Ledger rows.
//!
//! Every row of the `transactions` table is a [`Transaction`]; its
//! [`TransactionRole`] decides how it participates in balances, envelopes and
//! recurring series.

use api_types::ledger;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, EngineError, Period, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    /// Checks the sign convention: income > 0, expense < 0, never zero.
    ///
    /// `i64::MIN` is refused too: its envelope contribution cannot be negated.
    pub fn check_sign(self, amount_minor: i64) -> ResultEngine<()> {
        if amount_minor == i64::MIN {
            return Err(EngineError::InvalidInput(
                "amount out of range".to_string(),
            ));
        }
        let ok = match self {
            Self::Income => amount_minor > 0,
            Self::Expense => amount_minor < 0,
            Self::Transfer => amount_minor != 0,
        };
        if ok {
            return Ok(());
        }
        Err(EngineError::InvalidInput(format!(
            "amount {} is inconsistent with kind {}",
            Amount::new(amount_minor),
            self.as_str()
        )))
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

impl From<ledger::TransactionKind> for TransactionKind {
    fn from(value: ledger::TransactionKind) -> Self {
        match value {
            ledger::TransactionKind::Income => Self::Income,
            ledger::TransactionKind::Expense => Self::Expense,
            ledger::TransactionKind::Transfer => Self::Transfer,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }
}

impl From<ledger::TransactionStatus> for TransactionStatus {
    fn from(value: ledger::TransactionStatus) -> Self {
        match value {
            ledger::TransactionStatus::Pending => Self::Pending,
            ledger::TransactionStatus::Completed => Self::Completed,
        }
    }
}

impl From<TransactionStatus> for ledger::TransactionStatus {
    fn from(value: TransactionStatus) -> Self {
        match value {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Completed => Self::Completed,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionRole {
    #[default]
    Ordinary,
    TransferLeg,
    /// Budget envelope for a category/month.
    Provision,
    /// Recurring generator. Never spendable.
    Template,
    /// Recurring child.
    Instance,
}

impl TransactionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::TransferLeg => "transfer_leg",
            Self::Provision => "provision",
            Self::Template => "template",
            Self::Instance => "instance",
        }
    }
}

impl TryFrom<&str> for TransactionRole {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ordinary" => Ok(Self::Ordinary),
            "transfer_leg" => Ok(Self::TransferLeg),
            "provision" => Ok(Self::Provision),
            "template" => Ok(Self::Template),
            "instance" => Ok(Self::Instance),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction role: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: String,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub description: String,
    pub amount_minor: i64,
    pub date: NaiveDate,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub role: TransactionRole,
    pub is_fixed: bool,
    /// Set on templates whose children are envelopes.
    pub series_envelope: bool,
    pub linked_transaction_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub invoice_period: Option<Period>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh ordinary row. Roles and links are set by the caller.
    pub fn new(
        owner_id: String,
        account_id: Uuid,
        kind: TransactionKind,
        amount_minor: i64,
        date: NaiveDate,
        description: String,
        status: TransactionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            account_id,
            category_id: None,
            description,
            amount_minor,
            date,
            status,
            kind,
            role: TransactionRole::Ordinary,
            is_fixed: false,
            series_envelope: false,
            linked_transaction_id: None,
            parent_id: None,
            invoice_period: None,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn is_template(&self) -> bool {
        self.role == TransactionRole::Template
    }

    pub fn period(&self) -> Period {
        Period::from_date(self.date)
    }

    /// Same ledger content, ignoring bookkeeping timestamps.
    pub fn same_content(&self, other: &Transaction) -> bool {
        Self {
            created_at: other.created_at,
            updated_at: other.updated_at,
            ..self.clone()
        } == *other
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub account_id: String,
    pub category_id: Option<String>,
    pub description: String,
    pub amount_minor: i64,
    pub date: Date,
    pub status: String,
    pub kind: String,
    pub role: String,
    pub is_fixed: bool,
    pub series_envelope: bool,
    pub linked_transaction_id: Option<String>,
    pub parent_id: Option<String>,
    pub invoice_period: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            owner_id: ActiveValue::Set(tx.owner_id.clone()),
            account_id: ActiveValue::Set(tx.account_id.to_string()),
            category_id: ActiveValue::Set(tx.category_id.map(|id| id.to_string())),
            description: ActiveValue::Set(tx.description.clone()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            date: ActiveValue::Set(tx.date),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            role: ActiveValue::Set(tx.role.as_str().to_string()),
            is_fixed: ActiveValue::Set(tx.is_fixed),
            series_envelope: ActiveValue::Set(tx.series_envelope),
            linked_transaction_id: ActiveValue::Set(
                tx.linked_transaction_id.map(|id| id.to_string()),
            ),
            parent_id: ActiveValue::Set(tx.parent_id.map(|id| id.to_string())),
            invoice_period: ActiveValue::Set(tx.invoice_period.map(|p| p.to_string())),
            idempotency_key: ActiveValue::Set(tx.idempotency_key.clone()),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

fn parse_id(value: &str, what: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::KeyNotFound(format!("{what} not exists")))
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&model.id, "transaction")?,
            owner_id: model.owner_id,
            account_id: parse_id(&model.account_id, "account")?,
            category_id: model
                .category_id
                .as_deref()
                .map(|id| parse_id(id, "category"))
                .transpose()?,
            description: model.description,
            amount_minor: model.amount_minor,
            date: model.date,
            status: TransactionStatus::try_from(model.status.as_str())?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            role: TransactionRole::try_from(model.role.as_str())?,
            is_fixed: model.is_fixed,
            series_envelope: model.series_envelope,
            linked_transaction_id: model
                .linked_transaction_id
                .as_deref()
                .map(|id| parse_id(id, "transaction"))
                .transpose()?,
            parent_id: model
                .parent_id
                .as_deref()
                .map(|id| parse_id(id, "transaction"))
                .transpose()?,
            invoice_period: model
                .invoice_period
                .as_deref()
                .map(str::parse::<Period>)
                .transpose()?,
            idempotency_key: model.idempotency_key,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
