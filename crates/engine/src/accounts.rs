//! Accounts: balance-bearing (`ordinary`) or `credit_line`.
//!
//! `balance_minor` is denormalized. It always equals the sum of the completed,
//! non-template transactions of the account and can be rebuilt with
//! [`Engine::recompute_account_balance`](crate::Engine::recompute_account_balance).

use api_types::{account::AccountView, ledger};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Ordinary,
    CreditLine,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::CreditLine => "credit_line",
        }
    }
}

impl TryFrom<&str> for AccountKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ordinary" => Ok(Self::Ordinary),
            "credit_line" => Ok(Self::CreditLine),
            other => Err(EngineError::InvalidInput(format!(
                "invalid account kind: {other}"
            ))),
        }
    }
}

impl From<AccountKind> for ledger::AccountKind {
    fn from(value: AccountKind) -> Self {
        match value {
            AccountKind::Ordinary => Self::Ordinary,
            AccountKind::CreditLine => Self::CreditLine,
        }
    }
}

impl From<ledger::AccountKind> for AccountKind {
    fn from(value: ledger::AccountKind) -> Self {
        match value {
            ledger::AccountKind::Ordinary => Self::Ordinary,
            ledger::AccountKind::CreditLine => Self::CreditLine,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub kind: AccountKind,
    pub balance_minor: i64,
    pub credit_limit_minor: Option<i64>,
    pub archived: bool,
}

impl Account {
    pub fn new(
        owner_id: String,
        name: String,
        kind: AccountKind,
        credit_limit_minor: Option<i64>,
    ) -> ResultEngine<Self> {
        match (kind, credit_limit_minor) {
            (AccountKind::CreditLine, Some(limit)) if limit > 0 => {}
            (AccountKind::CreditLine, _) => {
                return Err(EngineError::InvalidInput(
                    "credit line requires a positive limit".to_string(),
                ));
            }
            (AccountKind::Ordinary, Some(_)) => {
                return Err(EngineError::InvalidInput(
                    "only credit lines carry a limit".to_string(),
                ));
            }
            (AccountKind::Ordinary, None) => {}
        }
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            kind,
            balance_minor: 0,
            credit_limit_minor,
            archived: false,
        })
    }
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            kind: account.kind.into(),
            balance_minor: account.balance_minor,
            credit_limit_minor: account.credit_limit_minor,
            archived: account.archived,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub kind: String,
    pub balance_minor: i64,
    pub credit_limit_minor: Option<i64>,
    pub archived: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id.to_string()),
            owner_id: ActiveValue::Set(account.owner_id.clone()),
            name: ActiveValue::Set(account.name.clone()),
            kind: ActiveValue::Set(account.kind.as_str().to_string()),
            balance_minor: ActiveValue::Set(account.balance_minor),
            credit_limit_minor: ActiveValue::Set(account.credit_limit_minor),
            archived: ActiveValue::Set(account.archived),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("account not exists".to_string()))?,
            owner_id: model.owner_id,
            name: model.name,
            kind: AccountKind::try_from(model.kind.as_str())?,
            balance_minor: model.balance_minor,
            credit_limit_minor: model.credit_limit_minor,
            archived: model.archived,
        })
    }
}
