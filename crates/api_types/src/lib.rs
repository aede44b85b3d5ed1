use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Deserializes a present field (including an explicit `null`) as `Some(_)`.
///
/// Paired with `#[serde(default)]` this gives tri-state patch fields:
/// absent = keep, `null` = clear, value = set.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub mod ledger {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionKind {
        Income,
        Expense,
        Transfer,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionStatus {
        #[default]
        Pending,
        Completed,
    }

    /// Breadth of a deletion applied to a recurring series.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum DeleteScope {
        #[default]
        Current,
        CurrentAndRemaining,
        All,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AccountKind {
        #[default]
        Ordinary,
        CreditLine,
    }
}

pub mod reply {
    use super::*;

    /// Result codes surfaced to callers of the authoritative procedures.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ResultCode {
        Ok,
        NotFound,
        NotOwned,
        InvalidInput,
        LockedPeriod,
        InternalError,
    }

    impl ResultCode {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Ok => "ok",
                Self::NotFound => "not-found",
                Self::NotOwned => "not-owned",
                Self::InvalidInput => "invalid-input",
                Self::LockedPeriod => "locked-period",
                Self::InternalError => "internal-error",
            }
        }
    }

    impl std::fmt::Display for ResultCode {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// A rejected procedure call.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Rejection {
        pub code: ResultCode,
        pub reason: String,
    }

    /// Envelope returned by every authoritative procedure.
    ///
    /// `{ "success": true, "code": "ok", "data": {..} }` or
    /// `{ "success": false, "code": "not-owned", "reason": ".." }`.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(bound(deserialize = "T: Deserialize<'de>"))]
    pub struct Reply<T> {
        pub success: bool,
        pub code: ResultCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub data: Option<T>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub reason: Option<String>,
    }

    impl<T> Reply<T> {
        pub fn applied(data: T) -> Self {
            Self {
                success: true,
                code: ResultCode::Ok,
                data: Some(data),
                reason: None,
            }
        }

        pub fn rejected(code: ResultCode, reason: impl Into<String>) -> Self {
            Self {
                success: false,
                code,
                data: None,
                reason: Some(reason.into()),
            }
        }

        pub fn into_result(self) -> Result<T, Rejection> {
            match (self.success, self.data) {
                (true, Some(data)) => Ok(data),
                (true, None) => Err(Rejection {
                    code: ResultCode::InternalError,
                    reason: "successful reply without data".to_string(),
                }),
                (false, _) => Err(Rejection {
                    code: self.code,
                    reason: self.reason.unwrap_or_else(|| self.code.to_string()),
                }),
            }
        }
    }
}

pub mod transaction {
    use super::ledger::{DeleteScope, TransactionKind, TransactionStatus};
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub description: String,
        /// Signed amount: positive for income, negative for expense.
        pub amount_minor: i64,
        pub date: NaiveDate,
        pub kind: TransactionKind,
        pub category_id: Option<Uuid>,
        pub account_id: Uuid,
        pub status: TransactionStatus,
        /// Billing month (`YYYY-MM`) for credit-line accounts.
        pub invoice_period: Option<String>,
        /// Optional idempotency key for safely retrying the same create request.
        pub idempotency_key: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionCreated {
        pub transaction_id: Uuid,
        pub new_balance: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionUpdate {
        pub transaction_id: Uuid,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub amount_minor: Option<i64>,
        #[serde(default)]
        pub date: Option<NaiveDate>,
        /// Absent = keep, `null` = clear, value = set.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "deserialize_some"
        )]
        pub category_id: Option<Option<Uuid>>,
        #[serde(default)]
        pub status: Option<TransactionStatus>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionUpdated {
        pub transaction_id: Uuid,
        pub new_balance: i64,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransactionDelete {
        pub transaction_id: Uuid,
        #[serde(default)]
        pub scope: DeleteScope,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Deleted {
        pub deleted_count: u64,
        pub message: String,
    }
}

pub mod transfer {
    use super::ledger::TransactionStatus;
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransferNew {
        pub from_account_id: Uuid,
        pub to_account_id: Uuid,
        /// Must be > 0. The legs carry the sign.
        pub amount_minor: i64,
        pub date: NaiveDate,
        pub outgoing_description: String,
        pub incoming_description: String,
        pub status: TransactionStatus,
        /// Optional idempotency key for safely retrying the same create request.
        pub idempotency_key: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransferCreated {
        pub outgoing_id: Uuid,
        pub incoming_id: Uuid,
        pub from_balance: i64,
        pub to_balance: i64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransferUpdate {
        /// Either leg of the transfer.
        pub transaction_id: Uuid,
        #[serde(default)]
        pub amount_minor: Option<i64>,
        #[serde(default)]
        pub date: Option<NaiveDate>,
        #[serde(default)]
        pub description: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransferUpdated {
        pub outgoing_id: Uuid,
        pub incoming_id: Uuid,
        pub from_balance: i64,
        pub to_balance: i64,
    }
}

pub mod recurring {
    use super::ledger::{TransactionKind, TransactionStatus};
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RecurringSeriesNew {
        pub description: String,
        pub amount_minor: i64,
        pub start_date: NaiveDate,
        pub kind: TransactionKind,
        pub category_id: Option<Uuid>,
        pub account_id: Uuid,
        pub first_instance_status: TransactionStatus,
        /// Generate monthly budget envelopes instead of plain instances.
        #[serde(default)]
        pub is_envelope: bool,
        /// Optional idempotency key for safely retrying the same create request.
        pub idempotency_key: Option<String>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RecurringSeriesCreated {
        pub template_id: Uuid,
        pub instances_created: u32,
        /// Instance ids in date order.
        pub instance_ids: Vec<Uuid>,
    }
}

pub mod account {
    use super::ledger::AccountKind;
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AccountGet {
        pub account_id: Uuid,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AccountView {
        pub id: Uuid,
        pub name: String,
        pub kind: AccountKind,
        pub balance_minor: i64,
        pub credit_limit_minor: Option<i64>,
        pub archived: bool,
    }
}
