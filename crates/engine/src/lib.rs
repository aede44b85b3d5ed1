//! Authoritative ledger store.
//!
//! - [`Engine`]: atomic, ownership-checked procedures over a sea-orm database
//! - [`reactor`]: pure balance and envelope effects of a row write
//! - [`schedule`]: monthly date generation for recurring series

pub use accounts::{Account, AccountKind};
pub use api_types::ledger::DeleteScope;
pub use commands::{
    DeleteTransactionCmd, NewTransactionCmd, RecurringSeriesCmd, TransferCmd,
    UpdateTransactionCmd, UpdateTransferCmd,
};
pub use error::EngineError;
pub use money::Amount;
pub use ops::{Engine, EngineBuilder};
pub use outcome::Outcome;
pub use period::Period;
pub use schedule::SERIES_HORIZON_MONTHS;
pub use transactions::{Transaction, TransactionKind, TransactionRole, TransactionStatus};

mod accounts;
mod api;
mod categories;
mod commands;
mod error;
mod locked_periods;
mod money;
mod ops;
mod outcome;
mod period;
pub mod reactor;
pub mod schedule;
mod series;
mod transactions;
mod users;

pub type ResultEngine<T> = Result<T, EngineError>;
