use std::{future::Future, pin::Pin};

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::{EngineError, ResultEngine};

mod access;
mod accounts;
mod balances;
mod deletion;
mod periods;
mod recurring;
mod transactions;
mod transfers;

/// Authoritative ledger store.
///
/// Every write procedure runs in one database transaction and returns an
/// [`Outcome`](crate::Outcome): business rejections are values, only
/// conflicts and storage faults come back as `Err`.
#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Runs `f` inside a database transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub(crate) async fn with_tx<T, F>(&self, f: F) -> ResultEngine<T>
    where
        T: Send,
        F: for<'a> FnOnce(
                &'a Engine,
                &'a DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = ResultEngine<T>> + Send + 'a>>
            + Send,
    {
        let db_tx = self.database.begin().await?;
        let result = f(self, &db_tx).await;
        match result {
            Ok(value) => {
                db_tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = db_tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
        })
    }
}
