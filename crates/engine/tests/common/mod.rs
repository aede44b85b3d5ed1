#![allow(dead_code)]

use chrono::NaiveDate;
use engine::{
    AccountKind, Engine, NewTransactionCmd, Outcome, TransactionKind, TransactionStatus,
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    engine.create_user("alice", "password").await.unwrap();
    engine.create_user("bob", "password").await.unwrap();
    (engine, db)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn account(engine: &Engine, owner: &str, name: &str) -> Uuid {
    engine
        .create_account(owner, name, AccountKind::Ordinary, None)
        .await
        .unwrap()
}

/// Completed income that seeds an account balance.
pub async fn fund(engine: &Engine, owner: &str, account_id: Uuid, amount_minor: i64) {
    let outcome = engine
        .create_transaction(NewTransactionCmd::new(
            owner,
            account_id,
            TransactionKind::Income,
            amount_minor,
            date(2026, 3, 1),
            "Salary",
        ))
        .await
        .unwrap();
    assert!(outcome.is_applied(), "{outcome:?}");
}

pub async fn balance(engine: &Engine, owner: &str, account_id: Uuid) -> i64 {
    engine
        .account(owner, account_id)
        .await
        .unwrap()
        .balance_minor
}

pub fn applied<T: std::fmt::Debug>(outcome: Outcome<T>) -> T {
    match outcome {
        Outcome::Applied(value) => value,
        Outcome::Rejected(rejection) => panic!("rejected: {rejection:?}"),
    }
}

pub async fn complete(engine: &Engine, owner: &str, transaction_id: Uuid) {
    applied(
        engine
            .update_transaction(
                engine::UpdateTransactionCmd::new(owner, transaction_id)
                    .status(TransactionStatus::Completed),
            )
            .await
            .unwrap(),
    );
}
