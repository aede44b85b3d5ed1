mod common;

use api_types::reply::ResultCode;
use chrono::Datelike;
use engine::{
    DeleteScope, DeleteTransactionCmd, Engine, RecurringSeriesCmd, SERIES_HORIZON_MONTHS,
    TransactionKind, TransactionRole, TransactionStatus,
};
use uuid::Uuid;

use common::{account, applied, balance, complete, date, engine_with_db};

async fn rent_series(engine: &Engine, account: Uuid) -> (Uuid, Vec<Uuid>) {
    let series = applied(
        engine
            .create_recurring_series(RecurringSeriesCmd::new(
                "alice",
                account,
                TransactionKind::Expense,
                -80_000,
                date(2026, 1, 31),
                "Rent",
            ))
            .await
            .unwrap(),
    );
    (series.template_id, series.instance_ids)
}

#[tokio::test]
async fn series_generates_clamped_monthly_children() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;

    assert_eq!(ids.len(), SERIES_HORIZON_MONTHS as usize);
    let children = engine.series_children("alice", template_id).await.unwrap();
    assert_eq!(children.len(), 12);
    assert!(children.iter().all(|c| c.date.day() == 28));
    assert!(children.iter().all(|c| c.is_fixed && c.role == TransactionRole::Instance));
    assert!(children.iter().all(|c| c.status == TransactionStatus::Pending));

    let template = engine.transaction("alice", template_id).await.unwrap();
    assert!(template.is_template());
    assert!(template.is_fixed);
    assert_eq!(balance(&engine, "alice", x).await, 0);
}

#[tokio::test]
async fn first_instance_status_applies_to_first_child_only() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let series = applied(
        engine
            .create_recurring_series(
                RecurringSeriesCmd::new(
                    "alice",
                    x,
                    TransactionKind::Income,
                    250_000,
                    date(2026, 3, 27),
                    "Salary",
                )
                .first_instance_status(TransactionStatus::Completed),
            )
            .await
            .unwrap(),
    );
    let children = engine
        .series_children("alice", series.template_id)
        .await
        .unwrap();
    assert_eq!(children[0].status, TransactionStatus::Completed);
    assert!(children[1..].iter().all(|c| c.status == TransactionStatus::Pending));
    assert_eq!(balance(&engine, "alice", x).await, 250_000);
}

#[tokio::test]
async fn delete_all_keeps_completed_history_and_retires_template() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;
    for id in &ids[..3] {
        complete(&engine, "alice", *id).await;
    }
    assert_eq!(balance(&engine, "alice", x).await, -240_000);

    let deleted = applied(
        engine
            .delete_transaction(DeleteTransactionCmd::new("alice", ids[5]).scope(DeleteScope::All))
            .await
            .unwrap(),
    );
    assert_eq!(deleted.deleted_count, 9);

    let children = engine.series_children("alice", template_id).await.unwrap();
    assert_eq!(children.len(), 3);
    assert!(children.iter().all(|c| c.status == TransactionStatus::Completed));

    let template = engine.transaction("alice", template_id).await.unwrap();
    assert!(template.is_template());
    assert!(!template.is_fixed);
    assert_eq!(balance(&engine, "alice", x).await, -240_000);

    let outcome = engine
        .extend_series("alice", template_id, date(2026, 6, 1))
        .await
        .unwrap();
    assert_eq!(
        outcome.rejection().map(|r| r.code),
        Some(ResultCode::InvalidInput)
    );
}

#[tokio::test]
async fn delete_all_without_history_removes_everything() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;

    let deleted = applied(
        engine
            .delete_transaction(DeleteTransactionCmd::new("alice", ids[0]).scope(DeleteScope::All))
            .await
            .unwrap(),
    );
    assert_eq!(deleted.deleted_count, 13);
    assert!(engine.transaction("alice", template_id).await.is_err());
}

#[tokio::test]
async fn delete_current_and_remaining_truncates_series() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;
    complete(&engine, "alice", ids[0]).await;
    complete(&engine, "alice", ids[1]).await;

    let deleted = applied(
        engine
            .delete_transaction(
                DeleteTransactionCmd::new("alice", ids[6]).scope(DeleteScope::CurrentAndRemaining),
            )
            .await
            .unwrap(),
    );
    assert_eq!(deleted.deleted_count, 6);
    let children = engine.series_children("alice", template_id).await.unwrap();
    assert_eq!(children.len(), 6);
    assert!(!engine.transaction("alice", template_id).await.unwrap().is_fixed);
}

#[tokio::test]
async fn delete_current_removes_one_child() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;
    complete(&engine, "alice", ids[0]).await;

    // An explicitly targeted completed child may go.
    let deleted = applied(
        engine
            .delete_transaction(DeleteTransactionCmd::new("alice", ids[0]))
            .await
            .unwrap(),
    );
    assert_eq!(deleted.deleted_count, 1);
    assert_eq!(balance(&engine, "alice", x).await, 0);
    let template = engine.transaction("alice", template_id).await.unwrap();
    assert!(template.is_fixed);
    assert_eq!(
        engine.series_children("alice", template_id).await.unwrap().len(),
        11
    );
}

#[tokio::test]
async fn deleting_template_behaves_as_all() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;
    complete(&engine, "alice", ids[0]).await;

    let deleted = applied(
        engine
            .delete_transaction(DeleteTransactionCmd::new("alice", template_id))
            .await
            .unwrap(),
    );
    assert_eq!(deleted.deleted_count, 11);
    assert!(!engine.transaction("alice", template_id).await.unwrap().is_fixed);
}

#[tokio::test]
async fn extend_series_tops_up_to_horizon() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let series = applied(
        engine
            .create_recurring_series(RecurringSeriesCmd::new(
                "alice",
                x,
                TransactionKind::Expense,
                -1299,
                date(2026, 3, 1),
                "Streaming",
            ))
            .await
            .unwrap(),
    );

    let extended = applied(
        engine
            .extend_series("alice", series.template_id, date(2026, 6, 15))
            .await
            .unwrap(),
    );
    assert_eq!(extended.instances_created, 3);
    let children = engine
        .series_children("alice", series.template_id)
        .await
        .unwrap();
    assert_eq!(children.last().unwrap().date, date(2027, 5, 1));

    let again = applied(
        engine
            .extend_series("alice", series.template_id, date(2026, 6, 15))
            .await
            .unwrap(),
    );
    assert_eq!(again.instances_created, 0);
}

#[tokio::test]
async fn series_create_replay_returns_existing_series() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let cmd = RecurringSeriesCmd::new(
        "alice",
        x,
        TransactionKind::Expense,
        -1299,
        date(2026, 3, 1),
        "Streaming",
    )
    .idempotency_key("tmp-series");

    let first = applied(engine.create_recurring_series(cmd.clone()).await.unwrap());
    let second = applied(engine.create_recurring_series(cmd).await.unwrap());
    assert_eq!(first.template_id, second.template_id);
    assert_eq!(first.instance_ids, second.instance_ids);
}

#[tokio::test]
async fn extension_of_month_end_series_keeps_its_day() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, _) = rent_series(&engine, x).await;

    let extended = applied(
        engine
            .extend_series("alice", template_id, date(2026, 2, 1))
            .await
            .unwrap(),
    );
    assert_eq!(extended.instances_created, 1);
    let children = engine.series_children("alice", template_id).await.unwrap();
    assert_eq!(children.len(), 13);
    assert_eq!(children.last().unwrap().date, date(2027, 1, 28));
    assert!(children.iter().all(|c| c.date.day() == 28));
}

#[tokio::test]
async fn series_delete_checks_the_template_owner() {
    use sea_orm::ConnectionTrait;

    let (engine, db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let (template_id, ids) = rent_series(&engine, x).await;
    db.execute_unprepared(&format!(
        "UPDATE transactions SET owner_id = 'bob' WHERE id = '{template_id}'"
    ))
    .await
    .unwrap();

    let outcome = engine
        .delete_transaction(DeleteTransactionCmd::new("alice", ids[3]).scope(DeleteScope::All))
        .await
        .unwrap();
    assert_eq!(
        outcome.rejection().map(|r| r.code),
        Some(ResultCode::NotOwned)
    );
    assert_eq!(
        engine.series_children("bob", template_id).await.unwrap().len(),
        12
    );
}
