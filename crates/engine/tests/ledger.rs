mod common;

use std::sync::Arc;

use api_types::reply::ResultCode;
use engine::{
    AccountKind, DeleteScope, DeleteTransactionCmd, NewTransactionCmd, Outcome, Period,
    TransactionKind, TransactionRole, TransactionStatus, TransferCmd, UpdateTransactionCmd,
    UpdateTransferCmd,
};

use common::{account, applied, balance, date, engine_with_db, fund};

fn code<T>(outcome: &Outcome<T>) -> Option<ResultCode> {
    outcome.rejection().map(|rejection| rejection.code)
}

#[tokio::test]
async fn transfer_moves_balance_between_accounts() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    fund(&engine, "alice", x, 1000).await;

    let created = applied(
        engine
            .create_transfer(
                TransferCmd::new("alice", x, y, 300, date(2026, 3, 2))
                    .descriptions("To savings", "From checking"),
            )
            .await
            .unwrap(),
    );
    assert_eq!(created.from_balance, 700);
    assert_eq!(created.to_balance, 300);

    let outgoing = engine.transaction("alice", created.outgoing_id).await.unwrap();
    let incoming = engine.transaction("alice", created.incoming_id).await.unwrap();
    assert_eq!(outgoing.amount_minor, -incoming.amount_minor);
    assert_eq!(outgoing.linked_transaction_id, Some(incoming.id));
    assert_eq!(incoming.linked_transaction_id, Some(outgoing.id));
    assert_ne!(outgoing.account_id, incoming.account_id);
    assert_eq!(outgoing.kind, TransactionKind::Transfer);
    assert_eq!(incoming.kind, TransactionKind::Transfer);
    assert_eq!(outgoing.role, TransactionRole::TransferLeg);
}

#[tokio::test]
async fn same_account_transfer_is_invalid_input() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;

    for (amount, status) in [
        (500, TransactionStatus::Completed),
        (0, TransactionStatus::Pending),
        (-10, TransactionStatus::Completed),
    ] {
        let outcome = engine
            .create_transfer(TransferCmd::new("alice", x, x, amount, date(2026, 3, 2)).status(status))
            .await
            .unwrap();
        assert_eq!(code(&outcome), Some(ResultCode::InvalidInput));
    }
}

#[tokio::test]
async fn non_positive_transfer_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;

    let outcome = engine
        .create_transfer(TransferCmd::new("alice", x, y, 0, date(2026, 3, 2)))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::InvalidInput));
    assert_eq!(balance(&engine, "alice", x).await, 0);
}

#[tokio::test]
async fn ownership_is_checked_before_validation() {
    let (engine, _db) = engine_with_db().await;
    let alice = account(&engine, "alice", "Checking").await;
    let bob = account(&engine, "bob", "Checking").await;

    // Wrong sign for an expense, but the foreign account wins.
    let outcome = engine
        .create_transaction(NewTransactionCmd::new(
            "bob",
            alice,
            TransactionKind::Expense,
            500,
            date(2026, 3, 3),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::NotOwned));

    let outcome = engine
        .create_transfer(TransferCmd::new("bob", bob, alice, 100, date(2026, 3, 3)))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::NotOwned));

    let outcome = engine
        .delete_transaction(DeleteTransactionCmd::new("alice", uuid::Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::NotFound));
}

#[tokio::test]
async fn sign_must_match_kind() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;

    let outcome = engine
        .create_transaction(NewTransactionCmd::new(
            "alice",
            x,
            TransactionKind::Expense,
            4250,
            date(2026, 3, 3),
            "Dinner",
        ))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::InvalidInput));
}

#[tokio::test]
async fn pending_rows_do_not_move_balance_until_completed() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;

    let created = applied(
        engine
            .create_transaction(
                NewTransactionCmd::new(
                    "alice",
                    x,
                    TransactionKind::Expense,
                    -4250,
                    date(2026, 3, 3),
                    "Dinner",
                )
                .status(TransactionStatus::Pending),
            )
            .await
            .unwrap(),
    );
    assert_eq!(created.new_balance, 0);

    let updated = applied(
        engine
            .update_transaction(
                UpdateTransactionCmd::new("alice", created.transaction_id)
                    .status(TransactionStatus::Completed),
            )
            .await
            .unwrap(),
    );
    assert_eq!(updated.new_balance, -4250);

    // Same patch again is a no-op.
    let again = applied(
        engine
            .update_transaction(
                UpdateTransactionCmd::new("alice", created.transaction_id)
                    .status(TransactionStatus::Completed),
            )
            .await
            .unwrap(),
    );
    assert_eq!(again.new_balance, -4250);
}

#[tokio::test]
async fn create_replay_with_same_key_applies_once() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let cmd = NewTransactionCmd::new(
        "alice",
        x,
        TransactionKind::Expense,
        -4250,
        date(2026, 3, 3),
        "Dinner",
    )
    .idempotency_key("tmp-1");

    let first = applied(engine.create_transaction(cmd.clone()).await.unwrap());
    let second = applied(engine.create_transaction(cmd).await.unwrap());

    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(second.new_balance, -4250);
    let rows = engine
        .list_account_transactions("alice", x, 100)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn transfer_replay_with_same_key_applies_once() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    fund(&engine, "alice", x, 1000).await;
    let cmd = TransferCmd::new("alice", x, y, 250, date(2026, 3, 4)).idempotency_key("tmp-t");

    let first = applied(engine.create_transfer(cmd.clone()).await.unwrap());
    let second = applied(engine.create_transfer(cmd).await.unwrap());

    assert_eq!(first.outgoing_id, second.outgoing_id);
    assert_eq!(first.incoming_id, second.incoming_id);
    assert_eq!(balance(&engine, "alice", x).await, 750);
    assert_eq!(balance(&engine, "alice", y).await, 250);
}

#[tokio::test]
async fn edit_transfer_rederives_both_legs() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    fund(&engine, "alice", x, 1000).await;
    let created = applied(
        engine
            .create_transfer(TransferCmd::new("alice", x, y, 300, date(2026, 3, 2)))
            .await
            .unwrap(),
    );

    // Edit through the incoming leg.
    let updated = applied(
        engine
            .update_transfer(
                UpdateTransferCmd::new("alice", created.incoming_id)
                    .amount_minor(450)
                    .date(date(2026, 3, 9)),
            )
            .await
            .unwrap(),
    );
    assert_eq!(updated.outgoing_id, created.outgoing_id);
    assert_eq!(updated.from_balance, 550);
    assert_eq!(updated.to_balance, 450);

    let outgoing = engine.transaction("alice", created.outgoing_id).await.unwrap();
    assert_eq!(outgoing.amount_minor, -450);
    assert_eq!(outgoing.date, date(2026, 3, 9));

    // Replaying the same edit leaves balances alone.
    let again = applied(
        engine
            .update_transfer(UpdateTransferCmd::new("alice", created.outgoing_id).amount_minor(450))
            .await
            .unwrap(),
    );
    assert_eq!(again.from_balance, 550);
    assert_eq!(again.to_balance, 450);
}

#[tokio::test]
async fn transfer_legs_cannot_be_edited_as_plain_rows() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    let created = applied(
        engine
            .create_transfer(TransferCmd::new("alice", x, y, 300, date(2026, 3, 2)))
            .await
            .unwrap(),
    );

    let outcome = engine
        .update_transaction(UpdateTransactionCmd::new("alice", created.outgoing_id).amount_minor(-1))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::InvalidInput));
}

#[tokio::test]
async fn deleting_one_leg_deletes_the_pair() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    fund(&engine, "alice", x, 1000).await;
    let created = applied(
        engine
            .create_transfer(TransferCmd::new("alice", x, y, 300, date(2026, 3, 2)))
            .await
            .unwrap(),
    );

    let deleted = applied(
        engine
            .delete_transaction(
                DeleteTransactionCmd::new("alice", created.incoming_id).scope(DeleteScope::All),
            )
            .await
            .unwrap(),
    );
    assert_eq!(deleted.deleted_count, 2);
    assert_eq!(balance(&engine, "alice", x).await, 1000);
    assert_eq!(balance(&engine, "alice", y).await, 0);
    assert!(engine.transaction("alice", created.outgoing_id).await.is_err());
}

#[tokio::test]
async fn locked_period_blocks_writes() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let march = Period::new(2026, 3).unwrap();
    engine.lock_period("alice", march).await.unwrap();

    let outcome = engine
        .create_transaction(NewTransactionCmd::new(
            "alice",
            x,
            TransactionKind::Income,
            100,
            date(2026, 3, 10),
            "Refund",
        ))
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::LockedPeriod));

    engine.unlock_period("alice", march).await.unwrap();
    let outcome = engine
        .create_transaction(NewTransactionCmd::new(
            "alice",
            x,
            TransactionKind::Income,
            100,
            date(2026, 3, 10),
            "Refund",
        ))
        .await
        .unwrap();
    assert!(outcome.is_applied());
}

#[tokio::test]
async fn credit_line_defaults_invoice_period() {
    let (engine, _db) = engine_with_db().await;
    let card = engine
        .create_account("alice", "Visa", AccountKind::CreditLine, Some(200_000))
        .await
        .unwrap();
    let cash = account(&engine, "alice", "Cash").await;

    let created = applied(
        engine
            .create_transaction(NewTransactionCmd::new(
                "alice",
                card,
                TransactionKind::Expense,
                -1999,
                date(2026, 5, 30),
                "Books",
            ))
            .await
            .unwrap(),
    );
    let row = engine.transaction("alice", created.transaction_id).await.unwrap();
    assert_eq!(row.invoice_period, Period::new(2026, 5));

    let outcome = engine
        .create_transaction(
            NewTransactionCmd::new(
                "alice",
                cash,
                TransactionKind::Expense,
                -1999,
                date(2026, 5, 30),
                "Books",
            )
            .invoice_period(Period::new(2026, 6).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(code(&outcome), Some(ResultCode::InvalidInput));
}

#[tokio::test]
async fn stored_balance_matches_history() {
    let (engine, _db) = engine_with_db().await;
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    fund(&engine, "alice", x, 10_000).await;

    let expense = applied(
        engine
            .create_transaction(NewTransactionCmd::new(
                "alice",
                x,
                TransactionKind::Expense,
                -1234,
                date(2026, 3, 5),
                "Groceries",
            ))
            .await
            .unwrap(),
    );
    applied(
        engine
            .create_transfer(TransferCmd::new("alice", x, y, 2000, date(2026, 3, 6)))
            .await
            .unwrap(),
    );
    applied(
        engine
            .update_transaction(
                UpdateTransactionCmd::new("alice", expense.transaction_id).amount_minor(-999),
            )
            .await
            .unwrap(),
    );

    for id in [x, y] {
        let stored = balance(&engine, "alice", id).await;
        let derived = engine.recompute_account_balance("alice", id).await.unwrap();
        assert_eq!(stored, derived);
    }
    assert_eq!(balance(&engine, "alice", x).await, 10_000 - 999 - 2000);
}

#[tokio::test]
async fn concurrent_transfers_do_not_lose_updates() {
    let (engine, _db) = engine_with_db().await;
    let engine = Arc::new(engine);
    let x = account(&engine, "alice", "Checking").await;
    let y = account(&engine, "alice", "Savings").await;
    fund(&engine, "alice", x, 1000).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .create_transfer(TransferCmd::new("alice", x, y, 100, date(2026, 3, 7)))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_applied());
    }

    assert_eq!(balance(&engine, "alice", x).await, 0);
    assert_eq!(balance(&engine, "alice", y).await, 1000);
    assert_eq!(engine.recompute_account_balance("alice", x).await.unwrap(), 0);
}
