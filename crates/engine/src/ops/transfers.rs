use api_types::transfer::{TransferCreated, TransferUpdated};
use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, prelude::*};

use crate::{
    EngineError, Outcome, ResultEngine, Transaction, TransactionKind, TransactionRole,
    TransferCmd, UpdateTransferCmd, transactions,
};

use super::{Engine, normalize_required_text};

const INCOMING_KEY_SUFFIX: &str = ":in";

/// Both legs of a transfer, outgoing (negative) first.
struct Legs {
    outgoing: Transaction,
    incoming: Transaction,
}

impl Legs {
    fn from_pair(a: Transaction, b: Transaction) -> Self {
        if a.amount_minor < 0 {
            Self {
                outgoing: a,
                incoming: b,
            }
        } else {
            Self {
                outgoing: b,
                incoming: a,
            }
        }
    }
}

fn transfer_description(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

impl Engine {
    /// Moves `amount_minor` between two accounts of the same owner.
    ///
    /// Both legs are written in one unit with the two accounts locked in
    /// ascending id order.
    pub async fn create_transfer(&self, cmd: TransferCmd) -> ResultEngine<Outcome<TransferCreated>> {
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.create_transfer_in(db_tx, cmd).await })
            })
            .await,
        )
    }

    /// Edits a transfer through either leg, re-deriving both signed amounts
    /// from one magnitude.
    pub async fn update_transfer(
        &self,
        cmd: UpdateTransferCmd,
    ) -> ResultEngine<Outcome<TransferUpdated>> {
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.update_transfer_in(db_tx, cmd).await })
            })
            .await,
        )
    }

    async fn create_transfer_in(
        &self,
        db: &DatabaseTransaction,
        cmd: TransferCmd,
    ) -> ResultEngine<TransferCreated> {
        self.lock_accounts(db, &cmd.owner, &[cmd.from_account_id, cmd.to_account_id])
            .await?;

        if cmd.from_account_id == cmd.to_account_id {
            return Err(EngineError::InvalidInput(
                "source and destination accounts must differ".to_string(),
            ));
        }

        if let Some(key) = cmd.idempotency_key.as_deref()
            && let Some(existing) = self.find_by_idempotency_key(db, &cmd.owner, key).await?
        {
            let pair = self.require_pair(db, &existing).await?;
            let legs = Legs::from_pair(existing, pair);
            tracing::debug!(outgoing_id = %legs.outgoing.id, "transfer replayed");
            return Ok(TransferCreated {
                outgoing_id: legs.outgoing.id,
                incoming_id: legs.incoming.id,
                from_balance: self.stored_balance(db, legs.outgoing.account_id).await?,
                to_balance: self.stored_balance(db, legs.incoming.account_id).await?,
            });
        }

        if cmd.amount_minor <= 0 {
            return Err(EngineError::InvalidInput(
                "transfer amount must be > 0".to_string(),
            ));
        }
        self.ensure_period_open(db, &cmd.owner, cmd.date).await?;

        let mut outgoing = Transaction::new(
            cmd.owner.clone(),
            cmd.from_account_id,
            TransactionKind::Transfer,
            -cmd.amount_minor,
            cmd.date,
            transfer_description(&cmd.outgoing_description, "Transfer out"),
            cmd.status,
        );
        let mut incoming = Transaction::new(
            cmd.owner,
            cmd.to_account_id,
            TransactionKind::Transfer,
            cmd.amount_minor,
            cmd.date,
            transfer_description(&cmd.incoming_description, "Transfer in"),
            cmd.status,
        );
        outgoing.role = TransactionRole::TransferLeg;
        incoming.role = TransactionRole::TransferLeg;
        outgoing.linked_transaction_id = Some(incoming.id);
        incoming.linked_transaction_id = Some(outgoing.id);
        if let Some(key) = cmd.idempotency_key {
            incoming.idempotency_key = Some(format!("{key}{INCOMING_KEY_SUFFIX}"));
            outgoing.idempotency_key = Some(key);
        }

        transactions::ActiveModel::from(&outgoing).insert(db).await?;
        transactions::ActiveModel::from(&incoming).insert(db).await?;
        self.apply_row_change(db, None, Some(&outgoing)).await?;
        self.apply_row_change(db, None, Some(&incoming)).await?;

        Ok(TransferCreated {
            outgoing_id: outgoing.id,
            incoming_id: incoming.id,
            from_balance: self.stored_balance(db, outgoing.account_id).await?,
            to_balance: self.stored_balance(db, incoming.account_id).await?,
        })
    }

    async fn update_transfer_in(
        &self,
        db: &DatabaseTransaction,
        cmd: UpdateTransferCmd,
    ) -> ResultEngine<TransferUpdated> {
        let target = self
            .require_transaction(db, &cmd.owner, cmd.transaction_id)
            .await?;
        if target.role != TransactionRole::TransferLeg {
            return Err(EngineError::InvalidInput(
                "not a transfer leg; use update_transaction".to_string(),
            ));
        }
        let pair = self.require_pair(db, &target).await?;
        self.lock_accounts(db, &cmd.owner, &[target.account_id, pair.account_id])
            .await?;

        let target_id = target.id;
        let current = Legs::from_pair(target, pair);
        let magnitude = cmd
            .amount_minor
            .unwrap_or_else(|| current.outgoing.amount_minor.abs());
        if magnitude <= 0 {
            return Err(EngineError::InvalidInput(
                "transfer amount must be > 0".to_string(),
            ));
        }
        let description = cmd
            .description
            .as_deref()
            .map(|d| normalize_required_text(d, "description"))
            .transpose()?;

        let next = |leg: &Transaction, amount_minor: i64| {
            let mut updated = leg.clone();
            updated.amount_minor = amount_minor;
            if let Some(date) = cmd.date {
                updated.date = date;
            }
            if leg.id == target_id
                && let Some(description) = description.clone()
            {
                updated.description = description;
            }
            updated
        };
        let outgoing = next(&current.outgoing, -magnitude);
        let incoming = next(&current.incoming, magnitude);

        for (old, new) in [(&current.outgoing, &outgoing), (&current.incoming, &incoming)] {
            self.ensure_period_open(db, &cmd.owner, old.date).await?;
            self.ensure_period_open(db, &cmd.owner, new.date).await?;
        }
        self.sync_leg(db, &current.outgoing, outgoing.clone()).await?;
        self.sync_leg(db, &current.incoming, incoming.clone()).await?;

        Ok(TransferUpdated {
            outgoing_id: outgoing.id,
            incoming_id: incoming.id,
            from_balance: self.stored_balance(db, outgoing.account_id).await?,
            to_balance: self.stored_balance(db, incoming.account_id).await?,
        })
    }

    /// Writes one leg unless it already holds the target values.
    async fn sync_leg(
        &self,
        db: &DatabaseTransaction,
        old: &Transaction,
        mut new: Transaction,
    ) -> ResultEngine<()> {
        if new.same_content(old) {
            return Ok(());
        }
        new.updated_at = Utc::now();
        transactions::ActiveModel {
            id: ActiveValue::Set(new.id.to_string()),
            amount_minor: ActiveValue::Set(new.amount_minor),
            date: ActiveValue::Set(new.date),
            description: ActiveValue::Set(new.description.clone()),
            updated_at: ActiveValue::Set(new.updated_at),
            ..Default::default()
        }
        .update(db)
        .await?;
        self.apply_row_change(db, Some(old), Some(&new)).await
    }
}
