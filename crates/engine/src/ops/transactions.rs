use api_types::transaction::{TransactionCreated, TransactionUpdated};
use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, prelude::*};

use crate::{
    AccountKind, EngineError, NewTransactionCmd, Outcome, Period, ResultEngine, Transaction,
    TransactionKind, TransactionRole, UpdateTransactionCmd, reactor, transactions,
};

use super::{Engine, normalize_required_text};

impl Engine {
    /// Creates an income or expense row.
    ///
    /// The account balance moves only for `completed` rows. Replaying a
    /// request with the same idempotency key returns the row created the
    /// first time and the current balance.
    pub async fn create_transaction(
        &self,
        cmd: NewTransactionCmd,
    ) -> ResultEngine<Outcome<TransactionCreated>> {
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.create_transaction_in(db_tx, cmd).await })
            })
            .await,
        )
    }

    /// Patches an ordinary, envelope or recurring instance row.
    ///
    /// Transfer legs go through [`Engine::update_transfer`]; templates are
    /// edited by recreating the series.
    pub async fn update_transaction(
        &self,
        cmd: UpdateTransactionCmd,
    ) -> ResultEngine<Outcome<TransactionUpdated>> {
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.update_transaction_in(db_tx, cmd).await })
            })
            .await,
        )
    }

    async fn create_transaction_in(
        &self,
        db: &DatabaseTransaction,
        cmd: NewTransactionCmd,
    ) -> ResultEngine<TransactionCreated> {
        let account = self.require_account(db, &cmd.owner, cmd.account_id).await?;
        self.require_category(db, &cmd.owner, cmd.category_id)
            .await?;

        if let Some(key) = cmd.idempotency_key.as_deref()
            && let Some(existing) = self.find_by_idempotency_key(db, &cmd.owner, key).await?
        {
            tracing::debug!(transaction_id = %existing.id, "create replayed");
            return Ok(TransactionCreated {
                transaction_id: existing.id,
                new_balance: self.stored_balance(db, existing.account_id).await?,
            });
        }

        if cmd.kind == TransactionKind::Transfer {
            return Err(EngineError::InvalidInput(
                "transfers are created with create_transfer".to_string(),
            ));
        }
        cmd.kind.check_sign(cmd.amount_minor)?;
        let description = normalize_required_text(&cmd.description, "description")?;
        let invoice_period = match (account.kind, cmd.invoice_period) {
            (AccountKind::CreditLine, period) => {
                Some(period.unwrap_or_else(|| Period::from_date(cmd.date)))
            }
            (AccountKind::Ordinary, None) => None,
            (AccountKind::Ordinary, Some(_)) => {
                return Err(EngineError::InvalidInput(
                    "invoice period is only valid on credit lines".to_string(),
                ));
            }
        };
        self.ensure_period_open(db, &cmd.owner, cmd.date).await?;

        let mut tx = Transaction::new(
            cmd.owner,
            account.id,
            cmd.kind,
            cmd.amount_minor,
            cmd.date,
            description,
            cmd.status,
        );
        tx.category_id = cmd.category_id;
        tx.invoice_period = invoice_period;
        tx.idempotency_key = cmd.idempotency_key;

        let effects = reactor::envelope_effects(None, Some(&tx))?;
        self.lock_write_set(db, &tx.owner_id, &[tx.account_id], &effects)
            .await?;
        transactions::ActiveModel::from(&tx).insert(db).await?;
        self.apply_row_change(db, None, Some(&tx)).await?;

        Ok(TransactionCreated {
            transaction_id: tx.id,
            new_balance: self.stored_balance(db, account.id).await?,
        })
    }

    async fn update_transaction_in(
        &self,
        db: &DatabaseTransaction,
        cmd: UpdateTransactionCmd,
    ) -> ResultEngine<TransactionUpdated> {
        let old = self
            .require_transaction(db, &cmd.owner, cmd.transaction_id)
            .await?;
        if let Some(category_id) = cmd.category_id {
            self.require_category(db, &cmd.owner, category_id).await?;
        }

        match old.role {
            TransactionRole::TransferLeg => {
                return Err(EngineError::InvalidInput(
                    "transfer legs are edited with update_transfer".to_string(),
                ));
            }
            TransactionRole::Template => {
                return Err(EngineError::InvalidInput(
                    "recurring templates cannot be edited directly".to_string(),
                ));
            }
            TransactionRole::Ordinary | TransactionRole::Provision | TransactionRole::Instance => {}
        }

        let mut new = old.clone();
        if let Some(description) = cmd.description.as_deref() {
            new.description = normalize_required_text(description, "description")?;
        }
        if let Some(amount_minor) = cmd.amount_minor {
            new.amount_minor = amount_minor;
        }
        if let Some(date) = cmd.date {
            new.date = date;
        }
        if let Some(category_id) = cmd.category_id {
            new.category_id = category_id;
        }
        if let Some(status) = cmd.status {
            new.status = status;
        }
        // Envelopes carry the sign of their direction, which may cross zero
        // while being consumed.
        if new.role != TransactionRole::Provision {
            new.kind.check_sign(new.amount_minor)?;
        }

        if new.same_content(&old) {
            return Ok(TransactionUpdated {
                transaction_id: old.id,
                new_balance: self.stored_balance(db, old.account_id).await?,
            });
        }

        self.ensure_period_open(db, &cmd.owner, old.date).await?;
        self.ensure_period_open(db, &cmd.owner, new.date).await?;

        if new.date != old.date
            && let Some(invoice) = old.invoice_period
            && invoice == Period::from_date(old.date)
        {
            new.invoice_period = Some(Period::from_date(new.date));
        }
        new.updated_at = Utc::now();

        let effects = reactor::envelope_effects(Some(&old), Some(&new))?;
        self.lock_write_set(db, &cmd.owner, &[old.account_id], &effects)
            .await?;
        transactions::ActiveModel {
            id: ActiveValue::Set(new.id.to_string()),
            description: ActiveValue::Set(new.description.clone()),
            amount_minor: ActiveValue::Set(new.amount_minor),
            date: ActiveValue::Set(new.date),
            category_id: ActiveValue::Set(new.category_id.map(|id| id.to_string())),
            status: ActiveValue::Set(new.status.as_str().to_string()),
            invoice_period: ActiveValue::Set(new.invoice_period.map(|p| p.to_string())),
            updated_at: ActiveValue::Set(new.updated_at),
            ..Default::default()
        }
        .update(db)
        .await?;
        self.apply_row_change(db, Some(&old), Some(&new)).await?;

        Ok(TransactionUpdated {
            transaction_id: new.id,
            new_balance: self.stored_balance(db, new.account_id).await?,
        })
    }
}
