//! Balance and envelope bookkeeping for a single row write.
//!
//! [`Engine::apply_row_change`] is the pipeline step every write path calls
//! after persisting a row: it applies the balance deltas and the envelope
//! deltas computed by [`crate::reactor`] in the caller's transaction.

use chrono::Utc;
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, Statement, prelude::*,
};
use uuid::Uuid;

use crate::{
    Account, EngineError, ResultEngine, Transaction, TransactionRole, TransactionStatus, accounts,
    reactor::{self, BalanceDelta, EnvelopeDelta, EnvelopeKey},
    transactions,
};

use super::Engine;

impl Engine {
    pub(super) async fn apply_row_change(
        &self,
        db: &DatabaseTransaction,
        old: Option<&Transaction>,
        new: Option<&Transaction>,
    ) -> ResultEngine<()> {
        self.apply_balance_deltas(db, &reactor::balance_effects(old, new)?)
            .await?;
        self.apply_envelope_deltas(db, &reactor::envelope_effects(old, new)?)
            .await
    }

    /// Locks `account_ids` together with every account holding an envelope
    /// in `effects`, in one ascending pass.
    ///
    /// Write paths call this before their first balance write so the envelope
    /// step only touches rows already locked.
    pub(super) async fn lock_write_set(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        account_ids: &[Uuid],
        effects: &[EnvelopeDelta],
    ) -> ResultEngine<Vec<Account>> {
        let mut write_set = account_ids.to_vec();
        for delta in effects {
            if let Some(model) = self.find_envelope(db, &delta.key).await? {
                write_set.push(Transaction::try_from(model)?.account_id);
            }
        }
        self.lock_accounts(db, owner, &write_set).await
    }

    /// Locked read-modify-write of each account balance.
    pub(super) async fn apply_balance_deltas(
        &self,
        db: &DatabaseTransaction,
        deltas: &[BalanceDelta],
    ) -> ResultEngine<()> {
        for delta in deltas {
            let model = accounts::Entity::find_by_id(delta.account_id.to_string())
                .lock_exclusive()
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
            let balance = model
                .balance_minor
                .checked_add(delta.delta_minor)
                .ok_or_else(|| EngineError::InvalidInput("balance overflow".to_string()))?;
            accounts::ActiveModel {
                id: ActiveValue::Set(model.id),
                balance_minor: ActiveValue::Set(balance),
                ..Default::default()
            }
            .update(db)
            .await?;
        }
        Ok(())
    }

    /// Adjusts the envelope rows matching each delta.
    ///
    /// The envelope row is written directly and its own balance effect is
    /// applied without another envelope pass, so the step never feeds itself.
    pub(super) async fn apply_envelope_deltas(
        &self,
        db: &DatabaseTransaction,
        deltas: &[EnvelopeDelta],
    ) -> ResultEngine<()> {
        for delta in deltas {
            let Some(model) = self.find_envelope(db, &delta.key).await? else {
                tracing::debug!(
                    category_id = %delta.key.category_id,
                    period = %delta.key.period,
                    "no envelope for category/month"
                );
                continue;
            };
            let before = Transaction::try_from(model)?;
            let after = Transaction {
                amount_minor: before
                    .amount_minor
                    .checked_add(delta.delta_minor)
                    .ok_or_else(|| EngineError::InvalidInput("envelope overflow".to_string()))?,
                updated_at: Utc::now(),
                ..before.clone()
            };
            transactions::ActiveModel {
                id: ActiveValue::Set(after.id.to_string()),
                amount_minor: ActiveValue::Set(after.amount_minor),
                updated_at: ActiveValue::Set(after.updated_at),
                ..Default::default()
            }
            .update(db)
            .await?;
            tracing::debug!(
                envelope_id = %after.id,
                from = before.amount_minor,
                to = after.amount_minor,
                "envelope adjusted"
            );

            self.apply_balance_deltas(db, &reactor::balance_effects(Some(&before), Some(&after))?)
                .await?;
        }
        Ok(())
    }

    async fn find_envelope(
        &self,
        db: &DatabaseTransaction,
        key: &EnvelopeKey,
    ) -> ResultEngine<Option<transactions::Model>> {
        let (Some(first), Some(last)) = (key.period.first_day(), key.period.last_day()) else {
            return Err(EngineError::InvalidInput(format!(
                "invalid period: {}",
                key.period
            )));
        };
        transactions::Entity::find()
            .filter(transactions::Column::OwnerId.eq(key.owner_id.clone()))
            .filter(transactions::Column::CategoryId.eq(key.category_id.to_string()))
            .filter(transactions::Column::Role.eq(TransactionRole::Provision.as_str()))
            .filter(transactions::Column::Date.between(first, last))
            .order_by_asc(transactions::Column::Date)
            .order_by_asc(transactions::Column::CreatedAt)
            .one(db)
            .await
            .map_err(Into::into)
    }

    pub(super) async fn stored_balance(
        &self,
        db: &DatabaseTransaction,
        account_id: Uuid,
    ) -> ResultEngine<i64> {
        accounts::Entity::find_by_id(account_id.to_string())
            .one(db)
            .await?
            .map(|model| model.balance_minor)
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))
    }

    /// Rebuilds the balance of `account_id` from its completed history.
    pub(super) async fn recompute_balance_in(
        &self,
        db: &DatabaseTransaction,
        account_id: Uuid,
    ) -> ResultEngine<i64> {
        let model = accounts::Entity::find_by_id(account_id.to_string())
            .lock_exclusive()
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;

        let stmt = Statement::from_sql_and_values(
            db.get_database_backend(),
            "SELECT COALESCE(SUM(amount_minor), 0) AS sum \
             FROM transactions \
             WHERE account_id = ? AND status = ? AND role <> ?;"
                .to_string(),
            vec![
                model.id.clone().into(),
                TransactionStatus::Completed.as_str().into(),
                TransactionRole::Template.as_str().into(),
            ],
        );
        let row = db.query_one(stmt).await?;
        let balance: i64 = row.and_then(|r| r.try_get("", "sum").ok()).unwrap_or(0);

        if balance != model.balance_minor {
            tracing::info!(
                account_id = %account_id,
                stored = model.balance_minor,
                derived = balance,
                "balance rebuilt from history"
            );
        }
        accounts::ActiveModel {
            id: ActiveValue::Set(model.id),
            balance_minor: ActiveValue::Set(balance),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(balance)
    }
}
