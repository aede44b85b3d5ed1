use api_types::recurring::RecurringSeriesCreated;
use chrono::{NaiveDate, Utc};
use sea_orm::{DatabaseTransaction, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Outcome, RecurringSeriesCmd, ResultEngine, Transaction, TransactionKind,
    TransactionRole, TransactionStatus, schedule, transactions,
};

use super::{Engine, normalize_required_text};

impl Engine {
    /// Creates a template and its first `SERIES_HORIZON_MONTHS` monthly
    /// children in one unit.
    pub async fn create_recurring_series(
        &self,
        cmd: RecurringSeriesCmd,
    ) -> ResultEngine<Outcome<RecurringSeriesCreated>> {
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.create_recurring_series_in(db_tx, cmd).await })
            })
            .await,
        )
    }

    /// Tops an active series back up to the horizon measured from `today`.
    pub async fn extend_series(
        &self,
        owner: &str,
        template_id: Uuid,
        today: NaiveDate,
    ) -> ResultEngine<Outcome<RecurringSeriesCreated>> {
        let owner = owner.to_string();
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move {
                    engine
                        .extend_series_in(db_tx, &owner, template_id, today)
                        .await
                })
            })
            .await,
        )
    }

    async fn create_recurring_series_in(
        &self,
        db: &DatabaseTransaction,
        cmd: RecurringSeriesCmd,
    ) -> ResultEngine<RecurringSeriesCreated> {
        self.lock_account(db, &cmd.owner, cmd.account_id).await?;
        self.require_category(db, &cmd.owner, cmd.category_id)
            .await?;

        if let Some(key) = cmd.idempotency_key.as_deref()
            && let Some(existing) = self.find_by_idempotency_key(db, &cmd.owner, key).await?
        {
            let instance_ids: Vec<Uuid> = self
                .children_of(db, existing.id)
                .await?
                .into_iter()
                .map(|child| child.id)
                .collect();
            return Ok(RecurringSeriesCreated {
                template_id: existing.id,
                instances_created: instance_ids.len() as u32,
                instance_ids,
            });
        }

        if cmd.kind == TransactionKind::Transfer {
            return Err(EngineError::InvalidInput(
                "recurring transfers are not supported".to_string(),
            ));
        }
        cmd.kind.check_sign(cmd.amount_minor)?;
        if cmd.is_envelope && cmd.category_id.is_none() {
            return Err(EngineError::InvalidInput(
                "an envelope series needs a category".to_string(),
            ));
        }
        let description = normalize_required_text(&cmd.description, "description")?;
        let dates = schedule::series_dates(cmd.start_date);
        for date in &dates {
            self.ensure_period_open(db, &cmd.owner, *date).await?;
        }

        let mut template = Transaction::new(
            cmd.owner,
            cmd.account_id,
            cmd.kind,
            cmd.amount_minor,
            cmd.start_date,
            description,
            TransactionStatus::Pending,
        );
        template.role = TransactionRole::Template;
        template.is_fixed = true;
        template.series_envelope = cmd.is_envelope;
        template.category_id = cmd.category_id;
        template.idempotency_key = cmd.idempotency_key;
        transactions::ActiveModel::from(&template).insert(db).await?;

        let instance_ids = self
            .insert_children(db, &template, &dates, cmd.first_instance_status)
            .await?;
        tracing::debug!(
            template_id = %template.id,
            instances = instance_ids.len(),
            envelope = template.series_envelope,
            "recurring series created"
        );

        Ok(RecurringSeriesCreated {
            template_id: template.id,
            instances_created: instance_ids.len() as u32,
            instance_ids,
        })
    }

    async fn extend_series_in(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        template_id: Uuid,
        today: NaiveDate,
    ) -> ResultEngine<RecurringSeriesCreated> {
        let template = self.require_transaction(db, owner, template_id).await?;
        if !template.is_template() {
            return Err(EngineError::InvalidInput(
                "not a recurring template".to_string(),
            ));
        }
        if !template.is_fixed {
            return Err(EngineError::InvalidInput(
                "the series has been retired".to_string(),
            ));
        }
        self.lock_account(db, owner, template.account_id).await?;

        let last = self
            .children_of(db, template_id)
            .await?
            .last()
            .map(|child| child.date);
        let dates = match last {
            Some(last) => {
                schedule::extension_dates(schedule::series_day(template.date), last, today)
            }
            None => schedule::series_dates(template.date),
        };
        for date in &dates {
            self.ensure_period_open(db, owner, *date).await?;
        }
        let instance_ids = self
            .insert_children(db, &template, &dates, TransactionStatus::Pending)
            .await?;

        Ok(RecurringSeriesCreated {
            template_id,
            instances_created: instance_ids.len() as u32,
            instance_ids,
        })
    }

    /// Inserts one child per date; the first takes `first_status`.
    async fn insert_children(
        &self,
        db: &DatabaseTransaction,
        template: &Transaction,
        dates: &[NaiveDate],
        first_status: TransactionStatus,
    ) -> ResultEngine<Vec<Uuid>> {
        let role = if template.series_envelope {
            TransactionRole::Provision
        } else {
            TransactionRole::Instance
        };
        let now = Utc::now();
        let mut ids = Vec::with_capacity(dates.len());
        for (index, date) in dates.iter().enumerate() {
            let status = if index == 0 {
                first_status
            } else {
                TransactionStatus::Pending
            };
            let child = Transaction {
                id: Uuid::new_v4(),
                date: *date,
                status,
                role,
                is_fixed: true,
                series_envelope: false,
                parent_id: Some(template.id),
                idempotency_key: None,
                created_at: now,
                updated_at: now,
                ..template.clone()
            };
            transactions::ActiveModel::from(&child).insert(db).await?;
            self.apply_row_change(db, None, Some(&child)).await?;
            ids.push(child.id);
        }
        Ok(ids)
    }
}
