use std::collections::BTreeSet;

use api_types::transaction::Deleted;
use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    DeleteTransactionCmd, Outcome, ResultEngine, Transaction, TransactionRole, reactor,
    series::{TemplateAction, plan_deletion},
    transactions,
};

use super::Engine;

/// Rows to remove plus what happens to the series template, if any.
struct Removal {
    rows: Vec<Transaction>,
    template: Option<(Transaction, TemplateAction)>,
}

impl Engine {
    /// Deletes a row with the breadth given by `scope`.
    ///
    /// A transfer leg always takes its pair along. Completed series children
    /// survive series-wide scopes. Every touched account is recomputed from
    /// history afterwards.
    pub async fn delete_transaction(
        &self,
        cmd: DeleteTransactionCmd,
    ) -> ResultEngine<Outcome<Deleted>> {
        Outcome::from_result(
            self.with_tx(move |engine, db_tx| {
                Box::pin(async move { engine.delete_transaction_in(db_tx, cmd).await })
            })
            .await,
        )
    }

    async fn delete_transaction_in(
        &self,
        db: &DatabaseTransaction,
        cmd: DeleteTransactionCmd,
    ) -> ResultEngine<Deleted> {
        let target = self
            .require_transaction(db, &cmd.owner, cmd.transaction_id)
            .await?;
        let removal = self.plan_removal(db, target, &cmd).await?;

        for row in &removal.rows {
            self.ensure_period_open(db, &cmd.owner, row.date).await?;
        }
        let touched: BTreeSet<Uuid> = removal.rows.iter().map(|row| row.account_id).collect();
        let touched: Vec<Uuid> = touched.into_iter().collect();
        let mut effects = Vec::new();
        for row in &removal.rows {
            effects.extend(reactor::envelope_effects(Some(row), None)?);
        }
        self.lock_write_set(db, &cmd.owner, &touched, &effects)
            .await?;

        let ids: Vec<String> = removal.rows.iter().map(|row| row.id.to_string()).collect();
        let mut deleted_count = if ids.is_empty() {
            0
        } else {
            transactions::Entity::delete_many()
                .filter(transactions::Column::Id.is_in(ids))
                .exec(db)
                .await?
                .rows_affected
        };
        self.apply_envelope_deltas(db, &effects).await?;

        let mut notes = Vec::new();
        if let Some((template, action)) = removal.template {
            match action {
                TemplateAction::Keep => {}
                TemplateAction::Retire => {
                    transactions::ActiveModel {
                        id: ActiveValue::Set(template.id.to_string()),
                        is_fixed: ActiveValue::Set(false),
                        updated_at: ActiveValue::Set(Utc::now()),
                        ..Default::default()
                    }
                    .update(db)
                    .await?;
                    notes.push("series retired");
                }
                TemplateAction::Delete => {
                    deleted_count += transactions::Entity::delete_by_id(template.id.to_string())
                        .exec(db)
                        .await?
                        .rows_affected;
                    notes.push("series removed");
                }
            }
        }

        for account_id in touched {
            self.recompute_balance_in(db, account_id).await?;
        }

        let mut message = format!("deleted {deleted_count} transaction(s)");
        for note in notes {
            message.push_str("; ");
            message.push_str(note);
        }
        tracing::debug!(transaction_id = %cmd.transaction_id, scope = ?cmd.scope, %message);
        Ok(Deleted {
            deleted_count,
            message,
        })
    }

    async fn plan_removal(
        &self,
        db: &DatabaseTransaction,
        target: Transaction,
        cmd: &DeleteTransactionCmd,
    ) -> ResultEngine<Removal> {
        match target.role {
            TransactionRole::TransferLeg => {
                let pair = self.require_pair(db, &target).await?;
                Ok(Removal {
                    rows: vec![target, pair],
                    template: None,
                })
            }
            TransactionRole::Template => {
                let children = self.children_of(db, target.id).await?;
                let plan = plan_deletion(&children, None, cmd.scope);
                Ok(Removal {
                    rows: select(children, &plan.remove),
                    template: Some((target, plan.template)),
                })
            }
            TransactionRole::Ordinary | TransactionRole::Provision | TransactionRole::Instance => {
                let template = match target.parent_id {
                    Some(parent_id) => Some(
                        self.require_transaction(db, &cmd.owner, parent_id)
                            .await?,
                    ),
                    None => None,
                };
                let Some(template) = template else {
                    return Ok(Removal {
                        rows: vec![target],
                        template: None,
                    });
                };
                let children = self.children_of(db, template.id).await?;
                let plan = plan_deletion(&children, Some(&target), cmd.scope);
                Ok(Removal {
                    rows: select(children, &plan.remove),
                    template: Some((template, plan.template)),
                })
            }
        }
    }
}

fn select(rows: Vec<Transaction>, ids: &[Uuid]) -> Vec<Transaction> {
    rows.into_iter().filter(|row| ids.contains(&row.id)).collect()
}
