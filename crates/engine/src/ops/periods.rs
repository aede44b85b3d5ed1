use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveValue, DatabaseTransaction, TransactionTrait, prelude::*};

use crate::{EngineError, Period, ResultEngine, locked_periods};

use super::Engine;

impl Engine {
    /// Closes `period` for `owner`: any later write dated inside it is
    /// rejected with `locked-period`. Locking twice is a no-op.
    pub async fn lock_period(&self, owner: &str, period: Period) -> ResultEngine<()> {
        let db_tx = self.database.begin().await?;
        self.require_user(&db_tx, owner).await?;
        let existing = locked_periods::Entity::find_by_id((owner.to_string(), period.to_string()))
            .one(&db_tx)
            .await?;
        if existing.is_none() {
            locked_periods::ActiveModel {
                owner_id: ActiveValue::Set(owner.to_string()),
                period: ActiveValue::Set(period.to_string()),
                locked_at: ActiveValue::Set(Utc::now()),
            }
            .insert(&db_tx)
            .await?;
            tracing::info!(owner, %period, "period locked");
        }
        db_tx.commit().await?;
        Ok(())
    }

    pub async fn unlock_period(&self, owner: &str, period: Period) -> ResultEngine<()> {
        let result = locked_periods::Entity::delete_by_id((owner.to_string(), period.to_string()))
            .exec(&self.database)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::KeyNotFound(format!("period {period} not locked")));
        }
        tracing::info!(owner, %period, "period unlocked");
        Ok(())
    }

    pub(super) async fn ensure_period_open(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        date: NaiveDate,
    ) -> ResultEngine<()> {
        let period = Period::from_date(date);
        let locked = locked_periods::Entity::find_by_id((owner.to_string(), period.to_string()))
            .one(db)
            .await?
            .is_some();
        if locked {
            return Err(EngineError::LockedPeriod(format!("period {period} is closed")));
        }
        Ok(())
    }
}
