//! Ownership gate.
//!
//! A missing row is `not-found`; a row owned by someone else is `not-owned`.
//! Both are checked before any other validation.

use std::collections::BTreeSet;

use sea_orm::{DatabaseTransaction, QueryFilter, QuerySelect, prelude::*};
use uuid::Uuid;

use crate::{
    Account, EngineError, ResultEngine, Transaction, accounts, categories, transactions,
};

use super::Engine;

/// Generates a `require_*` lookup that enforces ownership.
macro_rules! impl_owned_lookup {
    ($fn_name:ident, $entity:path, $model:ty, $label:literal) => {
        pub(super) async fn $fn_name(
            &self,
            db: &DatabaseTransaction,
            owner: &str,
            id: Uuid,
        ) -> ResultEngine<$model> {
            let model = <$entity>::find_by_id(id.to_string())
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(concat!($label, " not exists").to_string()))?;
            if model.owner_id != owner {
                return Err(EngineError::NotOwned(concat!($label, " not owned").to_string()));
            }
            Ok(model)
        }
    };
}

impl Engine {
    impl_owned_lookup!(
        require_account_model,
        accounts::Entity,
        accounts::Model,
        "account"
    );

    impl_owned_lookup!(
        require_category_model,
        categories::Entity,
        categories::Model,
        "category"
    );

    impl_owned_lookup!(
        require_transaction_model,
        transactions::Entity,
        transactions::Model,
        "transaction"
    );

    pub(super) async fn require_account(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        account_id: Uuid,
    ) -> ResultEngine<Account> {
        Account::try_from(self.require_account_model(db, owner, account_id).await?)
    }

    pub(super) async fn require_category(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        category_id: Option<Uuid>,
    ) -> ResultEngine<()> {
        if let Some(id) = category_id {
            self.require_category_model(db, owner, id).await?;
        }
        Ok(())
    }

    pub(super) async fn require_transaction(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        Transaction::try_from(
            self.require_transaction_model(db, owner, transaction_id)
                .await?,
        )
    }

    /// Locks the given accounts in ascending id order and checks ownership.
    ///
    /// The ordering keeps two writers touching the same pair of accounts from
    /// deadlocking. SQLite has no row locks; its single writer gives the same
    /// serialization.
    pub(super) async fn lock_accounts(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        account_ids: &[Uuid],
    ) -> ResultEngine<Vec<Account>> {
        let ordered: BTreeSet<Uuid> = account_ids.iter().copied().collect();
        let mut locked = Vec::with_capacity(ordered.len());
        for id in ordered {
            let model = accounts::Entity::find_by_id(id.to_string())
                .lock_exclusive()
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))?;
            if model.owner_id != owner {
                return Err(EngineError::NotOwned("account not owned".to_string()));
            }
            locked.push(Account::try_from(model)?);
        }
        Ok(locked)
    }

    pub(super) async fn lock_account(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        account_id: Uuid,
    ) -> ResultEngine<Account> {
        self.lock_accounts(db, owner, &[account_id])
            .await?
            .pop()
            .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))
    }

    /// The paired leg of a transfer. A leg whose pair is gone is a
    /// [`EngineError::Conflict`].
    pub(super) async fn require_pair(
        &self,
        db: &DatabaseTransaction,
        leg: &Transaction,
    ) -> ResultEngine<Transaction> {
        let missing = || EngineError::Conflict(format!("transfer leg {} has no pair", leg.id));
        let pair_id = leg.linked_transaction_id.ok_or_else(missing)?;
        let model = transactions::Entity::find_by_id(pair_id.to_string())
            .one(db)
            .await?
            .ok_or_else(missing)?;
        if model.owner_id != leg.owner_id {
            return Err(EngineError::NotOwned("transaction not owned".to_string()));
        }
        Transaction::try_from(model)
    }

    pub(super) async fn find_by_idempotency_key(
        &self,
        db: &DatabaseTransaction,
        owner: &str,
        key: &str,
    ) -> ResultEngine<Option<Transaction>> {
        transactions::Entity::find()
            .filter(transactions::Column::OwnerId.eq(owner.to_string()))
            .filter(transactions::Column::IdempotencyKey.eq(key.to_string()))
            .one(db)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }
}
