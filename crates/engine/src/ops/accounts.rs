use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use uuid::Uuid;

use crate::{
    Account, AccountKind, EngineError, ResultEngine, Transaction, TransactionRole, accounts,
    categories, transactions, users,
};

use super::{Engine, normalize_required_text};

impl Engine {
    /// Registers an identity for the authorization gate.
    pub async fn create_user(&self, username: &str, password: &str) -> ResultEngine<()> {
        let username = normalize_required_text(username, "username")?;
        let db_tx = self.database.begin().await?;
        if users::Entity::find_by_id(username.clone())
            .one(&db_tx)
            .await?
            .is_some()
        {
            return Err(EngineError::ExistingKey(username));
        }
        users::ActiveModel {
            username: ActiveValue::Set(username),
            password: ActiveValue::Set(password.to_string()),
        }
        .insert(&db_tx)
        .await?;
        db_tx.commit().await?;
        Ok(())
    }

    /// Checks a username/password pair for the authorization gate.
    pub async fn authenticate(&self, username: &str, password: &str) -> ResultEngine<bool> {
        let user = users::Entity::find_by_id(username.to_string())
            .one(&self.database)
            .await?;
        Ok(user.is_some_and(|user| user.password == password))
    }

    pub(super) async fn require_user(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<()> {
        let exists = users::Entity::find_by_id(username.to_string())
            .one(db)
            .await?
            .is_some();
        if !exists {
            return Err(EngineError::KeyNotFound("user not exists".to_string()));
        }
        Ok(())
    }

    pub async fn create_account(
        &self,
        owner: &str,
        name: &str,
        kind: AccountKind,
        credit_limit_minor: Option<i64>,
    ) -> ResultEngine<Uuid> {
        let name = normalize_required_text(name, "account name")?;
        let account = Account::new(owner.to_string(), name, kind, credit_limit_minor)?;
        let db_tx = self.database.begin().await?;
        self.require_user(&db_tx, owner).await?;
        let duplicate = accounts::Entity::find()
            .filter(accounts::Column::OwnerId.eq(owner.to_string()))
            .filter(accounts::Column::Name.eq(account.name.clone()))
            .one(&db_tx)
            .await?;
        if duplicate.is_some() {
            return Err(EngineError::ExistingKey(account.name));
        }
        accounts::ActiveModel::from(&account).insert(&db_tx).await?;
        db_tx.commit().await?;
        Ok(account.id)
    }

    pub async fn create_category(&self, owner: &str, name: &str) -> ResultEngine<Uuid> {
        let name = normalize_required_text(name, "category name")?;
        let db_tx = self.database.begin().await?;
        self.require_user(&db_tx, owner).await?;
        let duplicate = categories::Entity::find()
            .filter(categories::Column::OwnerId.eq(owner.to_string()))
            .filter(categories::Column::Name.eq(name.clone()))
            .one(&db_tx)
            .await?;
        if duplicate.is_some() {
            return Err(EngineError::ExistingKey(name));
        }
        let id = Uuid::new_v4();
        categories::ActiveModel {
            id: ActiveValue::Set(id.to_string()),
            owner_id: ActiveValue::Set(owner.to_string()),
            name: ActiveValue::Set(name),
        }
        .insert(&db_tx)
        .await?;
        db_tx.commit().await?;
        Ok(id)
    }

    pub async fn account(&self, owner: &str, account_id: Uuid) -> ResultEngine<Account> {
        let db_tx = self.database.begin().await?;
        let account = self.require_account(&db_tx, owner, account_id).await?;
        db_tx.commit().await?;
        Ok(account)
    }

    pub async fn transaction(&self, owner: &str, transaction_id: Uuid) -> ResultEngine<Transaction> {
        let db_tx = self.database.begin().await?;
        let tx = self
            .require_transaction(&db_tx, owner, transaction_id)
            .await?;
        db_tx.commit().await?;
        Ok(tx)
    }

    /// Spendable rows of an account, newest first. Templates are excluded.
    pub async fn list_account_transactions(
        &self,
        owner: &str,
        account_id: Uuid,
        limit: u64,
    ) -> ResultEngine<Vec<Transaction>> {
        let db_tx = self.database.begin().await?;
        self.require_account(&db_tx, owner, account_id).await?;
        let models = transactions::Entity::find()
            .filter(transactions::Column::AccountId.eq(account_id.to_string()))
            .filter(transactions::Column::Role.ne(TransactionRole::Template.as_str()))
            .order_by_desc(transactions::Column::Date)
            .order_by_desc(transactions::Column::CreatedAt)
            .limit(limit)
            .all(&db_tx)
            .await?;
        db_tx.commit().await?;
        models.into_iter().map(Transaction::try_from).collect()
    }

    /// Children of a recurring template in date order.
    pub async fn series_children(
        &self,
        owner: &str,
        template_id: Uuid,
    ) -> ResultEngine<Vec<Transaction>> {
        let db_tx = self.database.begin().await?;
        let template = self.require_transaction(&db_tx, owner, template_id).await?;
        if !template.is_template() {
            return Err(EngineError::InvalidInput(
                "not a recurring template".to_string(),
            ));
        }
        let children = self.children_of(&db_tx, template_id).await?;
        db_tx.commit().await?;
        Ok(children)
    }

    pub(super) async fn children_of(
        &self,
        db: &DatabaseTransaction,
        template_id: Uuid,
    ) -> ResultEngine<Vec<Transaction>> {
        transactions::Entity::find()
            .filter(transactions::Column::ParentId.eq(template_id.to_string()))
            .order_by_asc(transactions::Column::Date)
            .all(db)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    /// Rebuilds the stored balance of an account from its completed history.
    pub async fn recompute_account_balance(
        &self,
        owner: &str,
        account_id: Uuid,
    ) -> ResultEngine<i64> {
        let owner = owner.to_string();
        self.with_tx(move |engine, db_tx| {
            Box::pin(async move {
                engine.lock_account(db_tx, &owner, account_id).await?;
                engine.recompute_balance_in(db_tx, account_id).await
            })
        })
        .await
    }
}
