//! Wire handlers: `api_types` requests in, [`Reply`] envelopes out.
//!
//! Used by the HTTP server and by in-process clients. Business rejections are
//! folded into the reply; conflicts and storage faults stay `Err`.

use api_types::{
    account::{AccountGet, AccountView},
    recurring::{RecurringSeriesCreated, RecurringSeriesNew},
    reply::Reply,
    transaction::{
        Deleted, TransactionCreated, TransactionDelete, TransactionNew, TransactionUpdate,
        TransactionUpdated,
    },
    transfer::{TransferCreated, TransferNew, TransferUpdate, TransferUpdated},
};

use crate::{
    DeleteTransactionCmd, Engine, NewTransactionCmd, Outcome, Period, RecurringSeriesCmd,
    ResultEngine, TransferCmd, UpdateTransactionCmd, UpdateTransferCmd,
};

fn reply<T>(outcome: ResultEngine<Outcome<T>>) -> ResultEngine<Reply<T>> {
    outcome.map(Outcome::into_reply)
}

impl Engine {
    pub async fn handle_create_transaction(
        &self,
        owner: &str,
        req: TransactionNew,
    ) -> ResultEngine<Reply<TransactionCreated>> {
        let invoice_period = match req.invoice_period.as_deref().map(str::parse::<Period>) {
            Some(Err(err)) => return reply(Outcome::from_result(Err(err))),
            Some(Ok(period)) => Some(period),
            None => None,
        };
        let cmd = NewTransactionCmd {
            owner: owner.to_string(),
            account_id: req.account_id,
            kind: req.kind.into(),
            amount_minor: req.amount_minor,
            date: req.date,
            description: req.description,
            category_id: req.category_id,
            status: req.status.into(),
            invoice_period,
            idempotency_key: req.idempotency_key,
        };
        reply(self.create_transaction(cmd).await)
    }

    pub async fn handle_update_transaction(
        &self,
        owner: &str,
        req: TransactionUpdate,
    ) -> ResultEngine<Reply<TransactionUpdated>> {
        let cmd = UpdateTransactionCmd {
            owner: owner.to_string(),
            transaction_id: req.transaction_id,
            description: req.description,
            amount_minor: req.amount_minor,
            date: req.date,
            category_id: req.category_id,
            status: req.status.map(Into::into),
        };
        reply(self.update_transaction(cmd).await)
    }

    pub async fn handle_delete_transaction(
        &self,
        owner: &str,
        req: TransactionDelete,
    ) -> ResultEngine<Reply<Deleted>> {
        let cmd = DeleteTransactionCmd::new(owner, req.transaction_id).scope(req.scope);
        reply(self.delete_transaction(cmd).await)
    }

    pub async fn handle_create_transfer(
        &self,
        owner: &str,
        req: TransferNew,
    ) -> ResultEngine<Reply<TransferCreated>> {
        let cmd = TransferCmd {
            owner: owner.to_string(),
            from_account_id: req.from_account_id,
            to_account_id: req.to_account_id,
            amount_minor: req.amount_minor,
            date: req.date,
            outgoing_description: req.outgoing_description,
            incoming_description: req.incoming_description,
            status: req.status.into(),
            idempotency_key: req.idempotency_key,
        };
        reply(self.create_transfer(cmd).await)
    }

    pub async fn handle_update_transfer(
        &self,
        owner: &str,
        req: TransferUpdate,
    ) -> ResultEngine<Reply<TransferUpdated>> {
        let cmd = UpdateTransferCmd {
            owner: owner.to_string(),
            transaction_id: req.transaction_id,
            amount_minor: req.amount_minor,
            date: req.date,
            description: req.description,
        };
        reply(self.update_transfer(cmd).await)
    }

    pub async fn handle_create_recurring_series(
        &self,
        owner: &str,
        req: RecurringSeriesNew,
    ) -> ResultEngine<Reply<RecurringSeriesCreated>> {
        let cmd = RecurringSeriesCmd {
            owner: owner.to_string(),
            account_id: req.account_id,
            kind: req.kind.into(),
            amount_minor: req.amount_minor,
            start_date: req.start_date,
            description: req.description,
            category_id: req.category_id,
            first_instance_status: req.first_instance_status.into(),
            is_envelope: req.is_envelope,
            idempotency_key: req.idempotency_key,
        };
        reply(self.create_recurring_series(cmd).await)
    }

    pub async fn handle_get_account(
        &self,
        owner: &str,
        req: AccountGet,
    ) -> ResultEngine<Reply<AccountView>> {
        let result = self
            .account(owner, req.account_id)
            .await
            .map(|account| AccountView::from(&account));
        reply(Outcome::from_result(result))
    }

    pub async fn handle_recompute_account(
        &self,
        owner: &str,
        req: AccountGet,
    ) -> ResultEngine<Reply<AccountView>> {
        let result = match self.recompute_account_balance(owner, req.account_id).await {
            Ok(_) => self
                .account(owner, req.account_id)
                .await
                .map(|account| AccountView::from(&account)),
            Err(err) => Err(err),
        };
        reply(Outcome::from_result(result))
    }
}
