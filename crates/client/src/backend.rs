//! Transports to the authoritative ledger store.

use std::{sync::Arc, time::Duration};

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
use async_trait::async_trait;
use engine::{Engine, EngineError};
use reqwest::Url;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::error::{ClientError, Result};

/// Failure to obtain a reply at all. Business rejections arrive inside the
/// [`Reply`] instead.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unauthorized")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("request refused: {0}")]
    Refused(String),
    #[error("server error: {0}")]
    Server(String),
}

impl BackendError {
    /// Whether the outcome is unknown and the call may be replayed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Refused(_))
    }
}

pub type BackendResult<T> = std::result::Result<Reply<T>, BackendError>;

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn create_transaction(&self, req: TransactionNew) -> BackendResult<TransactionCreated>;
    async fn update_transaction(&self, req: TransactionUpdate)
    -> BackendResult<TransactionUpdated>;
    async fn delete_transaction(&self, req: TransactionDelete) -> BackendResult<Deleted>;
    async fn create_transfer(&self, req: TransferNew) -> BackendResult<TransferCreated>;
    async fn update_transfer(&self, req: TransferUpdate) -> BackendResult<TransferUpdated>;
    async fn create_recurring_series(
        &self,
        req: RecurringSeriesNew,
    ) -> BackendResult<RecurringSeriesCreated>;
    async fn get_account(&self, req: AccountGet) -> BackendResult<AccountView>;
}

/// JSON over HTTP with basic auth against the `server` crate.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    http: reqwest::Client,
    username: String,
    password: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ClientError::InvalidInput(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    async fn post<Req, Resp>(&self, path: &str, payload: &Req) -> BackendResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|err| BackendError::Refused(format!("invalid endpoint {path}: {err}")))?;

        let res = self
            .http
            .post(endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(payload)
            .send()
            .await?;

        if res.status().is_success() {
            return Ok(res.json::<Reply<Resp>>().await?);
        }

        let status = res.status();
        let reason = res
            .json::<Reply<serde_json::Value>>()
            .await
            .ok()
            .and_then(|reply| reply.reason)
            .unwrap_or_else(|| status.to_string());

        let err = match status.as_u16() {
            401 => BackendError::Unauthorized,
            409 => BackendError::Conflict(reason),
            400 | 422 => BackendError::Refused(reason),
            _ => BackendError::Server(reason),
        };
        Err(err)
    }
}

#[async_trait]
impl LedgerBackend for HttpBackend {
    async fn create_transaction(&self, req: TransactionNew) -> BackendResult<TransactionCreated> {
        self.post("transactions/create", &req).await
    }

    async fn update_transaction(
        &self,
        req: TransactionUpdate,
    ) -> BackendResult<TransactionUpdated> {
        self.post("transactions/update", &req).await
    }

    async fn delete_transaction(&self, req: TransactionDelete) -> BackendResult<Deleted> {
        self.post("transactions/delete", &req).await
    }

    async fn create_transfer(&self, req: TransferNew) -> BackendResult<TransferCreated> {
        self.post("transfers/create", &req).await
    }

    async fn update_transfer(&self, req: TransferUpdate) -> BackendResult<TransferUpdated> {
        self.post("transfers/update", &req).await
    }

    async fn create_recurring_series(
        &self,
        req: RecurringSeriesNew,
    ) -> BackendResult<RecurringSeriesCreated> {
        self.post("recurring/create", &req).await
    }

    async fn get_account(&self, req: AccountGet) -> BackendResult<AccountView> {
        self.post("accounts/get", &req).await
    }
}

/// Calls an in-process [`Engine`] on behalf of `owner`.
#[derive(Clone)]
pub struct LocalBackend {
    engine: Arc<Engine>,
    owner: String,
}

impl LocalBackend {
    pub fn new(engine: Arc<Engine>, owner: &str) -> Self {
        Self {
            engine,
            owner: owner.to_string(),
        }
    }
}

fn engine_failure(err: EngineError) -> BackendError {
    match err {
        EngineError::Conflict(reason) => BackendError::Conflict(reason),
        other => BackendError::Server(other.to_string()),
    }
}

#[async_trait]
impl LedgerBackend for LocalBackend {
    async fn create_transaction(&self, req: TransactionNew) -> BackendResult<TransactionCreated> {
        self.engine
            .handle_create_transaction(&self.owner, req)
            .await
            .map_err(engine_failure)
    }

    async fn update_transaction(
        &self,
        req: TransactionUpdate,
    ) -> BackendResult<TransactionUpdated> {
        self.engine
            .handle_update_transaction(&self.owner, req)
            .await
            .map_err(engine_failure)
    }

    async fn delete_transaction(&self, req: TransactionDelete) -> BackendResult<Deleted> {
        self.engine
            .handle_delete_transaction(&self.owner, req)
            .await
            .map_err(engine_failure)
    }

    async fn create_transfer(&self, req: TransferNew) -> BackendResult<TransferCreated> {
        self.engine
            .handle_create_transfer(&self.owner, req)
            .await
            .map_err(engine_failure)
    }

    async fn update_transfer(&self, req: TransferUpdate) -> BackendResult<TransferUpdated> {
        self.engine
            .handle_update_transfer(&self.owner, req)
            .await
            .map_err(engine_failure)
    }

    async fn create_recurring_series(
        &self,
        req: RecurringSeriesNew,
    ) -> BackendResult<RecurringSeriesCreated> {
        self.engine
            .handle_create_recurring_series(&self.owner, req)
            .await
            .map_err(engine_failure)
    }

    async fn get_account(&self, req: AccountGet) -> BackendResult<AccountView> {
        self.engine
            .handle_get_account(&self.owner, req)
            .await
            .map_err(engine_failure)
    }
}
