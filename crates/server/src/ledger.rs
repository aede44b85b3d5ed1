//! Transaction and transfer endpoints.
//!
//! Each handler forwards the payload to the matching engine procedure and
//! returns its reply envelope as is.

use api_types::{
    reply::Reply,
    transaction::{
        Deleted, TransactionCreated, TransactionDelete, TransactionNew, TransactionUpdate,
        TransactionUpdated,
    },
    transfer::{TransferCreated, TransferNew, TransferUpdate, TransferUpdated},
};
use axum::{Extension, Json, extract::State};

use crate::{ServerError, server::ServerState, user::AuthUser};

pub async fn create_transaction(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<TransactionNew>,
) -> Result<Json<Reply<TransactionCreated>>, ServerError> {
    let reply = state
        .engine
        .handle_create_transaction(&user.username, payload)
        .await?;
    Ok(Json(reply))
}

pub async fn update_transaction(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<TransactionUpdate>,
) -> Result<Json<Reply<TransactionUpdated>>, ServerError> {
    let reply = state
        .engine
        .handle_update_transaction(&user.username, payload)
        .await?;
    Ok(Json(reply))
}

/// Deletes a row, a transfer pair or part of a recurring series.
pub async fn delete_transaction(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<TransactionDelete>,
) -> Result<Json<Reply<Deleted>>, ServerError> {
    let reply = state
        .engine
        .handle_delete_transaction(&user.username, payload)
        .await?;
    Ok(Json(reply))
}

pub async fn create_transfer(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<TransferNew>,
) -> Result<Json<Reply<TransferCreated>>, ServerError> {
    let reply = state
        .engine
        .handle_create_transfer(&user.username, payload)
        .await?;
    Ok(Json(reply))
}

pub async fn update_transfer(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<TransferUpdate>,
) -> Result<Json<Reply<TransferUpdated>>, ServerError> {
    let reply = state
        .engine
        .handle_update_transfer(&user.username, payload)
        .await?;
    Ok(Json(reply))
}
