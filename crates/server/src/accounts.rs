//! Account read endpoints.

use api_types::{
    account::{AccountGet, AccountView},
    reply::Reply,
};
use axum::{Extension, Json, extract::State};

use crate::{ServerError, server::ServerState, user::AuthUser};

pub async fn get(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<AccountGet>,
) -> Result<Json<Reply<AccountView>>, ServerError> {
    let reply = state
        .engine
        .handle_get_account(&user.username, payload)
        .await?;
    Ok(Json(reply))
}

/// Rebuilds the stored balance from history, then returns the account.
pub async fn recompute(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<AccountGet>,
) -> Result<Json<Reply<AccountView>>, ServerError> {
    tracing::info!(account_id = %payload.account_id, "recomputing account balance");
    let reply = state
        .engine
        .handle_recompute_account(&user.username, payload)
        .await?;
    Ok(Json(reply))
}
