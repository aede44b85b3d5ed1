use api_types::{
    recurring::{RecurringSeriesCreated, RecurringSeriesNew},
    reply::Reply,
};
use axum::{Extension, Json, extract::State};

use crate::{ServerError, server::ServerState, user::AuthUser};

pub async fn create_series(
    Extension(user): Extension<AuthUser>,
    State(state): State<ServerState>,
    Json(payload): Json<RecurringSeriesNew>,
) -> Result<Json<Reply<RecurringSeriesCreated>>, ServerError> {
    let reply = state
        .engine
        .handle_create_recurring_series(&user.username, payload)
        .await?;
    Ok(Json(reply))
}
