use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};

use std::sync::Arc;

use crate::{accounts, ledger, recurring, user::AuthUser};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
}

async fn auth(
    auth_header: TypedHeader<Authorization<Basic>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let known = state
        .engine
        .authenticate(auth_header.username(), auth_header.password())
        .await
        .map_err(|err| {
            tracing::error!("failed to authenticate user: {err}");
            StatusCode::UNAUTHORIZED
        })?;
    if !known {
        tracing::debug!(username = auth_header.username(), "rejected credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(AuthUser {
        username: auth_header.username().to_string(),
    });
    Ok(next.run(request).await)
}

/// Builds the HTTP surface over `engine`. Every route sits behind the auth gate.
pub fn router(engine: Arc<Engine>) -> Router {
    let state = ServerState { engine };
    Router::new()
        .route("/transactions/create", post(ledger::create_transaction))
        .route("/transactions/update", post(ledger::update_transaction))
        .route("/transactions/delete", post(ledger::delete_transaction))
        .route("/transfers/create", post(ledger::create_transfer))
        .route("/transfers/update", post(ledger::update_transfer))
        .route("/recurring/create", post(recurring::create_series))
        .route("/accounts/get", post(accounts::get))
        .route("/accounts/recompute", post(accounts::recompute))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .with_state(state)
}

pub async fn run_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(Arc::new(engine))).await
}
