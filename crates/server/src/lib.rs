use api_types::reply::{Reply, ResultCode};
use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

pub use server::{router, run_with_listener};

mod accounts;
mod ledger;
mod recurring;
mod server;
mod user;

/// Failures that escape the reply envelope.
///
/// Business rejections travel inside a `200` [`Reply`]; only a consistency
/// conflict or a database fault reaches this type.
#[derive(Debug)]
pub struct ServerError(EngineError);

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for_engine_error(&self.0);
        let code = self.0.code().unwrap_or(ResultCode::InternalError);
        let reply = Reply::<()>::rejected(code, message_for_engine_error(self.0));
        (status, Json(reply)).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self(value)
    }
}
