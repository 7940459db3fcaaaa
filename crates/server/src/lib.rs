use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::SyncError;

use serde::Serialize;
pub use server::{ServerState, router, run_with_listener};

mod api;
mod server;

pub enum ServerError {
    Sync(SyncError),
    /// `error` payload returned by a concept or a rule.
    Rejected(String),
    Generic(String),
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_sync_error(err: &SyncError) -> StatusCode {
    match err {
        SyncError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        SyncError::UnknownConcept(_) | SyncError::NoSuchOperation(_) => StatusCode::NOT_FOUND,
        SyncError::Query { .. } => StatusCode::BAD_REQUEST,
        SyncError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_sync_error(err: SyncError) -> String {
    match err {
        SyncError::Query { source, .. } => source.to_string(),
        err @ (SyncError::Timeout
        | SyncError::UnknownConcept(_)
        | SyncError::NoSuchOperation(_)
        | SyncError::Unavailable(_)) => err.to_string(),
        other => {
            tracing::error!("sync error: {other}");
            "internal server error".to_string()
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Sync(err) => (status_for_sync_error(&err), message_for_sync_error(err)),
            ServerError::Rejected(err) | ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<SyncError> for ServerError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

#[cfg(test)]
mod tests {
    use engine::QueryError;

    use super::*;

    #[test]
    fn timeout_maps_to_504() {
        let res = ServerError::from(SyncError::Timeout).into_response();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn unknown_concept_maps_to_404() {
        let res = ServerError::from(SyncError::UnknownConcept("Wallet".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn failed_query_maps_to_400() {
        let err = SyncError::Query {
            operation: "Debt._getDebt".to_string(),
            source: QueryError::new("userA is required."),
        };
        assert_eq!(ServerError::from(err).into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unanswered_maps_to_500() {
        let res = ServerError::from(SyncError::Unanswered).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejected_maps_to_400() {
        let res = ServerError::Rejected("Invalid password.".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
