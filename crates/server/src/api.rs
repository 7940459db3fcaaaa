//! The single API endpoint, `POST /api/{concept}/{operation}`.
//!
//! Queries and a handful of session actions are answered by the concept
//! directly. Everything else enters the engine as `Requesting.request` with
//! `path = "/{concept}/{operation}"`, and the body's fields next to it.

use axum::{
    Json,
    extract::{Path, State},
};
use engine::{OperationKind, Record, Value, record};

use crate::{ServerError, server::ServerState};

/// Actions answered without going through the rule base.
const PASSTHROUGH: &[&str] = &[
    "Authentication.authenticate",
    "Authentication.logout",
    "Authentication.editUser",
    "Authentication.deleteUser",
];

enum Route {
    Query,
    Action,
    Request,
}

fn route(state: &ServerState, operation: &str) -> Result<Route, ServerError> {
    match state.engine.operation(operation) {
        Ok(spec) if spec.kind == OperationKind::Query => Ok(Route::Query),
        Ok(_) if PASSTHROUGH.contains(&operation) => Ok(Route::Action),
        Ok(_) => Ok(Route::Request),
        Err(err) => Err(err.into()),
    }
}

fn rejected(mut response: Record) -> Result<Json<Record>, ServerError> {
    match response.remove("error") {
        Some(Value::String(error)) => Err(ServerError::Rejected(error)),
        Some(error) => Err(ServerError::Rejected(error.to_string())),
        None => Ok(Json(response)),
    }
}

/// Handle every API call.
pub async fn call(
    State(state): State<ServerState>,
    Path((concept, operation)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Record>, ServerError> {
    let Value::Object(mut inputs) = body else {
        return Err(ServerError::Generic(
            "request body must be a JSON object".to_string(),
        ));
    };
    let name = format!("{concept}.{operation}");
    tracing::debug!("api call {name}");

    match route(&state, &name)? {
        Route::Query => {
            let rows = state.engine.query(&name, inputs).await?;
            Ok(Json(record! { "results" => rows }))
        }
        Route::Action => {
            let outcome = state.engine.perform(&name, inputs).await?;
            rejected(outcome.into_record())
        }
        Route::Request => {
            inputs.insert(
                "path".to_string(),
                Value::from(format!("/{concept}/{operation}")),
            );
            rejected(state.engine.request(inputs).await?)
        }
    }
}
