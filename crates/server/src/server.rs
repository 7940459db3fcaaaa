use axum::{Router, routing::post};

use engine::SyncEngine;

use crate::api;

#[derive(Clone, Debug)]
pub struct ServerState {
    pub engine: SyncEngine,
}

pub fn router(engine: SyncEngine) -> Router {
    Router::new()
        .route("/api/{concept}/{operation}", post(api::call))
        .with_state(ServerState { engine })
}

pub async fn run_with_listener(
    engine: SyncEngine,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(engine)).await
}
