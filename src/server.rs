//! Inbound HTTP surface: `POST /{alg}/message` and `GET /health` (spec §6).
//! Only the endpoint for the replica's configured algorithm is mounted;
//! hitting another variant's path 404s, matching a deployment where each
//! node binary is built for exactly one protocol. Grounded on
//! `internal/nodesvc/service.go::BuildMux`, restated with `axum`'s `Router`
//! instead of `http.ServeMux`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::engine::Replica;
use crate::types::ConsensusMessage;

pub fn router(replica: Arc<Replica>) -> Router {
    let message_path = format!("/{}/message", replica.alg().path_segment());
    Router::new()
        .route(&message_path, post(handle_message))
        .route("/health", get(health))
        .with_state(replica)
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_message(State(replica): State<Arc<Replica>>, Json(msg): Json<ConsensusMessage>) -> StatusCode {
    replica.deliver(msg);
    StatusCode::OK
}
