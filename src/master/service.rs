//! HTTP surface of the shardmaster.

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::post, Router};
use tower_http::trace::TraceLayer;

use super::Shardmaster;
use crate::error::StoreError;
use crate::protocol::{Empty, JoinRequest, LeaveRequest, MoveRequest, QueryResponse};

pub fn master_router(master: Arc<Shardmaster>) -> Router {
    Router::new()
        .route("/shardmaster/join", post(join))
        .route("/shardmaster/leave", post(leave))
        .route("/shardmaster/move", post(move_shard))
        .route("/shardmaster/query", post(query))
        .layer(TraceLayer::new_for_http())
        .with_state(master)
}

async fn join(
    State(master): State<Arc<Shardmaster>>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<Empty>, StoreError> {
    master.join(&req.server)?;
    Ok(Json(Empty {}))
}

async fn leave(
    State(master): State<Arc<Shardmaster>>,
    Json(req): Json<LeaveRequest>,
) -> Result<Json<Empty>, StoreError> {
    master.leave(&req.servers)?;
    Ok(Json(Empty {}))
}

async fn move_shard(
    State(master): State<Arc<Shardmaster>>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Empty>, StoreError> {
    master.move_shard(&req.server, req.shard)?;
    Ok(Json(Empty {}))
}

async fn query(State(master): State<Arc<Shardmaster>>) -> Result<Json<QueryResponse>, StoreError> {
    Ok(Json(QueryResponse {
        config: master.query(),
    }))
}
