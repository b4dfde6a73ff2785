//! The key-value service surface.
//!
//! Storage servers and the shardmanager answer the same six operations; the
//! manager forwards four of them to the current primary. Both implement
//! [`KvService`] and share one router.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, response::Json, routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::error::StoreResult;
use crate::protocol::{
    AppendRequest, DeleteRequest, DumpResponse, Empty, GetRequest, GetResponse, PingRequest,
    PingResponse, PutRequest,
};

#[async_trait]
pub trait KvService: Send + Sync + 'static {
    async fn get(&self, key: &str) -> StoreResult<String>;
    async fn put(&self, key: &str, data: &str, user: &str) -> StoreResult<()>;
    async fn append(&self, key: &str, data: &str) -> StoreResult<()>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    async fn dump(&self) -> StoreResult<BTreeMap<String, String>>;
    async fn ping(&self, server: &str, viewnumber: u64) -> StoreResult<PingResponse>;
}

pub fn kv_router<S: KvService>(service: Arc<S>) -> Router {
    Router::new()
        .route("/kv/get", post(get::<S>))
        .route("/kv/put", post(put::<S>))
        .route("/kv/append", post(append::<S>))
        .route("/kv/delete", post(delete::<S>))
        .route("/kv/dump", post(dump::<S>))
        .route("/kv/ping", post(ping::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn get<S: KvService>(
    State(service): State<Arc<S>>,
    Json(req): Json<GetRequest>,
) -> StoreResult<Json<GetResponse>> {
    let data = service.get(&req.key).await?;
    Ok(Json(GetResponse { data }))
}

async fn put<S: KvService>(
    State(service): State<Arc<S>>,
    Json(req): Json<PutRequest>,
) -> StoreResult<Json<Empty>> {
    service.put(&req.key, &req.data, &req.user).await?;
    Ok(Json(Empty {}))
}

async fn append<S: KvService>(
    State(service): State<Arc<S>>,
    Json(req): Json<AppendRequest>,
) -> StoreResult<Json<Empty>> {
    service.append(&req.key, &req.data).await?;
    Ok(Json(Empty {}))
}

async fn delete<S: KvService>(
    State(service): State<Arc<S>>,
    Json(req): Json<DeleteRequest>,
) -> StoreResult<Json<Empty>> {
    service.delete(&req.key).await?;
    Ok(Json(Empty {}))
}

async fn dump<S: KvService>(State(service): State<Arc<S>>) -> StoreResult<Json<DumpResponse>> {
    let database = service.dump().await?;
    Ok(Json(DumpResponse { database }))
}

async fn ping<S: KvService>(
    State(service): State<Arc<S>>,
    Json(req): Json<PingRequest>,
) -> StoreResult<Json<PingResponse>> {
    let resp = service.ping(&req.server, req.viewnumber).await?;
    Ok(Json(resp))
}
