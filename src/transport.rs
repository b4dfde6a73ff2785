//! Remote calls between components.
//!
//! Everything that crosses a process boundary goes through [`Transport`], so
//! the coordination logic can be exercised in tests with an in-memory
//! implementation while production wiring uses HTTP.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::protocol::{
    AppendRequest, ConfigEntry, DeleteRequest, DumpResponse, Empty, ErrorBody, GetRequest,
    GetResponse, JoinRequest, LeaveRequest, MoveRequest, PingRequest, PingResponse, PutRequest,
    QueryResponse,
};
use crate::shard::Shard;

/// Client view of the key-value service and the shardmaster service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, addr: &str, key: &str) -> StoreResult<String>;
    async fn put(&self, addr: &str, key: &str, data: &str, user: &str) -> StoreResult<()>;
    async fn append(&self, addr: &str, key: &str, data: &str) -> StoreResult<()>;
    async fn delete(&self, addr: &str, key: &str) -> StoreResult<()>;
    async fn dump(&self, addr: &str) -> StoreResult<BTreeMap<String, String>>;
    async fn ping(&self, addr: &str, server: &str, viewnumber: u64) -> StoreResult<PingResponse>;

    async fn join(&self, addr: &str, server: &str) -> StoreResult<()>;
    async fn leave(&self, addr: &str, servers: &[String]) -> StoreResult<()>;
    async fn move_shard(&self, addr: &str, server: &str, shard: Shard) -> StoreResult<()>;
    async fn query(&self, addr: &str) -> StoreResult<Vec<ConfigEntry>>;
}

/// HTTP/JSON transport used by the real deployment.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn call<Req, Resp>(&self, addr: &str, path: &str, req: &Req) -> StoreResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{addr}{path}");
        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| StoreError::NetworkError(e.to_string()))
        } else {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            Err(StoreError::RemoteError(body.error))
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, addr: &str, key: &str) -> StoreResult<String> {
        let resp: GetResponse = self
            .call(addr, "/kv/get", &GetRequest { key: key.to_string() })
            .await?;
        Ok(resp.data)
    }

    async fn put(&self, addr: &str, key: &str, data: &str, user: &str) -> StoreResult<()> {
        let req = PutRequest {
            key: key.to_string(),
            data: data.to_string(),
            user: user.to_string(),
        };
        let _: Empty = self.call(addr, "/kv/put", &req).await?;
        Ok(())
    }

    async fn append(&self, addr: &str, key: &str, data: &str) -> StoreResult<()> {
        let req = AppendRequest {
            key: key.to_string(),
            data: data.to_string(),
        };
        let _: Empty = self.call(addr, "/kv/append", &req).await?;
        Ok(())
    }

    async fn delete(&self, addr: &str, key: &str) -> StoreResult<()> {
        let req = DeleteRequest { key: key.to_string() };
        let _: Empty = self.call(addr, "/kv/delete", &req).await?;
        Ok(())
    }

    async fn dump(&self, addr: &str) -> StoreResult<BTreeMap<String, String>> {
        let resp: DumpResponse = self.call(addr, "/kv/dump", &Empty {}).await?;
        Ok(resp.database)
    }

    async fn ping(&self, addr: &str, server: &str, viewnumber: u64) -> StoreResult<PingResponse> {
        let req = PingRequest {
            server: server.to_string(),
            viewnumber,
        };
        self.call(addr, "/kv/ping", &req).await
    }

    async fn join(&self, addr: &str, server: &str) -> StoreResult<()> {
        let req = JoinRequest {
            server: server.to_string(),
        };
        let _: Empty = self.call(addr, "/shardmaster/join", &req).await?;
        Ok(())
    }

    async fn leave(&self, addr: &str, servers: &[String]) -> StoreResult<()> {
        let req = LeaveRequest {
            servers: servers.to_vec(),
        };
        let _: Empty = self.call(addr, "/shardmaster/leave", &req).await?;
        Ok(())
    }

    async fn move_shard(&self, addr: &str, server: &str, shard: Shard) -> StoreResult<()> {
        let req = MoveRequest {
            server: server.to_string(),
            shard,
        };
        let _: Empty = self.call(addr, "/shardmaster/move", &req).await?;
        Ok(())
    }

    async fn query(&self, addr: &str) -> StoreResult<Vec<ConfigEntry>> {
        let resp: QueryResponse = self.call(addr, "/shardmaster/query", &Empty {}).await?;
        Ok(resp.config)
    }
}
