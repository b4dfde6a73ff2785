//! Common test utilities for cluster tests
//!
//! Provides an in-memory network: components register under an address and
//! every Transport call is routed to them directly, so whole-cluster
//! scenarios run deterministically without sockets. Addresses can be marked
//! down to simulate partitions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use feedstore::protocol::{ConfigEntry, PingResponse};
use feedstore::{KvService, Shard, Shardmaster, StoreError, StoreResult, Transport};

#[derive(Default)]
pub struct LocalNet {
    kv: RwLock<HashMap<String, Arc<dyn KvService>>>,
    masters: RwLock<HashMap<String, Arc<Shardmaster>>>,
    down: RwLock<HashSet<String>>,
}

impl LocalNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_kv(&self, addr: &str, service: Arc<dyn KvService>) {
        self.kv.write().insert(addr.to_string(), service);
    }

    pub fn register_master(&self, addr: &str, master: Arc<Shardmaster>) {
        self.masters.write().insert(addr.to_string(), master);
    }

    /// Simulate a network partition towards the given address.
    pub fn set_down(&self, addr: &str, down: bool) {
        if down {
            self.down.write().insert(addr.to_string());
        } else {
            self.down.write().remove(addr);
        }
    }

    fn kv_service(&self, addr: &str) -> StoreResult<Arc<dyn KvService>> {
        if self.down.read().contains(addr) {
            return Err(StoreError::NetworkError(format!("{addr} is down")));
        }
        self.kv
            .read()
            .get(addr)
            .cloned()
            .ok_or_else(|| StoreError::NetworkError(format!("no route to {addr}")))
    }

    fn master(&self, addr: &str) -> StoreResult<Arc<Shardmaster>> {
        if self.down.read().contains(addr) {
            return Err(StoreError::NetworkError(format!("{addr} is down")));
        }
        self.masters
            .read()
            .get(addr)
            .cloned()
            .ok_or_else(|| StoreError::NetworkError(format!("no route to {addr}")))
    }
}

#[async_trait]
impl Transport for LocalNet {
    async fn get(&self, addr: &str, key: &str) -> StoreResult<String> {
        let service = self.kv_service(addr)?;
        service.get(key).await
    }

    async fn put(&self, addr: &str, key: &str, data: &str, user: &str) -> StoreResult<()> {
        let service = self.kv_service(addr)?;
        service.put(key, data, user).await
    }

    async fn append(&self, addr: &str, key: &str, data: &str) -> StoreResult<()> {
        let service = self.kv_service(addr)?;
        service.append(key, data).await
    }

    async fn delete(&self, addr: &str, key: &str) -> StoreResult<()> {
        let service = self.kv_service(addr)?;
        service.delete(key).await
    }

    async fn dump(&self, addr: &str) -> StoreResult<BTreeMap<String, String>> {
        let service = self.kv_service(addr)?;
        service.dump().await
    }

    async fn ping(&self, addr: &str, server: &str, viewnumber: u64) -> StoreResult<PingResponse> {
        let service = self.kv_service(addr)?;
        service.ping(server, viewnumber).await
    }

    async fn join(&self, addr: &str, server: &str) -> StoreResult<()> {
        self.master(addr)?.join(server)
    }

    async fn leave(&self, addr: &str, servers: &[String]) -> StoreResult<()> {
        self.master(addr)?.leave(servers)
    }

    async fn move_shard(&self, addr: &str, server: &str, shard: Shard) -> StoreResult<()> {
        self.master(addr)?.move_shard(server, shard)
    }

    async fn query(&self, addr: &str) -> StoreResult<Vec<ConfigEntry>> {
        Ok(self.master(addr)?.query())
    }
}
