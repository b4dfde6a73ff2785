pub mod api;
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod master;
pub mod protocol;
pub mod shard;
pub mod store;
pub mod transport;

pub use api::{kv_router, KvService};
pub use error::{StoreError, StoreResult};
pub use manager::{monitor::ViewMonitor, ShardManager, View};
pub use master::{service::master_router, Shardmaster};
pub use shard::{Overlap, Shard};
pub use store::StorageNode;
pub use transport::{HttpTransport, Transport};
