//! Shardmaster: the authoritative shard-range → server map.
//!
//! Servers here are shardmanager addresses; each manager fronts one
//! primary/backup replication group. Join and Leave rebalance the whole
//! key-id universe into contiguous near-equal runs; Move carves an
//! arbitrary interval out of whoever holds it and pins it to one server.

pub mod service;

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::info;

use crate::config::DEFAULT_KEY_SPACE;
use crate::error::{StoreError, StoreResult};
use crate::protocol::ConfigEntry;
use crate::shard::{sort_ascending, Shard};

pub struct Shardmaster {
    key_space: u64,
    inner: Mutex<MasterState>,
}

#[derive(Default)]
struct MasterState {
    /// Successful Join order; rebalancing hands out ranges in this order.
    servers: Vec<String>,
    shards: HashMap<String, Vec<Shard>>,
}

impl Shardmaster {
    pub fn new(key_space: u64) -> Self {
        Self {
            key_space,
            inner: Mutex::new(MasterState::default()),
        }
    }

    pub fn join(&self, server: &str) -> StoreResult<()> {
        let mut state = self.inner.lock();
        if state.shards.contains_key(server) {
            return Err(StoreError::DuplicateJoin);
        }
        state.servers.push(server.to_string());
        state.shards.insert(server.to_string(), Vec::new());
        self.rebalance(&mut state);
        info!(server, total = state.servers.len(), "server joined");
        Ok(())
    }

    pub fn leave(&self, servers: &[String]) -> StoreResult<()> {
        let mut state = self.inner.lock();
        // All-or-nothing: reject the whole request before touching anything.
        for server in servers {
            if !state.shards.contains_key(server) {
                return Err(StoreError::UnknownLeave);
            }
        }
        for server in servers {
            state.shards.remove(server);
            state.servers.retain(|s| s != server);
        }
        self.rebalance(&mut state);
        info!(leaving = servers.len(), remaining = state.servers.len(), "servers left");
        Ok(())
    }

    pub fn move_shard(&self, server: &str, shard: Shard) -> StoreResult<()> {
        let mut state = self.inner.lock();
        if !state.shards.contains_key(server) {
            return Err(StoreError::UnknownMove);
        }
        // Carve the interval out of every holder, then pin it to the target.
        for list in state.shards.values_mut() {
            *list = list.iter().flat_map(|s| s.subtract(&shard)).collect();
        }
        let target = state
            .shards
            .get_mut(server)
            .expect("target presence checked above");
        target.push(shard);
        sort_ascending(target);
        info!(server, lower = shard.lower, upper = shard.upper, "shard moved");
        Ok(())
    }

    pub fn query(&self) -> Vec<ConfigEntry> {
        let state = self.inner.lock();
        state
            .servers
            .iter()
            .map(|server| ConfigEntry {
                server: server.clone(),
                shards: state.shards.get(server).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// Partition `[0, key_space - 1]` into one contiguous run per server.
    ///
    /// Runs differ in size by at most one; the first `key_space % n` servers
    /// (in join order) take the larger size.
    fn rebalance(&self, state: &mut MasterState) {
        let n = state.servers.len() as u64;
        if n == 0 {
            return;
        }
        let base = self.key_space / n;
        let remainder = self.key_space % n;
        let mut next = 0u64;
        for (i, server) in state.servers.iter().enumerate() {
            let size = base + u64::from((i as u64) < remainder);
            let list = state.shards.get_mut(server).expect("joined server has a shard list");
            if size == 0 {
                list.clear();
            } else {
                *list = vec![Shard::new(next, next + size - 1)];
                next += size;
            }
        }
    }
}

impl Default for Shardmaster {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_SPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(config: &[ConfigEntry], key_space: u64) -> Vec<u32> {
        let mut counts = vec![0u32; key_space as usize];
        for entry in config {
            for shard in &entry.shards {
                for id in shard.lower..=shard.upper {
                    counts[id as usize] += 1;
                }
            }
        }
        counts
    }

    #[test]
    fn test_join_assigns_whole_key_space() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();

        let config = master.query();
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].server, "a");
        assert_eq!(config[0].shards, vec![Shard::new(0, 999)]);
    }

    #[test]
    fn test_duplicate_join_fails() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        assert_eq!(master.join("a"), Err(StoreError::DuplicateJoin));
        // Failed join leaves the configuration untouched.
        assert_eq!(master.query().len(), 1);
    }

    #[test]
    fn test_two_servers_split_evenly() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        master.join("b").unwrap();

        let config = master.query();
        assert_eq!(config[0].shards, vec![Shard::new(0, 499)]);
        assert_eq!(config[1].shards, vec![Shard::new(500, 999)]);
    }

    #[test]
    fn test_remainder_goes_to_earlier_servers() {
        let master = Shardmaster::new(1000);
        for s in ["a", "b", "c"] {
            master.join(s).unwrap();
        }

        let config = master.query();
        assert_eq!(config[0].shards, vec![Shard::new(0, 333)]); // 334 ids
        assert_eq!(config[1].shards, vec![Shard::new(334, 666)]); // 333 ids
        assert_eq!(config[2].shards, vec![Shard::new(667, 999)]); // 333 ids
    }

    #[test]
    fn test_rebalance_covers_every_id_exactly_once() {
        let master = Shardmaster::new(1000);
        for s in ["a", "b", "c", "d", "e", "f", "g"] {
            master.join(s).unwrap();
        }

        let config = master.query();
        assert!(coverage(&config, 1000).iter().all(|&c| c == 1));

        // Cardinalities differ by at most one id.
        let sizes: Vec<u64> = config
            .iter()
            .map(|e| e.shards.iter().map(Shard::len).sum())
            .collect();
        let min = sizes.iter().min().unwrap();
        let max = sizes.iter().max().unwrap();
        assert!(max - min <= 1, "uneven split: {sizes:?}");
    }

    #[test]
    fn test_query_preserves_join_order() {
        let master = Shardmaster::new(100);
        for s in ["zeta", "alpha", "mid"] {
            master.join(s).unwrap();
        }
        let servers: Vec<_> = master.query().into_iter().map(|e| e.server).collect();
        assert_eq!(servers, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_leave_rebalances_remaining() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        master.join("b").unwrap();
        master.leave(&["a".to_string()]).unwrap();

        let config = master.query();
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].server, "b");
        assert_eq!(config[0].shards, vec![Shard::new(0, 999)]);
    }

    #[test]
    fn test_leave_unknown_server_is_atomic() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        let err = master.leave(&["a".to_string(), "ghost".to_string()]);
        assert_eq!(err, Err(StoreError::UnknownLeave));
        // "a" must still be joined: the precondition check rejects the batch.
        assert_eq!(master.query().len(), 1);
    }

    #[test]
    fn test_leave_everyone_empties_coverage() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        master.leave(&["a".to_string()]).unwrap();
        assert!(master.query().is_empty());
    }

    #[test]
    fn test_move_carves_from_both_neighbours() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        master.join("b").unwrap();
        // Take the middle of the space, straddling both servers.
        master.move_shard("a", Shard::new(400, 599)).unwrap();

        let config = master.query();
        assert_eq!(
            config[0].shards,
            vec![Shard::new(0, 399), Shard::new(400, 599)]
        );
        assert_eq!(config[1].shards, vec![Shard::new(600, 999)]);
        assert!(coverage(&config, 1000).iter().all(|&c| c == 1));
    }

    #[test]
    fn test_move_interior_splits_holder() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        master.join("b").unwrap();
        // Interior of b's [500, 999].
        master.move_shard("a", Shard::new(600, 700)).unwrap();

        let config = master.query();
        assert_eq!(
            config[0].shards,
            vec![Shard::new(0, 499), Shard::new(600, 700)]
        );
        assert_eq!(
            config[1].shards,
            vec![Shard::new(500, 599), Shard::new(701, 999)]
        );
    }

    #[test]
    fn test_move_swallows_small_holder() {
        let master = Shardmaster::new(10);
        for s in ["a", "b", "c"] {
            master.join(s).unwrap();
        }
        // a=[0,3] b=[4,6] c=[7,9]; move everything to c.
        master.move_shard("c", Shard::new(0, 9)).unwrap();

        let config = master.query();
        assert!(config[0].shards.is_empty());
        assert!(config[1].shards.is_empty());
        assert_eq!(config[2].shards, vec![Shard::new(0, 9)]);
    }

    #[test]
    fn test_move_to_unknown_server_fails() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        let err = master.move_shard("ghost", Shard::new(0, 10));
        assert_eq!(err, Err(StoreError::UnknownMove));
    }

    #[test]
    fn test_move_keeps_target_list_sorted() {
        let master = Shardmaster::new(1000);
        master.join("a").unwrap();
        master.join("b").unwrap();
        master.move_shard("b", Shard::new(0, 99)).unwrap();

        let config = master.query();
        // b now holds [0,99] and [500,999], ascending.
        assert_eq!(
            config[1].shards,
            vec![Shard::new(0, 99), Shard::new(500, 999)]
        );
    }

    #[test]
    fn test_more_servers_than_ids() {
        let master = Shardmaster::new(2);
        for s in ["a", "b", "c"] {
            master.join(s).unwrap();
        }
        let config = master.query();
        assert_eq!(config[0].shards, vec![Shard::new(0, 0)]);
        assert_eq!(config[1].shards, vec![Shard::new(1, 1)]);
        assert!(config[2].shards.is_empty());
    }
}
