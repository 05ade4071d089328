//! In-memory cluster for exercising the engine without a database.
//!
//! [`MemoryCluster`] implements [`SeedConnection`]: discovery reports the
//! current shape (standalone, replica set or sharded), and every connection
//! it hands out reads and writes the same [`MemoryStore`]. Tests reshape the
//! cluster with [`MemoryCluster::step_down`], [`MemoryCluster::add_shard`]
//! and [`MemoryCluster::remove_shard`] and then refresh the cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::cluster::{ClusterKind, ClusterTopology, ReplicaSetConnections, SeedConnection};
use crate::error::{ClusterError, ClusterResult};

/// Documents of every collection, keyed by generated id.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<BTreeMap<String, BTreeMap<u64, Value>>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut BTreeMap<String, BTreeMap<u64, Value>>) -> T) -> T {
        let mut guard = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Insert `doc` and return its id.
    pub fn insert(&self, collection: &str, doc: Value) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.with(|colls| {
            colls
                .entry(collection.to_string())
                .or_default()
                .insert(id, doc)
        });
        id
    }

    /// Document `id`, if present.
    pub fn get(&self, collection: &str, id: u64) -> Option<Value> {
        self.with(|colls| colls.get(collection).and_then(|c| c.get(&id)).cloned())
    }

    /// Replace document `id`. Returns false if it does not exist.
    pub fn update(&self, collection: &str, id: u64, doc: Value) -> bool {
        self.with(|colls| {
            match colls.get_mut(collection).and_then(|c| c.get_mut(&id)) {
                Some(slot) => {
                    *slot = doc;
                    true
                }
                None => false,
            }
        })
    }

    /// Remove document `id`. Returns false if it did not exist.
    pub fn remove(&self, collection: &str, id: u64) -> bool {
        self.with(|colls| {
            colls
                .get_mut(collection)
                .is_some_and(|c| c.remove(&id).is_some())
        })
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.with(|colls| colls.get(collection).map_or(0, BTreeMap::len))
    }

    /// Number of documents in `collection` matching `filter`.
    pub fn count_where(&self, collection: &str, filter: impl Fn(&Value) -> bool) -> usize {
        self.with(|colls| {
            colls
                .get(collection)
                .map_or(0, |c| c.values().filter(|doc| filter(doc)).count())
        })
    }

    /// Drop `collection`. Returns false if it did not exist.
    pub fn drop_collection(&self, collection: &str) -> bool {
        self.with(|colls| colls.remove(collection).is_some())
    }

    /// Names of the non-dropped collections.
    pub fn collections(&self) -> Vec<String> {
        self.with(|colls| colls.keys().cloned().collect())
    }
}

/// Handle to one node of the in-memory cluster.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    node: String,
    store: MemoryStore,
}

impl MemoryConnection {
    /// Node name, e.g. `shard0-1` or `router-0`.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The store every node shares.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[derive(Debug, Clone)]
struct ShardState {
    name: String,
    members: usize,
    primary: usize,
}

#[derive(Debug)]
struct ClusterState {
    kind: ClusterKind,
    routers: usize,
    config_servers: usize,
    shards: Vec<ShardState>,
}

/// Seed connection of an in-memory cluster.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
    store: MemoryStore,
    discoveries: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryCluster {
    fn new(kind: ClusterKind, routers: usize, config_servers: usize, shards: Vec<ShardState>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                kind,
                routers,
                config_servers,
                shards,
            })),
            store: MemoryStore::default(),
            discoveries: Arc::new(AtomicUsize::new(0)),
            unreachable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A single node.
    pub fn standalone() -> Self {
        Self::new(
            ClusterKind::Standalone,
            0,
            0,
            vec![ShardState {
                name: "standalone".to_string(),
                members: 1,
                primary: 0,
            }],
        )
    }

    /// One replica set called `name` with `members` nodes.
    pub fn replica_set(name: impl Into<String>, members: usize) -> Self {
        Self::new(
            ClusterKind::ReplicaSet,
            0,
            0,
            vec![ShardState {
                name: name.into(),
                members: members.max(1),
                primary: 0,
            }],
        )
    }

    /// `shards` shards named `shard0..` with `members` nodes each, behind
    /// `routers` routers and a three-node config server.
    pub fn sharded(shards: usize, members: usize, routers: usize) -> Self {
        let shards = (0..shards)
            .map(|i| ShardState {
                name: format!("shard{i}"),
                members: members.max(1),
                primary: 0,
            })
            .collect();
        Self::new(ClusterKind::Sharded, routers.max(1), 3, shards)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ClusterState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The store shared by every node.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Elect the next member of `shard` as primary.
    pub fn step_down(&self, shard: &str) -> ClusterResult<()> {
        self.with_state(|state| {
            let shard_state = state
                .shards
                .iter_mut()
                .find(|s| s.name == shard)
                .ok_or_else(|| ClusterError::RoleNotPresent(format!("shard '{shard}'")))?;
            shard_state.primary = (shard_state.primary + 1) % shard_state.members;
            Ok(())
        })
    }

    /// Add a shard with `members` nodes.
    pub fn add_shard(&self, name: impl Into<String>, members: usize) {
        let name = name.into();
        self.with_state(|state| {
            state.shards.push(ShardState {
                name,
                members: members.max(1),
                primary: 0,
            })
        });
    }

    /// Drain and remove `shard`. Returns false if it did not exist.
    pub fn remove_shard(&self, shard: &str) -> bool {
        self.with_state(|state| {
            let before = state.shards.len();
            state.shards.retain(|s| s.name != shard);
            state.shards.len() != before
        })
    }

    /// Make discovery fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of discoveries performed so far.
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    fn connection(&self, node: String) -> MemoryConnection {
        MemoryConnection {
            node,
            store: self.store.clone(),
        }
    }
}

#[async_trait]
impl SeedConnection for MemoryCluster {
    type Connection = MemoryConnection;

    async fn discover(&self) -> ClusterResult<ClusterTopology<MemoryConnection>> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClusterError::Discovery("cluster is unreachable".to_string()));
        }

        let (kind, routers, config_servers, shards) = self.with_state(|state| {
            (
                state.kind,
                state.routers,
                state.config_servers,
                state.shards.clone(),
            )
        });

        let shards = shards
            .into_iter()
            .map(|shard| {
                let members: Vec<MemoryConnection> = (0..shard.members)
                    .map(|i| self.connection(format!("{}-{}", shard.name, i)))
                    .collect();
                ReplicaSetConnections {
                    primary: members.get(shard.primary).cloned(),
                    name: shard.name,
                    members,
                }
            })
            .collect();

        Ok(ClusterTopology {
            kind,
            routers: (0..routers)
                .map(|i| self.connection(format!("router-{i}")))
                .collect(),
            config_servers: (0..config_servers)
                .map(|i| self.connection(format!("config-{i}")))
                .collect(),
            shards,
        })
    }
}
