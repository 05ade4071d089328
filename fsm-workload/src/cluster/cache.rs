//! Shared, read-mostly cache of cluster connections.
//!
//! The cache holds an `Arc` to an immutable [`TopologySnapshot`]. A refresh
//! discovers the topology again, builds a complete new snapshot, and swaps
//! the pointer under a short write lock. Readers clone the `Arc` and keep
//! using whatever snapshot they hold; nobody ever sees a half-built one.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::error::ClusterResult;

use super::seed::SeedConnection;
use super::topology::{Role, TopologyInfo, TopologySnapshot};

/// Cloneable handle to the connection cache shared by all workers of a run.
pub struct ConnectionCache<S: SeedConnection> {
    seed: Arc<S>,
    current: Arc<RwLock<Arc<TopologySnapshot<S::Connection>>>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl<S: SeedConnection> Clone for ConnectionCache<S> {
    fn clone(&self) -> Self {
        Self {
            seed: Arc::clone(&self.seed),
            current: Arc::clone(&self.current),
            refresh_lock: Arc::clone(&self.refresh_lock),
        }
    }
}

impl<S: SeedConnection> fmt::Debug for ConnectionCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("topology", &self.topology())
            .finish()
    }
}

impl<S: SeedConnection> ConnectionCache<S> {
    /// Discover the topology through `seed` and populate every role.
    pub async fn build(seed: S) -> ClusterResult<Self> {
        let topology = seed.discover().await?;
        let snapshot = TopologySnapshot::from_topology(topology, 0)?;
        tracing::debug!(topology = ?snapshot.info(), "Connection cache built");

        Ok(Self {
            seed: Arc::new(seed),
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Re-discover the topology and publish a new snapshot.
    ///
    /// Concurrent refreshes are serialized so epochs stay strictly
    /// increasing. On error the previous snapshot stays published.
    pub async fn refresh(&self) -> ClusterResult<Arc<TopologySnapshot<S::Connection>>> {
        let _guard = self.refresh_lock.lock().await;

        let topology = self.seed.discover().await?;
        let epoch = self.snapshot().epoch() + 1;
        let snapshot = Arc::new(TopologySnapshot::from_topology(topology, epoch)?);

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        tracing::debug!(epoch, "Connection cache refreshed");
        Ok(snapshot)
    }

    /// The snapshot currently published.
    pub fn snapshot(&self) -> Arc<TopologySnapshot<S::Connection>> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// All cached connections for `role`. Never performs I/O.
    pub fn get(&self, role: &Role) -> ClusterResult<Vec<S::Connection>> {
        self.snapshot().get(role).map(<[_]>::to_vec)
    }

    /// One cached connection for `role`. Never performs I/O.
    pub fn get_one(&self, role: &Role) -> ClusterResult<S::Connection> {
        self.snapshot().get_one(role)
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.snapshot().epoch()
    }

    /// Connection-free summary of the current snapshot.
    pub fn topology(&self) -> TopologyInfo {
        self.snapshot().info()
    }

    /// The seed connection the cache discovers through.
    pub fn seed(&self) -> &S {
        &self.seed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cluster::topology::{ClusterKind, ClusterTopology, ReplicaSetConnections};
    use crate::error::ClusterError;

    /// Seed whose shard count grows by one on each discovery.
    struct GrowingSeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeedConnection for GrowingSeed {
        type Connection = String;

        async fn discover(&self) -> ClusterResult<ClusterTopology<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ClusterTopology {
                kind: ClusterKind::Sharded,
                routers: vec!["mongos".to_string()],
                config_servers: vec![],
                shards: (0..n)
                    .map(|i| ReplicaSetConnections {
                        name: format!("shard{i}"),
                        primary: Some(format!("shard{i}-p")),
                        members: vec![format!("shard{i}-p")],
                    })
                    .collect(),
            })
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build runtime")
    }

    #[test]
    fn test_refresh_publishes_new_snapshot() {
        runtime().block_on(async {
            let cache = ConnectionCache::build(GrowingSeed {
                calls: AtomicUsize::new(0),
            })
            .await
            .expect("build");

            let before = cache.snapshot();
            assert_eq!(before.epoch(), 0);
            assert!(cache.get_one(&Role::ShardPrimary("shard1".into())).is_err());

            cache.refresh().await.expect("refresh");

            assert_eq!(cache.epoch(), 1);
            assert_eq!(
                cache.get_one(&Role::ShardPrimary("shard1".into())),
                Ok("shard1-p".to_string())
            );
            // The old snapshot is untouched.
            assert_eq!(before.epoch(), 0);
            assert!(before.get(&Role::ShardPrimary("shard1".into())).is_err());
        });
    }

    #[test]
    fn test_clones_share_snapshot() {
        runtime().block_on(async {
            let cache = ConnectionCache::build(GrowingSeed {
                calls: AtomicUsize::new(0),
            })
            .await
            .expect("build");
            let other = cache.clone();

            other.refresh().await.expect("refresh");
            assert_eq!(cache.epoch(), 1);
            assert_eq!(cache.topology().shard_names.len(), 2);
        });
    }

    struct BrokenSeed;

    #[async_trait]
    impl SeedConnection for BrokenSeed {
        type Connection = String;

        async fn discover(&self) -> ClusterResult<ClusterTopology<String>> {
            Err(ClusterError::Discovery("connection refused".into()))
        }
    }

    #[test]
    fn test_build_fails_on_discovery_error() {
        runtime().block_on(async {
            let err = ConnectionCache::build(BrokenSeed).await.expect_err("must fail");
            assert_eq!(err, ClusterError::Discovery("connection refused".into()));
        });
    }
}
