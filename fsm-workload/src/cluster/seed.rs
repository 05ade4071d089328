//! The one interface the engine needs from the cluster under test.

use async_trait::async_trait;

use crate::error::ClusterResult;

use super::topology::ClusterTopology;

/// A connection able to discover the cluster topology.
///
/// `Connection` is whatever client handle the workload's behaviors issue
/// commands through; the engine only clones and hands it out.
#[async_trait]
pub trait SeedConnection: Send + Sync + 'static {
    /// Client handle type for a single node.
    type Connection: Clone + Send + Sync + 'static;

    /// Discover the current topology and open (or reuse) a connection per node.
    async fn discover(&self) -> ClusterResult<ClusterTopology<Self::Connection>>;
}
