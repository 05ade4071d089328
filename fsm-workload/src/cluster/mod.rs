//! Cluster connection cache.
//!
//! ## Submodules
//!
//! - `seed` - [`SeedConnection`], the discovery interface the cluster provides
//! - `topology` - discovered topology, roles, snapshots and summaries
//! - `cache` - [`ConnectionCache`], copy-on-write snapshots shared by workers

pub mod cache;
pub mod seed;
pub mod topology;

pub use cache::ConnectionCache;
pub use seed::SeedConnection;
pub use topology::{
    ClusterKind, ClusterTopology, ReplicaSetConnections, Role, TopologyInfo, TopologySnapshot,
};
