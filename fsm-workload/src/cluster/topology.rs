//! Cluster topology as discovered through the seed connection.
//!
//! [`ClusterTopology`] is what discovery returns; [`TopologySnapshot`] is the
//! immutable, role-indexed form the cache publishes; [`TopologyInfo`] is the
//! connection-free summary handed to hooks.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Shape of the cluster under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterKind {
    /// A single node.
    Standalone,
    /// One replica set.
    ReplicaSet,
    /// Routers in front of sharded replica sets.
    Sharded,
}

/// A logical role a connection can be looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Query routers. For unsharded clusters this is the node or set primary.
    Router,
    /// Config server members.
    ConfigServer,
    /// Primary of the named shard (or replica set).
    ShardPrimary(String),
    /// Every member of the named shard (or replica set), primary included.
    ShardMembers(String),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Router => write!(f, "router"),
            Role::ConfigServer => write!(f, "config-server"),
            Role::ShardPrimary(name) => write!(f, "primary of '{name}'"),
            Role::ShardMembers(name) => write!(f, "members of '{name}'"),
        }
    }
}

/// Connections to one replica set (or to a standalone node).
#[derive(Debug, Clone)]
pub struct ReplicaSetConnections<C> {
    /// Shard or set name.
    pub name: String,
    /// Current primary, if one is elected.
    pub primary: Option<C>,
    /// All members including the primary.
    pub members: Vec<C>,
}

/// Result of a topology discovery.
#[derive(Debug, Clone)]
pub struct ClusterTopology<C> {
    /// Cluster shape.
    pub kind: ClusterKind,
    /// Router connections (empty unless sharded).
    pub routers: Vec<C>,
    /// Config server connections (empty unless sharded).
    pub config_servers: Vec<C>,
    /// One entry per shard; a single entry for standalone/replica-set clusters.
    pub shards: Vec<ReplicaSetConnections<C>>,
}

/// Connection-free summary of the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyInfo {
    /// Cluster shape.
    pub kind: ClusterKind,
    /// Shard (or replica set) names in discovery order.
    pub shard_names: Vec<String>,
    /// Number of routers.
    pub router_count: usize,
    /// Number of config server members.
    pub config_server_count: usize,
    /// Snapshot epoch this summary was taken from.
    pub epoch: u64,
}

impl TopologyInfo {
    /// True for sharded clusters.
    pub fn is_sharded(&self) -> bool {
        self.kind == ClusterKind::Sharded
    }

    /// True if the cluster replicates (replica set or sharded).
    pub fn is_replicated(&self) -> bool {
        self.kind != ClusterKind::Standalone
    }
}

/// Immutable role-indexed view of the cluster at one epoch.
#[derive(Debug)]
pub struct TopologySnapshot<C> {
    epoch: u64,
    kind: ClusterKind,
    shard_names: Vec<String>,
    roles: HashMap<Role, Vec<C>>,
}

impl<C: Clone> TopologySnapshot<C> {
    /// Index a discovered topology by role.
    pub(crate) fn from_topology(topology: ClusterTopology<C>, epoch: u64) -> ClusterResult<Self> {
        if topology.shards.is_empty() && topology.routers.is_empty() {
            return Err(ClusterError::Discovery(
                "topology has neither routers nor shards".to_string(),
            ));
        }

        let mut roles = HashMap::new();
        let mut shard_names = Vec::with_capacity(topology.shards.len());

        for shard in topology.shards {
            if let Some(primary) = shard.primary {
                roles.insert(Role::ShardPrimary(shard.name.clone()), vec![primary]);
            }
            roles.insert(Role::ShardMembers(shard.name.clone()), shard.members);
            shard_names.push(shard.name);
        }

        let routers = if topology.routers.is_empty() && topology.kind != ClusterKind::Sharded {
            // Unsharded clusters are addressed through their primary.
            shard_names
                .first()
                .and_then(|name| roles.get(&Role::ShardPrimary(name.clone())))
                .cloned()
                .unwrap_or_default()
        } else {
            topology.routers
        };
        if !routers.is_empty() {
            roles.insert(Role::Router, routers);
        }
        if !topology.config_servers.is_empty() {
            roles.insert(Role::ConfigServer, topology.config_servers);
        }

        Ok(Self {
            epoch,
            kind: topology.kind,
            shard_names,
            roles,
        })
    }

    /// Epoch of this snapshot; starts at 0 and increases on each refresh.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// All connections for `role`.
    pub fn get(&self, role: &Role) -> ClusterResult<&[C]> {
        match self.roles.get(role) {
            Some(conns) if !conns.is_empty() => Ok(conns),
            _ => Err(ClusterError::RoleNotPresent(role.to_string())),
        }
    }

    /// The first connection for `role`.
    pub fn get_one(&self, role: &Role) -> ClusterResult<C> {
        self.get(role).map(|conns| conns[0].clone())
    }

    /// Summary without connections.
    pub fn info(&self) -> TopologyInfo {
        TopologyInfo {
            kind: self.kind,
            shard_names: self.shard_names.clone(),
            router_count: self.roles.get(&Role::Router).map_or(0, Vec::len),
            config_server_count: self.roles.get(&Role::ConfigServer).map_or(0, Vec::len),
            epoch: self.epoch,
        }
    }
}
