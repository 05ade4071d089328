//! Options for a workload run.

use serde::{Deserialize, Serialize};

use crate::error::{Scope, Severity};

/// What the run exclusively owns on the cluster.
///
/// Conditional assertions whose scope is owned are enforced like fatal ones;
/// the rest are counted as skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// Other workloads may touch the same collection and database.
    #[default]
    Shared,
    /// Nothing else writes to the target collection.
    Collection,
    /// Nothing else writes to the target database.
    Database,
}

impl Ownership {
    /// True if a failure of `severity` must stop the worker.
    pub fn enforces(self, severity: Severity) -> bool {
        match severity {
            Severity::Fatal => true,
            Severity::Conditional(scope) => match self {
                Ownership::Shared => false,
                Ownership::Collection => scope == Scope::Collection,
                Ownership::Database => true,
            },
        }
    }
}

/// Collection used when none is given.
pub const DEFAULT_COLLECTION: &str = "fsm_workload";

/// Options controlling one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Collection handed to behaviors and hooks.
    pub collection: String,
    /// Run seed for transition selection. Random when unset.
    pub seed: Option<u64>,
    /// What the run exclusively owns.
    pub ownership: Ownership,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            seed: None,
            ownership: Ownership::Shared,
        }
    }
}

impl RunOptions {
    /// A run alone on its database: every conditional assertion is enforced.
    pub fn exclusive() -> Self {
        Self::default().ownership(Ownership::Database)
    }

    /// A run sharing the cluster with other workloads.
    pub fn shared() -> Self {
        Self::default()
    }

    /// Set the collection.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Fix the run seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the ownership.
    pub fn ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }
}
