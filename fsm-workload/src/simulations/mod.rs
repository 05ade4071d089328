//! Reference cluster and workloads.
//!
//! Used by `#[test]` integration tests and usable as a template for real
//! workloads: [`memory`] is an in-memory cluster behind the seed-connection
//! interface, [`crud`] a workload that runs against it.

pub mod crud;
pub mod memory;

use crate::error::WorkloadResult;
use crate::runner::{RunOptions, RunReport, WorkloadRunner};
use crate::workload::WorkloadDescription;

use memory::MemoryCluster;

/// Run `workload` against `cluster` inside a multi-thread tokio runtime.
pub fn run_in_memory(
    cluster: MemoryCluster,
    workload: &WorkloadDescription<MemoryCluster>,
    options: &RunOptions,
) -> WorkloadResult<RunReport> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_time()
        .build()
        .expect("Failed to build runtime");

    runtime.block_on(async move {
        WorkloadRunner::connect(cluster)
            .await?
            .run(workload, options)
            .await
    })
}
