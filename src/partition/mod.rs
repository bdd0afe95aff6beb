// src/partition/mod.rs

//! Local/remote partitioning.
//!
//! Terminal actions (final link or package steps) are often unsuitable for
//! distribution, while the bulk of the graph upstream of them is highly
//! parallel. [`planner`] peels a bounded layer of sinks off the graph for
//! local execution; [`executor`] runs the remaining (remote) set first and
//! the local set only if the remote phase succeeded.

pub mod executor;
pub mod planner;

pub use executor::{EngineExecutor, PartitionRun, PhaseExecutor, run_partitioned};
pub use planner::{Partition, plan_partition};
