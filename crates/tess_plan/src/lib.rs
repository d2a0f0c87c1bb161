//! Partition-aware batch planning for the tess execution engine.
//!
//! Given one batch of prepared statements and their bound parameters, the
//! planner asks a partition estimator where each plan fragment must run,
//! wires the fragments into a dependency DAG, and groups the resulting
//! vertices into round-ordered fragment task messages that the host ships to
//! the execution partitions.

pub mod catalog;
pub mod error;
pub mod estimator;
pub mod graph;
pub mod message;
pub mod params;
pub mod planner;
mod wire;

pub use catalog::{
    DependencyId, FragmentId, PartitionId, PlanFragment, Procedure, Statement,
    NULL_DEPENDENCY_ID,
};
pub use error::{PlanError, PlanResult};
pub use estimator::PartitionEstimator;
pub use graph::{PlanEdge, PlanGraph, PlanVertex};
pub use message::{FragmentTaskMessage, TaskKind};
pub use params::{ParamValue, ParameterSet};
pub use planner::{next_dependency_id, BatchPlan, BatchPlanner, FIRST_DEPENDENCY_ID};
