//! Shared catalog handles consumed by the planner.
//!
//! These types are owned by the host catalog and handed to the planner as
//! `Arc` references; the planner never mutates them. They are kept in a
//! small, dependency-light module because both the planner and the
//! speculative scheduler use them.

use std::sync::Arc;

/// Identifier of one database partition (shard).
pub type PartitionId = i32;
/// Identifier of one compiled plan fragment.
pub type FragmentId = i64;
/// Synthetic identifier linking a fragment that produces an intermediate
/// result to the fragment consuming it.
pub type DependencyId = i32;

/// Wire sentinel for "this fragment has no input dependency".
pub const NULL_DEPENDENCY_ID: DependencyId = -1;

/// A compiled piece of one statement's execution plan, runnable on a single
/// partition.
///
/// `tree_depth` is the depth of the fragment's root node in the compiled plan
/// tree. Deeper fragments are producers: the leaf scan of a distributed
/// query sits below the aggregation that consumes its output, so execution
/// order sorts by descending depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanFragment {
    pub id: FragmentId,
    pub tree_depth: u32,
    pub read_only: bool,
    pub non_transactional: bool,
}

/// One prepared SQL statement with its two compiled fragment sets.
#[derive(Debug, Clone)]
pub struct Statement {
    pub name: String,
    pub read_only: bool,
    pub has_single_partition_plan: bool,
    pub single_partition_fragments: Vec<Arc<PlanFragment>>,
    pub multi_partition_fragments: Vec<Arc<PlanFragment>>,
}

impl Statement {
    /// Fragment set for the requested plan flavor.
    pub fn fragments(&self, single_partition: bool) -> &[Arc<PlanFragment>] {
        if single_partition {
            &self.single_partition_fragments
        } else {
            &self.multi_partition_fragments
        }
    }
}

/// The stored procedure a statement batch belongs to.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub system: bool,
}
