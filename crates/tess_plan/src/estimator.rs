//! Partition estimator contract.
//!
//! The estimator is provided by the host engine; the planner depends only on
//! this trait. Implementations must be deterministic for identical inputs.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::catalog::{FragmentId, PartitionId, PlanFragment};
use crate::params::ParameterSet;

pub trait PartitionEstimator: Send + Sync {
    /// Populate, for the given fragments and bound parameters, the set of
    /// partitions each fragment must touch plus the union of all of them.
    ///
    /// Both outputs must be cleared and refilled on every call.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog metadata needed to locate a
    /// fragment's target partitions is missing or inconsistent; the batch is
    /// then un-plannable.
    fn all_fragment_partitions(
        &self,
        frag_partitions: &mut HashMap<FragmentId, BTreeSet<PartitionId>>,
        all_partitions: &mut BTreeSet<PartitionId>,
        fragments: &[Arc<PlanFragment>],
        params: &ParameterSet,
        base_partition: PartitionId,
    ) -> anyhow::Result<()>;
}
