//! Shared fixtures for planner integration tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tess_plan::{
    BatchPlanner, FragmentId, ParamValue, ParameterSet, PartitionEstimator, PartitionId,
    PlanFragment, Procedure, Statement,
};

/// How the test estimator routes one fragment.
#[derive(Clone, Copy)]
pub enum Route {
    /// Partition chosen by hashing the first integer parameter.
    ByFirstParam,
    /// Fan out to every partition in the cluster.
    AllPartitions,
    /// Pin to the initiating partition.
    BasePartition,
}

/// Deterministic estimator driven by a per-fragment routing table.
pub struct RoutedEstimator {
    pub partitions: Vec<PartitionId>,
    pub routes: HashMap<FragmentId, Route>,
}

impl PartitionEstimator for RoutedEstimator {
    fn all_fragment_partitions(
        &self,
        frag_partitions: &mut HashMap<FragmentId, BTreeSet<PartitionId>>,
        all_partitions: &mut BTreeSet<PartitionId>,
        fragments: &[Arc<PlanFragment>],
        params: &ParameterSet,
        base_partition: PartitionId,
    ) -> anyhow::Result<()> {
        frag_partitions.clear();
        all_partitions.clear();
        for fragment in fragments {
            let route = self
                .routes
                .get(&fragment.id)
                .ok_or_else(|| anyhow::anyhow!("no route for fragment {}", fragment.id))?;
            let partitions: BTreeSet<PartitionId> = match route {
                Route::ByFirstParam => {
                    let key = match params.values().first() {
                        Some(ParamValue::Int(v)) => *v,
                        _ => anyhow::bail!("expected integer key parameter"),
                    };
                    let index = key.rem_euclid(self.partitions.len() as i64) as usize;
                    [self.partitions[index]].into_iter().collect()
                }
                Route::AllPartitions => self.partitions.iter().copied().collect(),
                Route::BasePartition => [base_partition].into_iter().collect(),
            };
            all_partitions.extend(partitions.iter().copied());
            frag_partitions.insert(fragment.id, partitions);
        }
        Ok(())
    }
}

pub fn fragment(id: FragmentId, tree_depth: u32, read_only: bool) -> Arc<PlanFragment> {
    Arc::new(PlanFragment {
        id,
        tree_depth,
        read_only,
        non_transactional: false,
    })
}

/// Point read with a usable single-partition plan.
pub fn point_read() -> Arc<Statement> {
    Arc::new(Statement {
        name: "get_record".to_string(),
        read_only: true,
        has_single_partition_plan: true,
        single_partition_fragments: vec![fragment(10, 1, true)],
        multi_partition_fragments: vec![fragment(20, 2, true), fragment(21, 1, true)],
    })
}

/// Distributed aggregate: a scan on every partition feeding a collector at
/// the base partition. No single-partition plan.
pub fn distributed_sum() -> Arc<Statement> {
    Arc::new(Statement {
        name: "sum_records".to_string(),
        read_only: true,
        has_single_partition_plan: false,
        single_partition_fragments: vec![],
        multi_partition_fragments: vec![fragment(30, 2, true), fragment(31, 1, true)],
    })
}

pub fn three_partition_estimator() -> Arc<RoutedEstimator> {
    Arc::new(RoutedEstimator {
        partitions: vec![0, 1, 2],
        routes: HashMap::from([
            (10, Route::ByFirstParam),
            (20, Route::AllPartitions),
            (21, Route::BasePartition),
            (30, Route::AllPartitions),
            (31, Route::BasePartition),
        ]),
    })
}

pub fn planner(statements: Vec<Arc<Statement>>) -> BatchPlanner {
    let batch_size = statements.len();
    BatchPlanner::new(
        statements,
        batch_size,
        Arc::new(Procedure {
            name: "TestProc".to_string(),
            system: false,
        }),
        three_partition_estimator(),
        7,
    )
    .expect("planner")
}

pub fn int_args(keys: &[i64]) -> Vec<Arc<ParameterSet>> {
    keys.iter()
        .map(|&key| Arc::new(ParameterSet::new(vec![ParamValue::Int(key)])))
        .collect()
}
