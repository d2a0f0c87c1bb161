//! Batch planner: turns one batch of prepared statements into a
//! partition-aware execution DAG.
//!
//! A `BatchPlanner` is built once per stored procedure and invoked once per
//! batch. All per-plan scratch state is planner-instance-local; the only
//! process-wide state is the dependency id counter and the pooled fragment
//! scratch list.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::catalog::{
    DependencyId, FragmentId, PartitionId, PlanFragment, Procedure, Statement,
    NULL_DEPENDENCY_ID,
};
use crate::error::{PlanError, PlanResult};
use crate::estimator::PartitionEstimator;
use crate::graph::{PlanGraph, PlanVertex};
use crate::message::{FragmentTaskMessage, TaskKind};
use crate::params::ParameterSet;

/// Dependency ids start above a reserved floor so they never collide with
/// the ids the execution sites use for client-visible result tables.
pub const FIRST_DEPENDENCY_ID: DependencyId = 1000;

static NEXT_DEPENDENCY_ID: AtomicI32 = AtomicI32::new(FIRST_DEPENDENCY_ID);

/// Allocate one globally unique dependency id. Monotonic across the process.
pub fn next_dependency_id() -> DependencyId {
    NEXT_DEPENDENCY_ID.fetch_add(1, Ordering::Relaxed)
}

static FRAGMENT_SCRATCH_POOL: Mutex<Vec<Vec<Arc<PlanFragment>>>> = Mutex::new(Vec::new());

/// Pooled scratch list for the per-statement fragment ordering. Returned to
/// the pool on drop, so every exit path of `plan` releases it.
struct FragmentScratch {
    list: Vec<Arc<PlanFragment>>,
}

fn borrow_fragment_scratch() -> FragmentScratch {
    let list = FRAGMENT_SCRATCH_POOL
        .lock()
        .ok()
        .and_then(|mut pool| pool.pop())
        .unwrap_or_default();
    FragmentScratch { list }
}

impl Drop for FragmentScratch {
    fn drop(&mut self) {
        let mut list = std::mem::take(&mut self.list);
        list.clear();
        if let Ok(mut pool) = FRAGMENT_SCRATCH_POOL.lock() {
            pool.push(list);
        }
    }
}

impl Deref for FragmentScratch {
    type Target = Vec<Arc<PlanFragment>>;

    fn deref(&self) -> &Self::Target {
        &self.list
    }
}

impl DerefMut for FragmentScratch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.list
    }
}

fn planning(procedure: &Procedure, stmt_index: usize, source: anyhow::Error) -> PlanError {
    PlanError::Planning {
        procedure: procedure.name.clone(),
        stmt_index,
        source,
    }
}

#[derive(Debug, Default)]
struct StmtScratch {
    frag_partitions: HashMap<FragmentId, BTreeSet<PartitionId>>,
    all_partitions: BTreeSet<PartitionId>,
}

/// Per-procedure planner holding immutable batch metadata.
pub struct BatchPlanner {
    statements: Vec<Arc<Statement>>,
    batch_size: usize,
    procedure: Arc<Procedure>,
    estimator: Arc<dyn PartitionEstimator>,
    initiator_id: i32,
    scratch: Vec<StmtScratch>,
}

impl BatchPlanner {
    /// # Errors
    ///
    /// Fails when the batch size is zero or exceeds the statement list.
    pub fn new(
        statements: Vec<Arc<Statement>>,
        batch_size: usize,
        procedure: Arc<Procedure>,
        estimator: Arc<dyn PartitionEstimator>,
        initiator_id: i32,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(batch_size >= 1, "statement batch must not be empty");
        anyhow::ensure!(
            batch_size <= statements.len(),
            "batch size {} exceeds {} prepared statements",
            batch_size,
            statements.len()
        );
        let scratch = (0..batch_size).map(|_| StmtScratch::default()).collect();
        Ok(Self {
            statements,
            batch_size,
            procedure,
            estimator,
            initiator_id,
            scratch,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn procedure(&self) -> &Arc<Procedure> {
        &self.procedure
    }

    /// Plan one batch invocation.
    ///
    /// `txn_id` identifies the transaction being planned and is carried on a
    /// mispredict so the caller can restart it as multi-partition.
    ///
    /// # Errors
    ///
    /// `PlanError::Mispredict` when `predict_single_partition` was set but a
    /// statement touches more than one partition; `PlanError::Planning` when
    /// the estimator fails or the catalog is inconsistent.
    pub fn plan(
        &mut self,
        txn_id: i64,
        batch_args: &[Arc<ParameterSet>],
        base_partition: PartitionId,
        predict_single_partition: bool,
    ) -> PlanResult<BatchPlan> {
        if batch_args.len() != self.batch_size {
            return Err(planning(
                &self.procedure,
                0,
                anyhow::anyhow!(
                    "expected {} parameter sets, got {}",
                    self.batch_size,
                    batch_args.len()
                ),
            ));
        }
        tracing::debug!(
            txn_id,
            procedure = %self.procedure.name,
            base_partition,
            predict_single_partition,
            "planning statement batch"
        );

        let mut plan = BatchPlan::new(
            base_partition,
            self.batch_size,
            Arc::clone(&self.procedure),
            self.initiator_id,
        );
        let mut frag_scratch = borrow_fragment_scratch();

        for stmt_index in 0..self.batch_size {
            let stmt = &self.statements[stmt_index];
            let params = &batch_args[stmt_index];
            let scratch = &mut self.scratch[stmt_index];
            scratch.all_partitions.clear();
            for partitions in scratch.frag_partitions.values_mut() {
                partitions.clear();
            }

            let mut is_single = stmt.has_single_partition_plan;
            let mut mispredict = false;
            loop {
                let fragments = stmt.fragments(is_single);
                if fragments.is_empty() {
                    return Err(planning(
                        &self.procedure,
                        stmt_index,
                        anyhow::anyhow!("statement `{}` has no compiled fragments", stmt.name),
                    ));
                }
                self.estimator
                    .all_fragment_partitions(
                        &mut scratch.frag_partitions,
                        &mut scratch.all_partitions,
                        fragments,
                        params,
                        base_partition,
                    )
                    .map_err(|source| planning(&self.procedure, stmt_index, source))?;

                if is_single && scratch.all_partitions.len() > 1 {
                    if predict_single_partition {
                        mispredict = true;
                        break;
                    }
                    // Fall back to the multi-partition fragments and try
                    // again; the loop runs at most twice.
                    is_single = false;
                    continue;
                }
                // A predicted single-partition txn was dispatched to run at
                // its base partition without coordination, so a plan that
                // lands on any other partition is a misprediction too.
                if is_single
                    && predict_single_partition
                    && scratch.all_partitions.len() == 1
                    && !scratch.all_partitions.contains(&base_partition)
                {
                    mispredict = true;
                }
                break;
            }

            if mispredict {
                tracing::debug!(
                    txn_id,
                    stmt = %stmt.name,
                    partitions = scratch.all_partitions.len(),
                    "single-partition prediction refuted"
                );
                return Err(PlanError::Mispredict { txn_id });
            }

            let fragments = stmt.fragments(is_single);
            frag_scratch.clear();
            frag_scratch.extend(fragments.iter().cloned());
            // Producers run before their consumers: deeper plan-tree
            // fragments first, ties broken by fragment id.
            frag_scratch.sort_by(|a, b| b.tree_depth.cmp(&a.tree_depth).then(a.id.cmp(&b.id)));

            let is_local = scratch.all_partitions.len() == 1
                && scratch.all_partitions.contains(&base_partition);
            plan.read_only &= stmt.read_only;
            plan.all_single_sited &= is_single;
            plan.all_local &= is_local;
            plan.stmt_partition_ids[stmt_index] =
                scratch.all_partitions.iter().copied().collect();

            let mut last_output_id: Option<DependencyId> = None;
            for fragment in frag_scratch.iter() {
                let f_partitions = scratch
                    .frag_partitions
                    .get(&fragment.id)
                    .filter(|partitions| !partitions.is_empty())
                    .ok_or_else(|| {
                        planning(
                            &self.procedure,
                            stmt_index,
                            anyhow::anyhow!(
                                "estimator returned no partitions for fragment {}",
                                fragment.id
                            ),
                        )
                    })?;
                let f_local =
                    f_partitions.len() == 1 && f_partitions.contains(&base_partition);
                if f_local {
                    plan.local_frags_non_transactional &= fragment.non_transactional;
                }
                let output_id = next_dependency_id();
                tracing::trace!(
                    txn_id,
                    fragment = fragment.id,
                    input_dep = ?last_output_id,
                    output_dep = output_id,
                    partitions = f_partitions.len(),
                    local = f_local,
                    "adding plan fragment"
                );
                for &partition in f_partitions.iter() {
                    let vertex = PlanVertex {
                        fragment: Arc::clone(fragment),
                        partition,
                        stmt_index,
                        input_dep_id: last_output_id,
                        output_dep_id: output_id,
                        params: Arc::clone(params),
                        local: f_local,
                    };
                    plan.graph
                        .add_vertex(vertex)
                        .map_err(|source| planning(&self.procedure, stmt_index, source))?;
                    if f_local {
                        plan.local_fragment_count += 1;
                    } else {
                        plan.remote_fragment_count += 1;
                    }
                }
                last_output_id = Some(output_id);
            }
            // Non-empty fragment list was checked above.
            plan.result_dep_ids[stmt_index] =
                last_output_id.unwrap_or(NULL_DEPENDENCY_ID);
        }

        plan.graph.build_edges();
        plan.memoize_rounds();
        tracing::debug!(
            txn_id,
            vertices = plan.graph.vertex_count(),
            edges = plan.graph.edge_count(),
            read_only = plan.read_only,
            all_local = plan.all_local,
            all_single_sited = plan.all_single_sited,
            "finished batch plan"
        );
        Ok(plan)
    }
}

/// Finalized plan for one batch invocation: the DAG plus per-statement
/// partition maps, locality flags, and the round grouping the fragment task
/// messages are built from.
#[derive(Debug)]
pub struct BatchPlan {
    local_partition: PartitionId,
    pub(crate) graph: PlanGraph,
    read_only: bool,
    all_local: bool,
    all_single_sited: bool,
    local_frags_non_transactional: bool,
    stmt_partition_ids: Vec<Vec<PartitionId>>,
    result_dep_ids: Vec<DependencyId>,
    local_fragment_count: usize,
    remote_fragment_count: usize,
    rounds: BTreeMap<(u32, PartitionId), Vec<usize>>,
    procedure: Arc<Procedure>,
    initiator_id: i32,
}

impl BatchPlan {
    fn new(
        local_partition: PartitionId,
        batch_size: usize,
        procedure: Arc<Procedure>,
        initiator_id: i32,
    ) -> Self {
        Self {
            local_partition,
            graph: PlanGraph::new(),
            read_only: true,
            all_local: true,
            all_single_sited: true,
            local_frags_non_transactional: true,
            stmt_partition_ids: vec![Vec::new(); batch_size],
            result_dep_ids: vec![NULL_DEPENDENCY_ID; batch_size],
            local_fragment_count: 0,
            remote_fragment_count: 0,
            rounds: BTreeMap::new(),
            procedure,
            initiator_id,
        }
    }

    fn memoize_rounds(&mut self) {
        let mut rounds: BTreeMap<(u32, PartitionId), Vec<usize>> = BTreeMap::new();
        self.graph.traverse_longest_path(|index, vertex, round| {
            rounds
                .entry((round, vertex.partition))
                .or_default()
                .push(index);
        });
        self.rounds = rounds;
    }

    pub fn local_partition(&self) -> PartitionId {
        self.local_partition
    }

    pub fn graph(&self) -> &PlanGraph {
        &self.graph
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True when every statement touches only the base partition.
    pub fn is_local(&self) -> bool {
        self.all_local
    }

    /// True when every statement resolved via its single-partition plan.
    pub fn is_single_sited(&self) -> bool {
        self.all_single_sited
    }

    pub fn local_frags_non_transactional(&self) -> bool {
        self.local_frags_non_transactional
    }

    /// Partitions touched by each statement, in ascending partition order.
    pub fn statement_partitions(&self) -> &[Vec<PartitionId>] {
        &self.stmt_partition_ids
    }

    /// Output dependency id of each statement's final fragment: the ids the
    /// control code waits on before resuming the procedure.
    pub fn result_dependency_ids(&self) -> &[DependencyId] {
        &self.result_dep_ids
    }

    pub fn local_fragment_count(&self) -> usize {
        self.local_fragment_count
    }

    pub fn remote_fragment_count(&self) -> usize {
        self.remote_fragment_count
    }

    /// Build the round-ordered fragment task messages for this plan.
    ///
    /// Messages within one round carry no dependency relation and may run in
    /// parallel; every consumer of a dependency id sits in a strictly later
    /// round than its producers.
    ///
    /// # Errors
    ///
    /// `PlanError::Serialization` when a parameter set cannot be encoded.
    pub fn fragment_task_messages(
        &self,
        txn_id: i64,
        client_handle: i64,
    ) -> PlanResult<Vec<FragmentTaskMessage>> {
        let kind = if self.procedure.system {
            TaskKind::SysProcPerPartition
        } else {
            TaskKind::UserProc
        };
        let mut tasks = Vec::with_capacity(self.rounds.len());
        for ((round, partition), vertex_indexes) in &self.rounds {
            if vertex_indexes.is_empty() {
                continue;
            }
            let count = vertex_indexes.len();
            let mut fragment_ids = Vec::with_capacity(count);
            let mut input_dep_ids = Vec::with_capacity(count);
            let mut output_dep_ids = Vec::with_capacity(count);
            let mut stmt_indexes = Vec::with_capacity(count);
            let mut param_payloads = Vec::with_capacity(count);
            for &index in vertex_indexes {
                let vertex = self.graph.vertex(index);
                debug_assert_eq!(vertex.partition, *partition);
                fragment_ids.push(vertex.fragment.id);
                input_dep_ids.push(vertex.input_dep_id.unwrap_or(NULL_DEPENDENCY_ID));
                output_dep_ids.push(vertex.output_dep_id);
                stmt_indexes.push(vertex.stmt_index as i32);
                let payload = vertex.params.encode().map_err(|source| {
                    PlanError::Serialization {
                        procedure: self.procedure.name.clone(),
                        stmt_index: vertex.stmt_index,
                        source,
                    }
                })?;
                param_payloads.push(payload);
            }
            tracing::trace!(
                txn_id,
                round,
                partition,
                fragments = count,
                "grouped fragment task message"
            );
            tasks.push(FragmentTaskMessage {
                target_partition: *partition,
                initiator_id: self.initiator_id,
                txn_id,
                client_handle,
                fragment_ids,
                input_dep_ids,
                output_dep_ids,
                stmt_indexes,
                param_payloads,
                kind,
                final_task: false,
            });
        }
        debug_assert!(!tasks.is_empty(), "batch plan produced no messages");
        Ok(tasks)
    }
}

impl fmt::Display for BatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Read Only:        {}", self.read_only)?;
        writeln!(f, "All Local:        {}", self.all_local)?;
        writeln!(f, "All Single-Sited: {}", self.all_single_sited)?;
        writeln!(f, "# of Fragments:   {}", self.graph.vertex_count())
    }
}
