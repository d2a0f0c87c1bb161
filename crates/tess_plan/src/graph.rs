//! Mutable dependency DAG for one batch plan.
//!
//! Vertices are stored in insertion order and referenced by index; edges
//! carry endpoint indices rather than pointers. An edge runs from a consumer
//! to the producer whose output dependency it reads, so the vertices with no
//! outgoing edges are the source fragments of the plan and round numbers grow
//! toward the terminal consumers.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::catalog::{DependencyId, PartitionId, PlanFragment, NULL_DEPENDENCY_ID};
use crate::params::ParameterSet;

/// One fragment execution at one partition.
#[derive(Debug, Clone)]
pub struct PlanVertex {
    pub fragment: Arc<PlanFragment>,
    pub partition: PartitionId,
    pub stmt_index: usize,
    pub input_dep_id: Option<DependencyId>,
    pub output_dep_id: DependencyId,
    pub params: Arc<ParameterSet>,
    pub local: bool,
}

impl PartialEq for PlanVertex {
    fn eq(&self, other: &Self) -> bool {
        self.fragment == other.fragment
            && self.partition == other.partition
            && self.stmt_index == other.stmt_index
            && self.input_dep_id == other.input_dep_id
            && self.output_dep_id == other.output_dep_id
            && self.params == other.params
    }
}

impl Eq for PlanVertex {}

impl Hash for PlanVertex {
    // Derived from (fragment, partition) alone; stable for the vertex's
    // lifetime and coarser than equality, which is allowed.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fragment.id.hash(state);
        self.partition.hash(state);
    }
}

/// Directed edge from a consumer vertex to one of its producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEdge {
    pub dep_id: DependencyId,
    pub consumer: usize,
    pub producer: usize,
}

#[derive(Debug, Default)]
pub struct PlanGraph {
    vertices: Vec<PlanVertex>,
    edges: Vec<PlanEdge>,
    /// Consumer index -> producer indexes, parallel to `vertices`.
    outgoing: Vec<Vec<usize>>,
    /// Output dependency id -> vertices producing it.
    produced_by: HashMap<DependencyId, Vec<usize>>,
    edge_set: HashSet<(usize, usize)>,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one vertex and index it by its output dependency id.
    ///
    /// # Errors
    ///
    /// Rejects vertices carrying the null dependency sentinel as their
    /// output id; every vertex must produce some output.
    pub fn add_vertex(&mut self, vertex: PlanVertex) -> anyhow::Result<usize> {
        anyhow::ensure!(
            vertex.output_dep_id != NULL_DEPENDENCY_ID,
            "plan vertex for fragment {} has no output dependency id",
            vertex.fragment.id
        );
        let index = self.vertices.len();
        self.produced_by
            .entry(vertex.output_dep_id)
            .or_default()
            .push(index);
        self.vertices.push(vertex);
        self.outgoing.push(Vec::new());
        Ok(index)
    }

    /// Create one edge from every consumer to every producer of its input
    /// dependency. Idempotent; safe to call after adding more vertices.
    pub fn build_edges(&mut self) {
        for consumer in 0..self.vertices.len() {
            let Some(dep_id) = self.vertices[consumer].input_dep_id else {
                continue;
            };
            let Some(producers) = self.produced_by.get(&dep_id) else {
                continue;
            };
            for &producer in producers {
                debug_assert_ne!(consumer, producer, "self-dependency in plan graph");
                if producer == consumer {
                    continue;
                }
                if !self.edge_set.insert((consumer, producer)) {
                    continue;
                }
                self.edges.push(PlanEdge {
                    dep_id,
                    consumer,
                    producer,
                });
                self.outgoing[consumer].push(producer);
            }
        }
    }

    pub fn vertex(&self, index: usize) -> &PlanVertex {
        &self.vertices[index]
    }

    pub fn vertices(&self) -> &[PlanVertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[PlanEdge] {
        &self.edges
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertices producing the given output dependency id.
    pub fn output_dependencies(&self, dep_id: DependencyId) -> &[usize] {
        self.produced_by
            .get(&dep_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Vertices with no outgoing edges: the source fragments every other
    /// vertex ultimately depends on.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.vertices.len())
            .filter(|&index| self.outgoing[index].is_empty())
            .collect()
    }

    /// Longest distance from a root, per vertex.
    ///
    /// A producer must be finished in every round that any consumer needs
    /// it, so the consumer's round is one past its deepest producer.
    pub fn rounds(&self) -> Vec<u32> {
        let count = self.vertices.len();
        let mut rounds = vec![0u32; count];
        // Consumers of each vertex and the number of unresolved producers per
        // consumer, for a producers-first relaxation.
        let mut consumers_of: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut pending_producers: Vec<usize> = vec![0; count];
        for edge in &self.edges {
            consumers_of[edge.producer].push(edge.consumer);
            pending_producers[edge.consumer] += 1;
        }
        let mut ready: Vec<usize> = (0..count)
            .filter(|&index| pending_producers[index] == 0)
            .collect();
        let mut resolved = 0usize;
        let mut cursor = 0usize;
        while cursor < ready.len() {
            let vertex = ready[cursor];
            cursor += 1;
            resolved += 1;
            for &consumer in &consumers_of[vertex] {
                rounds[consumer] = rounds[consumer].max(rounds[vertex] + 1);
                pending_producers[consumer] -= 1;
                if pending_producers[consumer] == 0 {
                    ready.push(consumer);
                }
            }
        }
        debug_assert_eq!(resolved, count, "cycle in plan graph");
        rounds
    }

    /// Visit every vertex ordered by its longest distance from a root;
    /// vertices at the same distance are visited in insertion order.
    pub fn traverse_longest_path(&self, mut visit: impl FnMut(usize, &PlanVertex, u32)) {
        let rounds = self.rounds();
        let mut order: Vec<usize> = (0..self.vertices.len()).collect();
        order.sort_by_key(|&index| (rounds[index], index));
        for index in order {
            visit(index, &self.vertices[index], rounds[index]);
        }
    }
}
