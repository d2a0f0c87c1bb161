//! Speculative execution scheduler.
//!
//! One scheduler per execution partition, driven by that partition's
//! dispatcher thread. While a distributed transaction is stalled on remote
//! fragments, `next` scans the work queue for a local single-partition
//! transaction the conflict checker clears, removes it from the queue, and
//! hands it back for speculative execution.

use std::collections::HashMap;
use std::time::Instant;

use tess_plan::{PartitionId, Procedure};

use crate::config::{SchedulerConfig, SchedulerPolicy};
use crate::conflict::ConflictChecker;
use crate::profiler::{SpecProfiler, SpecProfilerSnapshot};
use crate::queue::TxnWorkQueue;
use crate::txn::{Transaction, TxnId};

use std::sync::Arc;

/// The stall point at which the dispatcher asks for a victim. Opaque to the
/// scheduler except as the profiler and iterator-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecPhase {
    /// The partition is idle with no distributed transaction running.
    Idle,
    /// Stalled before the distributed transaction's first local work.
    RemoteBefore,
    /// Stalled after the distributed transaction's local work finished.
    RemoteAfter,
}

impl SpecPhase {
    pub const ALL: [SpecPhase; 3] = [
        SpecPhase::Idle,
        SpecPhase::RemoteBefore,
        SpecPhase::RemoteAfter,
    ];
}

/// Cached scan position from the previous `next` call, valid only for the
/// queue generation it was taken at.
#[derive(Debug, Clone, Copy)]
struct ScanCursor {
    position: usize,
    generation: u64,
}

pub struct SpecScheduler {
    partition_id: PartitionId,
    queue: TxnWorkQueue,
    checker: Box<dyn ConflictChecker>,
    policy: SchedulerPolicy,
    window_size: usize,
    ignore_all_local: bool,
    profilers: Option<HashMap<SpecPhase, SpecProfiler>>,
    last_dtxn: Option<TxnId>,
    last_phase: Option<SpecPhase>,
    last_cursor: Option<ScanCursor>,
}

impl SpecScheduler {
    pub fn new(
        partition_id: PartitionId,
        checker: Box<dyn ConflictChecker>,
        config: SchedulerConfig,
    ) -> Self {
        let profilers = config.profiling.then(|| {
            SpecPhase::ALL
                .iter()
                .map(|&phase| (phase, SpecProfiler::default()))
                .collect()
        });
        Self {
            partition_id,
            queue: TxnWorkQueue::new(),
            checker,
            policy: config.policy,
            window_size: config.window_size.max(1),
            ignore_all_local: config.ignore_all_local,
            profilers,
            last_dtxn: None,
            last_phase: None,
            last_cursor: None,
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// The partition's work queue. Admission and normal dispatch go through
    /// these accessors so queue mutation stays serialized with `next`.
    pub fn queue(&self) -> &TxnWorkQueue {
        &self.queue
    }

    pub fn enqueue(&mut self, txn: Arc<Transaction>) {
        self.queue.push(txn);
    }

    pub fn queue_mut(&mut self) -> &mut TxnWorkQueue {
        &mut self.queue
    }

    /// Drop the cached iterator state.
    pub fn reset(&mut self) {
        self.last_cursor = None;
    }

    pub fn set_policy(&mut self, policy: SchedulerPolicy) {
        self.policy = policy;
    }

    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = window_size.max(1);
    }

    /// Swap the conflict checker; a testing hook.
    pub fn set_conflict_checker(&mut self, checker: Box<dyn ConflictChecker>) {
        tracing::warn!(
            partition = self.partition_id,
            "replacing the scheduler's conflict checker"
        );
        self.checker = checker;
    }

    pub fn should_ignore_procedure(&self, procedure: &Procedure) -> bool {
        self.checker.should_ignore_procedure(procedure)
    }

    pub fn profiler_snapshot(&self, phase: SpecPhase) -> Option<SpecProfilerSnapshot> {
        self.profilers
            .as_ref()
            .and_then(|map| map.get(&phase))
            .map(SpecProfiler::snapshot)
    }

    fn profiler(&self, phase: SpecPhase) -> Option<&SpecProfiler> {
        self.profilers.as_ref().and_then(|map| map.get(&phase))
    }

    /// Find the next queued transaction to speculatively execute under
    /// `dtxn`, removing it from the queue. Returns `None` when nothing
    /// qualifies; the queue is then untouched.
    pub fn next(&mut self, dtxn: &Transaction, phase: SpecPhase) -> Option<Arc<Transaction>> {
        debug_assert!(
            !self.checker.should_ignore_procedure(&dtxn.procedure),
            "dispatcher asked for speculation under an ignored procedure"
        );
        let total_start = self.profilers.is_some().then(Instant::now);

        tracing::trace!(
            dtxn = dtxn.id,
            ?phase,
            queue_size = self.queue.len(),
            policy = ?self.policy,
            "checking queue for a speculative candidate"
        );

        // Nothing is scheduled behind a local transaction whose partitions
        // all live on this host.
        if self.ignore_all_local && dtxn.is_local() && dtxn.predict_all_local() {
            tracing::trace!(dtxn = dtxn.id, "skipping all-local distributed txn");
            if let (Some(profiler), Some(start)) = (self.profiler(phase), total_start) {
                profiler.record_total(start.elapsed());
            }
            return None;
        }

        // Resume the previous scan only for FIRST, and only while the queue
        // has not shifted underneath the cached position.
        let mut position = 0usize;
        if self.policy == SchedulerPolicy::First
            && self.last_dtxn == Some(dtxn.id)
            && self.last_phase == Some(phase)
        {
            if let Some(cursor) = self.last_cursor {
                if cursor.generation == self.queue.generation() {
                    position = cursor.position;
                }
            }
        }

        if let Some(profiler) = self.profiler(phase) {
            profiler.record_queue_size(self.queue.len());
        }

        let mut best: Option<usize> = None;
        let mut best_time = match self.policy {
            SchedulerPolicy::Longest => i64::MIN,
            _ => i64::MAX,
        };
        let mut compared = 0u64;
        let mut examined = 0usize;

        while position < self.queue.len() {
            let Some(txn) = self.queue.get(position) else {
                break;
            };
            compared += 1;

            // Only local, single-partition, not-yet-speculative transactions
            // are candidates.
            if !txn.is_local() || !txn.is_single_partition() || txn.is_speculative() {
                tracing::trace!(dtxn = dtxn.id, candidate = txn.id, "skipping non-candidate");
                position += 1;
                continue;
            }

            let compute_start = self.profilers.is_some().then(Instant::now);
            let allowed = self.checker.can_execute(dtxn, txn, self.partition_id);
            if let (Some(profiler), Some(start)) = (self.profiler(phase), compute_start) {
                profiler.record_compute(start.elapsed());
            }
            if !allowed {
                tracing::trace!(dtxn = dtxn.id, candidate = txn.id, "conflict; skipping");
                position += 1;
                continue;
            }

            match self.policy {
                SchedulerPolicy::First => {
                    best = Some(position);
                    break;
                }
                SchedulerPolicy::Shortest | SchedulerPolicy::Longest => {
                    // Candidates without an estimate stay eligible for FIRST
                    // but cannot win an ordered policy.
                    if let Some(remaining) = txn.remaining_execution_time() {
                        let wins = match self.policy {
                            SchedulerPolicy::Shortest => remaining < best_time,
                            _ => remaining > best_time,
                        };
                        if wins {
                            best_time = remaining;
                            best = Some(position);
                            tracing::debug!(
                                dtxn = dtxn.id,
                                candidate = txn.id,
                                remaining,
                                policy = ?self.policy,
                                "new best speculative candidate"
                            );
                        }
                    }
                    examined += 1;
                    if examined == self.window_size {
                        position += 1;
                        break;
                    }
                }
            }
            position += 1;
        }

        if let Some(profiler) = self.profiler(phase) {
            profiler.record_comparisons(compared);
        }

        let result = best.map(|index| {
            let txn = self.queue.remove_at(index);
            tracing::debug!(
                dtxn = dtxn.id,
                speculative = txn.id,
                "found non-conflicting speculative txn"
            );
            txn
        });
        if result.is_some() {
            if let Some(profiler) = self.profiler(phase) {
                profiler.record_success();
            }
            // The removal shifted everything after `best` left by one, so a
            // FIRST resume continues at the removed slot.
            if let Some(index) = best {
                position = index;
            }
        }

        self.last_cursor = Some(ScanCursor {
            position,
            generation: self.queue.generation(),
        });
        self.last_dtxn = Some(dtxn.id);
        self.last_phase = Some(phase);
        if let (Some(profiler), Some(start)) = (self.profiler(phase), total_start) {
            profiler.record_total(start.elapsed());
        }
        result
    }
}
