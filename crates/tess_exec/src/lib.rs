//! Speculative execution scheduling for the tess execution engine.
//!
//! While a distributed transaction is stalled waiting on remote fragments at
//! a partition, the dispatcher asks the scheduler here for a queued
//! single-partition transaction that provably does not conflict with the
//! stalled one, and runs it speculatively to hide the stall latency.

pub mod config;
pub mod conflict;
pub mod profiler;
pub mod queue;
pub mod scheduler;
pub mod txn;

pub use config::{SchedulerConfig, SchedulerPolicy};
pub use conflict::{AllowAllChecker, ConflictChecker, TableConflictChecker};
pub use profiler::{SpecProfiler, SpecProfilerSnapshot};
pub use queue::TxnWorkQueue;
pub use scheduler::{SpecPhase, SpecScheduler};
pub use txn::{AccessSet, EstimatorState, Transaction, TxnEstimate, TxnId, TxnKind};
