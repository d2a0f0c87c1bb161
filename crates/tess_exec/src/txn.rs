//! Transaction handles as the scheduler sees them.
//!
//! Distributed and local transactions are one tagged type rather than an
//! inheritance chain; the scheduler only needs the small capability set
//! below plus the read/write footprint for conflict checking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tess_plan::Procedure;

/// Monotonically assigned transaction identifier.
pub type TxnId = i64;

/// Identifier of one catalog table.
pub type TableId = u32;

/// Read/write table footprint declared for a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSet {
    pub reads: std::collections::BTreeSet<TableId>,
    pub writes: std::collections::BTreeSet<TableId>,
}

impl AccessSet {
    pub fn reads(tables: impl IntoIterator<Item = TableId>) -> Self {
        Self {
            reads: tables.into_iter().collect(),
            writes: Default::default(),
        }
    }

    pub fn writes(tables: impl IntoIterator<Item = TableId>) -> Self {
        Self {
            reads: Default::default(),
            writes: tables.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Write/read or write/write overlap in either direction.
    pub fn conflicts_with(&self, other: &AccessSet) -> bool {
        let writes_touch = |writes: &std::collections::BTreeSet<TableId>, other: &AccessSet| {
            writes
                .iter()
                .any(|table| other.reads.contains(table) || other.writes.contains(table))
        };
        writes_touch(&self.writes, other) || writes_touch(&other.writes, self)
    }
}

/// Most recent estimate produced by the transaction estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnEstimate {
    /// Opaque remaining-execution-time figure; only compared, never
    /// interpreted.
    pub remaining_execution_time: i64,
}

/// Estimator-side state attached to a local transaction.
#[derive(Debug, Clone, Default)]
pub struct EstimatorState {
    pub last_estimate: Option<TxnEstimate>,
}

/// Distributed vs local transaction capabilities.
#[derive(Debug)]
pub enum TxnKind {
    /// A transaction initiated elsewhere; never a speculation candidate.
    Remote,
    Local {
        predict_single_partition: bool,
        /// All partitions the transaction needs live on this host.
        predict_all_local: bool,
        speculative: AtomicBool,
        estimator_state: Option<EstimatorState>,
    },
}

/// One transaction handle in a partition's work queue.
#[derive(Debug)]
pub struct Transaction {
    pub id: TxnId,
    pub procedure: Arc<Procedure>,
    pub access: AccessSet,
    pub kind: TxnKind,
}

impl Transaction {
    pub fn new_local(
        id: TxnId,
        procedure: Arc<Procedure>,
        access: AccessSet,
        predict_single_partition: bool,
        predict_all_local: bool,
        estimator_state: Option<EstimatorState>,
    ) -> Self {
        Self {
            id,
            procedure,
            access,
            kind: TxnKind::Local {
                predict_single_partition,
                predict_all_local,
                speculative: AtomicBool::new(false),
                estimator_state,
            },
        }
    }

    pub fn new_remote(id: TxnId, procedure: Arc<Procedure>, access: AccessSet) -> Self {
        Self {
            id,
            procedure,
            access,
            kind: TxnKind::Remote,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, TxnKind::Local { .. })
    }

    pub fn is_single_partition(&self) -> bool {
        match &self.kind {
            TxnKind::Local {
                predict_single_partition,
                ..
            } => *predict_single_partition,
            TxnKind::Remote => false,
        }
    }

    pub fn predict_all_local(&self) -> bool {
        match &self.kind {
            TxnKind::Local {
                predict_all_local, ..
            } => *predict_all_local,
            TxnKind::Remote => false,
        }
    }

    pub fn is_speculative(&self) -> bool {
        match &self.kind {
            TxnKind::Local { speculative, .. } => speculative.load(Ordering::Relaxed),
            TxnKind::Remote => false,
        }
    }

    /// Mark a local transaction as (not) speculatively executing. No-op for
    /// remote handles.
    pub fn set_speculative(&self, flag: bool) {
        if let TxnKind::Local { speculative, .. } = &self.kind {
            speculative.store(flag, Ordering::Relaxed);
        }
    }

    pub fn estimator_state(&self) -> Option<&EstimatorState> {
        match &self.kind {
            TxnKind::Local {
                estimator_state, ..
            } => estimator_state.as_ref(),
            TxnKind::Remote => None,
        }
    }

    /// Remaining-execution-time figure from the last estimate, when one
    /// exists.
    pub fn remaining_execution_time(&self) -> Option<i64> {
        self.estimator_state()?
            .last_estimate
            .map(|estimate| estimate.remaining_execution_time)
    }
}
