//! Pluggable conflict reasoning between a stalled distributed transaction
//! and a speculation candidate.

use tess_plan::{PartitionId, Procedure};

use crate::txn::Transaction;

/// Decides whether a queued transaction may run speculatively under a
/// stalled distributed transaction.
///
/// `can_execute` must be deterministic and side-effect free over the two
/// transactions' read/write sets; the scheduler relies on both.
pub trait ConflictChecker: Send + Sync {
    /// Transactions of this procedure should never be considered for
    /// speculation at all. Enforced by the dispatcher before it asks the
    /// scheduler for a victim.
    fn should_ignore_procedure(&self, procedure: &Procedure) -> bool;

    fn can_execute(
        &self,
        dtxn: &Transaction,
        candidate: &Transaction,
        partition_id: PartitionId,
    ) -> bool;
}

/// Table-granularity checker: a candidate may run unless one side writes a
/// table the other touches.
#[derive(Debug, Default)]
pub struct TableConflictChecker;

impl ConflictChecker for TableConflictChecker {
    fn should_ignore_procedure(&self, procedure: &Procedure) -> bool {
        // System procedures bypass the declared-footprint machinery.
        procedure.system
    }

    fn can_execute(
        &self,
        dtxn: &Transaction,
        candidate: &Transaction,
        _partition_id: PartitionId,
    ) -> bool {
        // An undeclared footprint could touch anything.
        if candidate.access.is_empty() {
            return false;
        }
        !dtxn.access.conflicts_with(&candidate.access)
    }
}

/// Checker that permits everything; used for measurement runs where the
/// aborts caused by actual conflicts are accounted for separately.
#[derive(Debug, Default)]
pub struct AllowAllChecker;

impl ConflictChecker for AllowAllChecker {
    fn should_ignore_procedure(&self, _procedure: &Procedure) -> bool {
        false
    }

    fn can_execute(
        &self,
        _dtxn: &Transaction,
        _candidate: &Transaction,
        _partition_id: PartitionId,
    ) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::AccessSet;
    use std::sync::Arc;

    fn procedure(name: &str, system: bool) -> Arc<Procedure> {
        Arc::new(Procedure {
            name: name.to_string(),
            system,
        })
    }

    fn local(id: i64, access: AccessSet) -> Transaction {
        Transaction::new_local(id, procedure("Pay", false), access, true, false, None)
    }

    #[test]
    fn table_checker_blocks_write_overlap() {
        let checker = TableConflictChecker;
        let dtxn = local(1, AccessSet::writes([7]));
        let reader = local(2, AccessSet::reads([7]));
        let disjoint = local(3, AccessSet::reads([8]));
        assert!(!checker.can_execute(&dtxn, &reader, 0));
        assert!(checker.can_execute(&dtxn, &disjoint, 0));
    }

    #[test]
    fn table_checker_is_conservative_about_empty_footprints() {
        let checker = TableConflictChecker;
        let dtxn = local(1, AccessSet::writes([7]));
        let unknown = local(2, AccessSet::default());
        assert!(!checker.can_execute(&dtxn, &unknown, 0));
    }

    #[test]
    fn table_checker_ignores_system_procedures() {
        let checker = TableConflictChecker;
        assert!(checker.should_ignore_procedure(&procedure("AdHoc", true)));
        assert!(!checker.should_ignore_procedure(&procedure("Pay", false)));
    }

    #[test]
    fn allow_all_checker_always_permits() {
        let checker = AllowAllChecker;
        let dtxn = local(1, AccessSet::writes([7]));
        let candidate = local(2, AccessSet::writes([7]));
        assert!(checker.can_execute(&dtxn, &candidate, 0));
        assert!(!checker.should_ignore_procedure(&procedure("AdHoc", true)));
    }
}
