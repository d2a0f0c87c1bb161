//! Error model for batch planning.

use thiserror::Error;

/// Result type returned by the planner's public interfaces.
pub type PlanResult<T> = Result<T, PlanError>;

/// Failures surfaced while planning one statement batch.
///
/// `Mispredict` is recoverable: the caller restarts the transaction as
/// multi-partition. The other variants abort the client request.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The caller predicted single-partition but planning proved the batch
    /// touches more than one partition.
    #[error("mispredicted single-partition transaction {txn_id}")]
    Mispredict { txn_id: i64 },

    /// The partition estimator or the catalog is inconsistent. Fatal to this
    /// plan but not to the process.
    #[error("planning statement {stmt_index} of `{procedure}`: {source}")]
    Planning {
        procedure: String,
        stmt_index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Parameter serialization failed while assembling fragment task
    /// messages.
    #[error("serializing parameters for statement {stmt_index} of `{procedure}`: {source}")]
    Serialization {
        procedure: String,
        stmt_index: usize,
        #[source]
        source: anyhow::Error,
    },
}
