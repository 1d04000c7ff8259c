use thiserror::Error;

use crate::models::Batch;
use crate::oracle::OracleError;
use crate::packing::recorder::RecorderError;

/// Why a packing session stopped early.
///
/// Capacity rejections never appear here: they are absorbed by the controller
/// as batch splits.
#[derive(Debug, Error)]
pub enum PackingError {
    #[error("Order has no items")]
    EmptyOrder,

    #[error("'{identity}' does not fit on an empty build plate")]
    SingleUnitInfeasible { identity: String },

    #[error("Layout service rejected '{identity}': {reason}")]
    AdmissionFailed { identity: String, reason: String },

    #[error("Layout service unavailable during {operation}: {source}")]
    ServiceUnavailable {
        operation: &'static str,
        #[source]
        source: OracleError,
    },

    #[error("Failed to save batch {batch_index}: {source}")]
    Persistence {
        batch_index: u32,
        #[source]
        source: OracleError,
    },

    #[error("Batch bookkeeping error: {0}")]
    Bookkeeping(#[from] RecorderError),
}

impl PackingError {
    pub(crate) fn service(operation: &'static str, source: OracleError) -> Self {
        PackingError::ServiceUnavailable { operation, source }
    }

    /// Stable code used in summaries and logs.
    pub fn code(&self) -> &'static str {
        match self {
            PackingError::EmptyOrder => "EMPTY_ORDER",
            PackingError::SingleUnitInfeasible { .. } => "SINGLE_UNIT_INFEASIBLE",
            PackingError::AdmissionFailed { .. } => "ADMISSION_FAILED",
            PackingError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            PackingError::Persistence { .. } => "PERSISTENCE_ERROR",
            PackingError::Bookkeeping(_) => "BOOKKEEPING_ERROR",
        }
    }
}

/// A failed session together with every batch persisted before the failure.
///
/// The batches are valid artifacts; the caller decides whether the order is
/// retried, completed by hand, or flagged.
#[derive(Debug, Error)]
#[error("Session for order {order_id} failed after {} persisted batch(es): {error}", .batches.len())]
pub struct SessionFailure {
    pub order_id: String,
    #[source]
    pub error: PackingError,
    pub batches: Vec<Batch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_failure_message_counts_batches() {
        let failure = SessionFailure {
            order_id: "1000385".to_string(),
            error: PackingError::SingleUnitInfeasible {
                identity: "base.stl".to_string(),
            },
            batches: vec![],
        };
        let message = failure.to_string();
        assert!(message.contains("1000385"));
        assert!(message.contains("0 persisted"));
        assert!(message.contains("base.stl"));
    }

    #[test]
    fn test_codes_are_distinct_for_capacity_and_service_faults() {
        let infeasible = PackingError::SingleUnitInfeasible {
            identity: "a".to_string(),
        };
        let fatal = PackingError::AdmissionFailed {
            identity: "a".to_string(),
            reason: "timeout".to_string(),
        };
        assert_ne!(infeasible.code(), fatal.code());
        assert_eq!(PackingError::EmptyOrder.code(), "EMPTY_ORDER");
    }
}
