use thiserror::Error;

use crate::ids::{AllocationId, ExecutionId};

/// Invalid arguments supplied when constructing a slot.
///
/// These are programming errors at the call site, never runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("invalid argument: worker endpoint is required")]
    MissingWorkerEndpoint,

    #[error("invalid argument: allocation id is required")]
    MissingAllocationId,

    #[error("invalid argument: slot number must be non-negative, got {0}")]
    NegativeSlotNumber(i64),

    #[error("invalid argument: slot number {0} exceeds the supported range")]
    SlotNumberOutOfRange(i64),
}

pub type Result<T> = std::result::Result<T, SlotError>;

/// Failures reported by a worker gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("worker rejected execution {execution}: {reason}")]
    Rejected {
        execution: ExecutionId,
        reason: String,
    },

    #[error("worker does not know allocation {0}")]
    UnknownAllocation(AllocationId),
}
