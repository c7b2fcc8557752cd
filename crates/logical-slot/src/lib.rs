//! logical-slot: single-assignment slot handles for cluster schedulers.
//!
//! A [`LogicalSlot`] stands for one reserved unit of compute on a worker. The
//! scheduler binds at most one [`Execution`] to it and releases it exactly
//! once; observers learn about the release through a one-shot
//! [`ReleaseSignal`].

mod execution;
mod release;
mod slot;

pub mod endpoint;
pub mod error;
pub mod ids;
pub mod stress;
pub mod telemetry;

pub use endpoint::{AckingGateway, Acknowledge, WorkerEndpoint, WorkerGateway, WorkerLocation};
pub use error::{GatewayError, SlotError};
pub use execution::Execution;
pub use ids::{AllocationId, ExecutionId, ResourceId};
pub use release::ReleaseSignal;
pub use slot::{LogicalSlot, LogicalSlotBuilder, SlotSnapshot, SlotState};
pub use stress::{
    LOGICAL_SLOT_VERSION, StressConfig, StressError, StressReport, run_stress,
    run_stress_with_gateway,
};
