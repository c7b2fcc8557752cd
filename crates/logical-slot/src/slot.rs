//! LogicalSlot - one reserved unit of compute on a worker.
//!
//! Two mutations over its life, both monotone:
//! - bind: the first `set_execution` wins, every later call is refused
//! - release: the first `release_slot` completes the signal, the rest are no-ops
//!
//! Binding and release are independent. A released slot with nothing bound
//! still accepts its single bind.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::endpoint::{WorkerEndpoint, WorkerGateway, WorkerLocation};
use crate::error::{Result, SlotError};
use crate::execution::Execution;
use crate::ids::{AllocationId, ExecutionId};
use crate::release::ReleaseSignal;

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    /// Reserved and usable.
    Active,
    /// Reclaimed. Terminal.
    Released,
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
        }
    }
}

/// Point-in-time view of a slot for logs and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub allocation_id: AllocationId,
    pub slot_number: u32,
    pub worker: String,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionId>,
}

/// Handle to one resource reservation.
///
/// Shared behind `Arc` by every scheduler component that needs it; all
/// operations take `&self`.
pub struct LogicalSlot {
    worker_endpoint: WorkerEndpoint,
    slot_number: u32,
    allocation_id: AllocationId,
    execution: OnceLock<Arc<Execution>>,
    release: ReleaseSignal,
}

impl LogicalSlot {
    pub fn new(
        worker_endpoint: WorkerEndpoint,
        slot_number: u32,
        allocation_id: AllocationId,
    ) -> Self {
        tracing::trace!(
            allocation = %allocation_id,
            slot = slot_number,
            worker = %worker_endpoint.location(),
            "Slot allocated"
        );
        Self {
            worker_endpoint,
            slot_number,
            allocation_id,
            execution: OnceLock::new(),
            release: ReleaseSignal::new(),
        }
    }

    /// Slot 0 on an in-process worker with a fresh allocation id.
    pub fn local() -> Self {
        Self::new(WorkerEndpoint::local(), 0, AllocationId::new())
    }

    pub fn builder() -> LogicalSlotBuilder {
        LogicalSlotBuilder::default()
    }

    pub fn worker_endpoint(&self) -> &WorkerEndpoint {
        &self.worker_endpoint
    }

    pub fn location(&self) -> &WorkerLocation {
        self.worker_endpoint.location()
    }

    pub fn gateway(&self) -> &Arc<dyn WorkerGateway> {
        self.worker_endpoint.gateway()
    }

    pub fn allocation_id(&self) -> AllocationId {
        self.allocation_id
    }

    pub fn physical_slot_number(&self) -> u32 {
        self.slot_number
    }

    pub fn is_alive(&self) -> bool {
        !self.release.is_released()
    }

    /// Same signal as [`is_released`](Self::is_released). Cancellation before
    /// use and release after use are not told apart.
    pub fn is_canceled(&self) -> bool {
        self.release.is_released()
    }

    pub fn is_released(&self) -> bool {
        self.release.is_released()
    }

    pub fn state(&self) -> SlotState {
        if self.release.is_released() {
            SlotState::Released
        } else {
            SlotState::Active
        }
    }

    /// Bind `execution` to this slot.
    ///
    /// Returns `true` for exactly one call over the slot's lifetime. Callers
    /// that get `false` must not retry; the slot is already spoken for, even
    /// if they passed the very same execution.
    pub fn set_execution(&self, execution: Arc<Execution>) -> bool {
        let execution_id = execution.id();
        match self.execution.set(execution) {
            Ok(()) => {
                tracing::debug!(
                    allocation = %self.allocation_id,
                    slot = self.slot_number,
                    execution = %execution_id,
                    "Execution bound to slot"
                );
                true
            }
            Err(_refused) => {
                tracing::trace!(
                    allocation = %self.allocation_id,
                    execution = %execution_id,
                    "Slot already bound, refusing execution"
                );
                false
            }
        }
    }

    /// The bound execution, if any.
    pub fn execution(&self) -> Option<Arc<Execution>> {
        self.execution.get().cloned()
    }

    /// Release the slot. Safe to call any number of times from any thread.
    pub fn release_slot(&self) {
        if self.release.complete() {
            tracing::debug!(
                allocation = %self.allocation_id,
                slot = self.slot_number,
                "Slot released"
            );
        }
    }

    /// Detached handle on the release signal.
    pub fn release_signal(&self) -> ReleaseSignal {
        self.release.clone()
    }

    /// Wait until the slot is released.
    pub async fn released(&self) {
        self.release.wait().await;
    }

    /// Owned future that resolves once the slot is released.
    pub fn released_owned(&self) -> impl Future<Output = ()> + Send + 'static {
        self.release.wait_owned()
    }

    /// Run `callback` once after the slot is released.
    ///
    /// Needs no runtime. If the slot is already released the callback runs
    /// before this returns.
    pub fn on_release<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.release.on_release(callback)
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            allocation_id: self.allocation_id,
            slot_number: self.slot_number,
            worker: self.location().address(),
            state: self.state(),
            execution: self.execution.get().map(|e| e.id()),
        }
    }
}

impl Default for LogicalSlot {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Debug for LogicalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalSlot")
            .field("allocation_id", &self.allocation_id)
            .field("slot_number", &self.slot_number)
            .field("worker", self.location())
            .field("state", &self.state())
            .field("execution", &self.execution.get().map(|e| e.id()))
            .finish()
    }
}

/// Fallible construction for callers whose inputs may be missing, such as
/// values decoded from a worker's offer.
#[derive(Debug, Default)]
pub struct LogicalSlotBuilder {
    worker_endpoint: Option<WorkerEndpoint>,
    slot_number: i64,
    allocation_id: Option<AllocationId>,
}

impl LogicalSlotBuilder {
    pub fn worker_endpoint(mut self, endpoint: WorkerEndpoint) -> Self {
        self.worker_endpoint = Some(endpoint);
        self
    }

    pub fn slot_number(mut self, slot_number: i64) -> Self {
        self.slot_number = slot_number;
        self
    }

    pub fn allocation_id(mut self, allocation_id: AllocationId) -> Self {
        self.allocation_id = Some(allocation_id);
        self
    }

    pub fn build(self) -> Result<LogicalSlot> {
        let worker_endpoint = self
            .worker_endpoint
            .ok_or(SlotError::MissingWorkerEndpoint)?;
        let allocation_id = self.allocation_id.ok_or(SlotError::MissingAllocationId)?;
        if self.slot_number < 0 {
            return Err(SlotError::NegativeSlotNumber(self.slot_number));
        }
        let slot_number = u32::try_from(self.slot_number)
            .map_err(|_| SlotError::SlotNumberOutOfRange(self.slot_number))?;

        Ok(LogicalSlot::new(worker_endpoint, slot_number, allocation_id))
    }
}
