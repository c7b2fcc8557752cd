//! Worker endpoint - where a slot lives and how work reaches it.
//!
//! A slot only stores and hands back its endpoint. Dispatching work through
//! the gateway is the scheduler's business.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::execution::Execution;
use crate::ids::{AllocationId, ExecutionId, ResourceId};

/// Network location of a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerLocation {
    resource_id: ResourceId,
    host: String,
    data_port: u16,
}

impl WorkerLocation {
    pub fn new(resource_id: ResourceId, host: impl Into<String>, data_port: u16) -> Self {
        Self {
            resource_id,
            host: host.into(),
            data_port,
        }
    }

    /// Location of a worker running in this process.
    pub fn local() -> Self {
        Self::new(ResourceId::new(), "127.0.0.1", 0)
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.data_port)
    }
}

impl fmt::Display for WorkerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address(), self.resource_id)
    }
}

/// Positive reply from a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge;

/// Dispatch channel to one worker.
#[async_trait]
pub trait WorkerGateway: Send + Sync {
    /// Address the gateway talks to.
    fn address(&self) -> &str;

    async fn submit_execution(
        &self,
        allocation_id: AllocationId,
        execution: &Execution,
    ) -> Result<Acknowledge, GatewayError>;

    async fn cancel_execution(&self, execution_id: ExecutionId)
    -> Result<Acknowledge, GatewayError>;

    /// Tell the worker the allocation is no longer needed.
    async fn free_slot(
        &self,
        allocation_id: AllocationId,
        cause: &str,
    ) -> Result<Acknowledge, GatewayError>;
}

/// Gateway that acknowledges every request without leaving the process.
///
/// Counts what it was asked to do so callers can assert on dispatch.
#[derive(Debug, Default)]
pub struct AckingGateway {
    address: String,
    submitted: AtomicUsize,
    canceled: AtomicUsize,
    freed: AtomicUsize,
}

impl AckingGateway {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn canceled(&self) -> usize {
        self.canceled.load(Ordering::Acquire)
    }

    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl WorkerGateway for AckingGateway {
    fn address(&self) -> &str {
        &self.address
    }

    async fn submit_execution(
        &self,
        allocation_id: AllocationId,
        execution: &Execution,
    ) -> Result<Acknowledge, GatewayError> {
        self.submitted.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            allocation = %allocation_id,
            execution = %execution.id(),
            task = execution.task_name(),
            "Acknowledged execution"
        );
        Ok(Acknowledge)
    }

    async fn cancel_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Acknowledge, GatewayError> {
        self.canceled.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(execution = %execution_id, "Acknowledged cancel");
        Ok(Acknowledge)
    }

    async fn free_slot(
        &self,
        allocation_id: AllocationId,
        cause: &str,
    ) -> Result<Acknowledge, GatewayError> {
        self.freed.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(allocation = %allocation_id, cause, "Acknowledged free slot");
        Ok(Acknowledge)
    }
}

/// Location plus gateway of the worker that owns a slot.
///
/// Cloning shares the gateway; many slots on the same worker hold the same one.
#[derive(Clone)]
pub struct WorkerEndpoint {
    location: WorkerLocation,
    gateway: Arc<dyn WorkerGateway>,
}

impl WorkerEndpoint {
    pub fn new(location: WorkerLocation, gateway: Arc<dyn WorkerGateway>) -> Self {
        Self { location, gateway }
    }

    /// In-process worker answered by an [`AckingGateway`].
    pub fn local() -> Self {
        let location = WorkerLocation::local();
        let gateway = Arc::new(AckingGateway::new(location.address()));
        Self::new(location, gateway)
    }

    pub fn location(&self) -> &WorkerLocation {
        &self.location
    }

    pub fn gateway(&self) -> &Arc<dyn WorkerGateway> {
        &self.gateway
    }
}

impl fmt::Debug for WorkerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerEndpoint")
            .field("location", &self.location)
            .field("gateway", &self.gateway.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_location_uses_loopback() {
        let location = WorkerLocation::local();
        assert_eq!(location.host(), "127.0.0.1");
        assert_eq!(location.data_port(), 0);
        assert_eq!(location.address(), "127.0.0.1:0");
    }

    #[test]
    fn endpoint_clone_shares_gateway() {
        let endpoint = WorkerEndpoint::local();
        let copy = endpoint.clone();
        assert!(Arc::ptr_eq(endpoint.gateway(), copy.gateway()));
        assert_eq!(endpoint.location(), copy.location());
    }

    #[tokio::test]
    async fn acking_gateway_counts_requests() {
        let gateway = AckingGateway::new("10.0.0.5:6121");
        let exec = Execution::new("source-1");
        let allocation = AllocationId::new();

        assert_eq!(
            gateway.submit_execution(allocation, &exec).await,
            Ok(Acknowledge)
        );
        gateway.cancel_execution(exec.id()).await.unwrap();
        gateway.free_slot(allocation, "job finished").await.unwrap();

        assert_eq!(gateway.address(), "10.0.0.5:6121");
        assert_eq!(gateway.submitted(), 1);
        assert_eq!(gateway.canceled(), 1);
        assert_eq!(gateway.freed(), 1);
    }
}
