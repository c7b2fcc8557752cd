//! Bind-race harness.
//!
//! Allocates a batch of slots on one worker, lets many callers race to bind
//! each slot, dispatches every winner through the worker's gateway, then
//! releases every slot from several tasks at once and waits for the release
//! signals. A run fails unless every slot ends with exactly one winner and
//! exactly one release notification.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;

use crate::endpoint::{AckingGateway, WorkerEndpoint, WorkerGateway, WorkerLocation};
use crate::error::GatewayError;
use crate::execution::Execution;
use crate::ids::{AllocationId, ResourceId};
use crate::slot::{LogicalSlot, SlotSnapshot};

/// Crate version from Cargo.toml
pub const LOGICAL_SLOT_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_CALLERS: usize = 32;
const DEFAULT_SLOTS: usize = 4;
const RELEASERS_PER_SLOT: usize = 3;

#[derive(Debug, Error)]
pub enum StressError {
    /// Bad command line. An empty message means help was requested.
    #[error("{0}")]
    Usage(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("slot {slot} ended with {winners} bound executions, expected exactly 1")]
    InvariantViolated { slot: u32, winners: usize },

    #[error("release continuations fired {fired} times for {slots} slots")]
    ReleaseMismatch { fired: usize, slots: usize },

    #[error("caller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressConfig {
    /// Callers racing to bind each slot.
    pub callers: usize,
    pub slots: usize,
    pub worker_host: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            callers: env_count("SLOT_STRESS_CALLERS", std::env::var("SLOT_STRESS_CALLERS").ok())
                .unwrap_or(DEFAULT_CALLERS),
            slots: env_count("SLOT_STRESS_SLOTS", std::env::var("SLOT_STRESS_SLOTS").ok())
                .unwrap_or(DEFAULT_SLOTS),
            worker_host: std::env::var("SLOT_STRESS_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
        }
    }
}

fn env_count(key: &str, raw: Option<String>) -> Option<usize> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(
                var = key,
                value = %raw,
                error = %e,
                "Ignoring unparseable count, using default"
            );
            None
        }
    }
}

impl StressConfig {
    /// Apply command-line flags on top of the environment defaults.
    ///
    /// `args[0]` is the program name and is skipped.
    pub fn from_args(args: &[String]) -> Result<Self, StressError> {
        Self::default().with_args(args)
    }

    pub fn with_args(mut self, args: &[String]) -> Result<Self, StressError> {
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--callers" => {
                    i += 1;
                    self.callers = parse_count(args.get(i), "--callers")?;
                }
                "--slots" => {
                    i += 1;
                    self.slots = parse_count(args.get(i), "--slots")?;
                }
                "--host" => {
                    i += 1;
                    self.worker_host = args
                        .get(i)
                        .ok_or_else(|| StressError::Usage("--host requires a value".to_string()))?
                        .clone();
                }
                "--help" | "-h" => return Err(StressError::Usage(String::new())),
                arg => return Err(StressError::Usage(format!("unexpected argument: {arg}"))),
            }
            i += 1;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), StressError> {
        if self.callers == 0 {
            return Err(StressError::InvalidConfig(
                "callers must be at least 1".to_string(),
            ));
        }
        if self.slots == 0 {
            return Err(StressError::InvalidConfig(
                "slots must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.slots).is_err() {
            return Err(StressError::InvalidConfig(format!(
                "slots must fit in u32, got {}",
                self.slots
            )));
        }
        if self.slots.checked_mul(self.callers).is_none() {
            return Err(StressError::InvalidConfig(format!(
                "{} slots x {} callers overflows the attempt count",
                self.slots, self.callers
            )));
        }
        if self.worker_host.is_empty() {
            return Err(StressError::InvalidConfig(
                "worker host must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_count(value: Option<&String>, flag: &str) -> Result<usize, StressError> {
    let value = value.ok_or_else(|| StressError::Usage(format!("{flag} requires a value")))?;
    value
        .parse()
        .map_err(|_| StressError::Usage(format!("{flag} expects a number, got '{value}'")))
}

/// Outcome of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub version: &'static str,
    pub worker_host: String,
    pub slots: usize,
    pub callers_per_slot: usize,
    pub attempts: usize,
    pub bound: usize,
    pub refused: usize,
    pub dispatched: usize,
    pub released: usize,
    pub freed: usize,
    pub elapsed_ms: u64,
    pub final_states: Vec<SlotSnapshot>,
}

/// Run against an in-process worker that acknowledges everything.
pub async fn run_stress(config: &StressConfig) -> Result<StressReport, StressError> {
    let address = format!("{}:0", config.worker_host);
    run_stress_with_gateway(config, Arc::new(AckingGateway::new(address))).await
}

/// Run against `gateway`. Any gateway error aborts the run.
pub async fn run_stress_with_gateway(
    config: &StressConfig,
    gateway: Arc<dyn WorkerGateway>,
) -> Result<StressReport, StressError> {
    config.validate()?;
    let started = Instant::now();

    let location = WorkerLocation::new(ResourceId::new(), config.worker_host.clone(), 0);
    let endpoint = WorkerEndpoint::new(location, gateway);

    let slots = (0..config.slots)
        .map(|i| {
            let slot_number = u32::try_from(i)
                .map_err(|_| StressError::InvalidConfig(format!("slot index {i} overflows")))?;
            Ok(Arc::new(LogicalSlot::new(
                endpoint.clone(),
                slot_number,
                AllocationId::new(),
            )))
        })
        .collect::<Result<Vec<_>, StressError>>()?;

    tracing::info!(
        slots = config.slots,
        callers = config.callers,
        worker = %endpoint.location(),
        "Starting bind race"
    );

    let fired = Arc::new(AtomicUsize::new(0));
    for slot in &slots {
        let fired = Arc::clone(&fired);
        slot.on_release(move || {
            fired.fetch_add(1, Ordering::AcqRel);
        });
    }

    let binds = slots.iter().enumerate().flat_map(|(index, slot)| {
        (0..config.callers).map(move |caller| {
            let slot = Arc::clone(slot);
            tokio::spawn(async move {
                let execution = Arc::new(Execution::new(format!("stress-{index}-{caller}")));
                (index, slot.set_execution(execution))
            })
        })
    });
    let outcomes = join_all(binds.collect::<Vec<_>>()).await;

    let mut winners = vec![0usize; slots.len()];
    for outcome in outcomes {
        let (index, won) = outcome?;
        if won {
            winners[index] += 1;
        }
    }

    for (slot, count) in slots.iter().zip(&winners) {
        if *count != 1 {
            tracing::error!(
                allocation = %slot.allocation_id(),
                winners = count,
                "Bind race broke single assignment"
            );
            return Err(StressError::InvariantViolated {
                slot: slot.physical_slot_number(),
                winners: *count,
            });
        }
    }
    let bound: usize = winners.iter().sum();

    let mut dispatched = 0;
    for slot in &slots {
        if let Some(execution) = slot.execution() {
            slot.gateway()
                .submit_execution(slot.allocation_id(), &execution)
                .await?;
            dispatched += 1;
        }
    }

    let releases = slots.iter().flat_map(|slot| {
        (0..RELEASERS_PER_SLOT).map(move |_| {
            let slot = Arc::clone(slot);
            tokio::spawn(async move { slot.release_slot() })
        })
    });
    for result in join_all(releases.collect::<Vec<_>>()).await {
        result?;
    }

    let mut freed = 0;
    for slot in &slots {
        slot.released().await;
        slot.gateway()
            .free_slot(slot.allocation_id(), "stress run complete")
            .await?;
        freed += 1;
    }

    let released = fired.load(Ordering::Acquire);
    if released != slots.len() {
        return Err(StressError::ReleaseMismatch {
            fired: released,
            slots: slots.len(),
        });
    }

    let attempts = winners.len() * config.callers;
    let report = StressReport {
        version: LOGICAL_SLOT_VERSION,
        worker_host: config.worker_host.clone(),
        slots: slots.len(),
        callers_per_slot: config.callers,
        attempts,
        bound,
        refused: attempts - bound,
        dispatched,
        released,
        freed,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        final_states: slots.iter().map(|s| s.snapshot()).collect(),
    };

    tracing::info!(
        bound = report.bound,
        refused = report.refused,
        released = report.released,
        elapsed_ms = report.elapsed_ms,
        "Bind race finished"
    );

    Ok(report)
}
