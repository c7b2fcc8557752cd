//! The unit of work bound to a slot.

use std::time::Instant;

use crate::ids::ExecutionId;

/// One execution attempt of a scheduled task.
///
/// The slot treats this as opaque: it only stores the reference that wins the
/// bind. Gateways read the id and task name to dispatch it.
#[derive(Debug)]
pub struct Execution {
    id: ExecutionId,
    task_name: String,
    attempt: u32,
    created_at: Instant,
}

impl Execution {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self::with_attempt(task_name, 0)
    }

    pub fn with_attempt(task_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            id: ExecutionId::new(),
            task_name: task_name.into(),
            attempt,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
