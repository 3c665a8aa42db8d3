use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::enums::{DifficultyLabel, DisputeStatus, TaskCategory, TaskStatus};
use crate::error::HustleError;
use crate::ids::TaskId;

/// `getTask` return tuple, untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTask {
    pub worker: Address,
    pub client: Address,
    pub timestamp: u64,
    pub deadline: u64,
    pub status: u8,
    pub category: u8,
    pub difficulty_weight: u16,
    pub proof_reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub worker: Address,
    pub client: Address,
    pub timestamp: u64,
    pub deadline: u64,
    pub status: TaskStatus,
    pub category: TaskCategory,
    pub difficulty_weight: u16,
    pub proof_reference: String,
}

impl Task {
    /// An unset slot in the contract's task mapping reads back with a zero
    /// worker; that is reported as `None` rather than as a task.
    pub fn from_raw(id: TaskId, raw: RawTask) -> Result<Option<Self>, HustleError> {
        if raw.worker == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(Self {
            id,
            worker: raw.worker,
            client: raw.client,
            timestamp: raw.timestamp,
            deadline: raw.deadline,
            status: TaskStatus::from_index(raw.status)?,
            category: TaskCategory::from_index(raw.category)?,
            difficulty_weight: raw.difficulty_weight,
            proof_reference: raw.proof_reference,
        }))
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.deadline.saturating_mul(1000)
    }
}

/// Outcome of a single task read. Absence is a normal result, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskLookup {
    Found(Task),
    NotFound(TaskId),
}

impl TaskLookup {
    pub fn into_result(self) -> Result<Task, HustleError> {
        match self {
            TaskLookup::Found(task) => Ok(task),
            TaskLookup::NotFound(id) => Err(HustleError::NotFound(format!("task {id}"))),
        }
    }
}

/// Presentation state of a task relative to the viewing wallet.
///
/// Never cached across reads: the viewer can change at any time, so the
/// view is rebuilt whenever either the task or the viewer changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub task: Task,
    pub is_expired: bool,
    pub is_client: bool,
    pub is_worker: bool,
    pub display_status: TaskStatus,
    pub category_label: &'static str,
    pub difficulty: DifficultyLabel,
}

impl TaskView {
    pub fn derive(task: Task, viewer: Option<Address>, now_ms: u64) -> Self {
        let is_expired = task.is_expired_at(now_ms);
        let is_client = viewer.is_some_and(|v| v == task.client);
        let is_worker = viewer.is_some_and(|v| v == task.worker);

        let display_status = if task.status == TaskStatus::Pending && is_expired {
            TaskStatus::Expired
        } else {
            task.status
        };

        Self {
            category_label: task.category.label(),
            difficulty: DifficultyLabel::for_weight(task.difficulty_weight),
            task,
            is_expired,
            is_client,
            is_worker,
            display_status,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.task.status == TaskStatus::Pending && !self.is_expired
    }

    pub fn can_approve(&self) -> bool {
        self.is_client && self.is_actionable()
    }

    pub fn can_dispute(&self) -> bool {
        (self.is_client || self.is_worker) && self.is_actionable()
    }
}

/// One page of ids from `getTasksByWorker` / `getTasksByClient`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPage {
    pub task_ids: Vec<TaskId>,
    pub total: u64,
}

/// `getDispute` return tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDispute {
    pub initiator: Address,
    pub created_at: u64,
    pub resolved_at: u64,
    pub status: u8,
    pub evidence: String,
    pub resolver: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub task_id: TaskId,
    pub initiator: Address,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
    pub status: DisputeStatus,
    pub evidence: String,
    pub resolver: Option<Address>,
}

impl Dispute {
    pub fn from_raw(task_id: TaskId, raw: RawDispute) -> Result<Option<Self>, HustleError> {
        if raw.initiator == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(Self {
            task_id,
            initiator: raw.initiator,
            created_at: raw.created_at,
            resolved_at: (raw.resolved_at != 0).then_some(raw.resolved_at),
            status: DisputeStatus::from_index(raw.status)?,
            evidence: raw.evidence,
            resolver: (raw.resolver != Address::ZERO).then_some(raw.resolver),
        }))
    }
}
