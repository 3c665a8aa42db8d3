mod handler;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use alloy::sol_types::Eip712Domain;
use contract_client::signature::{approval_domain, ApprovalRequest, SignedApproval, DEFAULT_CHAIN_ID};
use contract_client::HustleReader;
use dashmap::DashMap;
use hustle_core::error::ErrorKind;
use hustle_core::ids::TaskId;
use hustle_core::time::unix_timestamp;
use hustle_core::HustleError;
use serde::Serialize;
use tokio::sync::broadcast;

pub use session::{Session, Wallet};

pub struct ApprovalConfig {
    pub chain_id: u64,
    pub contract_address: Address,
    pub read_timeout: Duration,
    pub signing_timeout: Duration,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            contract_address: Address::ZERO,
            read_timeout: Duration::from_secs(15),
            signing_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Client sends `approveTask` and pays gas.
    Direct,
    /// Client signs off-chain, any party relays `approveTaskWithSignature`.
    Signature,
    /// Worker or client files `fileDispute`.
    Dispute,
}

/// Where a task's current write attempt stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ApprovalStage {
    Idle,
    AwaitingSignature {
        attempt: u64,
        request: ApprovalRequest,
    },
    SignatureReady {
        attempt: u64,
        approval: SignedApproval,
    },
    Submitting {
        attempt: u64,
        mode: SubmissionMode,
    },
    Confirming {
        attempt: u64,
        mode: SubmissionMode,
        tx_hash: TxHash,
    },
    Succeeded {
        mode: SubmissionMode,
        tx_hash: TxHash,
    },
    Failed {
        attempt: u64,
        mode: SubmissionMode,
        kind: ErrorKind,
        reason: String,
        retryable: bool,
        /// Kept so a failed relay can be retried without signing again.
        approval: Option<SignedApproval>,
    },
}

impl ApprovalStage {
    pub fn attempt(&self) -> Option<u64> {
        match self {
            ApprovalStage::AwaitingSignature { attempt, .. }
            | ApprovalStage::SignatureReady { attempt, .. }
            | ApprovalStage::Submitting { attempt, .. }
            | ApprovalStage::Confirming { attempt, .. }
            | ApprovalStage::Failed { attempt, .. } => Some(*attempt),
            ApprovalStage::Idle | ApprovalStage::Succeeded { .. } => None,
        }
    }

    /// A write or signature request is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ApprovalStage::AwaitingSignature { .. }
                | ApprovalStage::Submitting { .. }
                | ApprovalStage::Confirming { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApprovalStage::Succeeded { .. } | ApprovalStage::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApprovalStage::Idle => "Idle",
            ApprovalStage::AwaitingSignature { .. } => "Signing...",
            ApprovalStage::SignatureReady { .. } => "Signature ready",
            ApprovalStage::Submitting {
                mode: SubmissionMode::Dispute,
                ..
            } => "Filing dispute...",
            ApprovalStage::Submitting { .. } => "Approving...",
            ApprovalStage::Confirming { .. } => "Confirming...",
            ApprovalStage::Succeeded {
                mode: SubmissionMode::Dispute,
                ..
            } => "Dispute filed",
            ApprovalStage::Succeeded { .. } => "Approved",
            ApprovalStage::Failed { .. } => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageEvent {
    pub task_id: TaskId,
    pub label: &'static str,
    pub stage: ApprovalStage,
}

/// Drives approval and dispute writes for tasks, one attempt per task at a
/// time.
pub struct ApprovalOrchestrator {
    reader: Arc<dyn HustleReader>,
    session: Session,
    attempts: DashMap<TaskId, ApprovalStage>,
    domain: Eip712Domain,
    config: ApprovalConfig,
    next_attempt: AtomicU64,
    events: broadcast::Sender<StageEvent>,
}

impl ApprovalOrchestrator {
    pub fn new(reader: Arc<dyn HustleReader>, session: Session, config: ApprovalConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            reader,
            session,
            attempts: DashMap::new(),
            domain: approval_domain(config.chain_id, config.contract_address),
            config,
            next_attempt: AtomicU64::new(1),
            events,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn stage(&self, task_id: TaskId) -> ApprovalStage {
        self.attempts
            .get(&task_id)
            .map(|s| s.value().clone())
            .unwrap_or(ApprovalStage::Idle)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    /// Drops a stuck or finished attempt so a new one can start. Writes that
    /// already reached the provider cannot be abandoned.
    pub fn abandon(&self, task_id: TaskId) -> Result<ApprovalStage, HustleError> {
        if let Some(entry) = self.attempts.get(&task_id) {
            if matches!(
                entry.value(),
                ApprovalStage::Submitting { .. } | ApprovalStage::Confirming { .. }
            ) {
                return Err(HustleError::InFlight(entry.value().label().to_string()));
            }
        }

        let previous = self
            .attempts
            .remove_if(&task_id, |_, stage| {
                !matches!(
                    stage,
                    ApprovalStage::Submitting { .. } | ApprovalStage::Confirming { .. }
                )
            })
            .map(|(_, stage)| stage)
            .unwrap_or(ApprovalStage::Idle);

        tracing::info!(%task_id, previous = previous.label(), "approval attempt abandoned");
        self.publish(task_id, ApprovalStage::Idle);
        Ok(previous)
    }

    /// Failed → Idle, or back to SignatureReady when the failed relay still
    /// holds a live signature.
    pub fn retry(&self, task_id: TaskId) -> Result<ApprovalStage, HustleError> {
        let now = unix_timestamp();
        let next = {
            let mut entry = self
                .attempts
                .get_mut(&task_id)
                .ok_or_else(|| HustleError::InvalidState("no failed attempt to retry".into()))?;

            let next = match entry.value() {
                ApprovalStage::Failed {
                    attempt,
                    approval: Some(approval),
                    ..
                } if approval.request.is_live_at(now) => ApprovalStage::SignatureReady {
                    attempt: *attempt,
                    approval: approval.clone(),
                },
                ApprovalStage::Failed { .. } => ApprovalStage::Idle,
                other => {
                    return Err(HustleError::InvalidState(format!(
                        "cannot retry from {}",
                        other.label()
                    )))
                }
            };
            *entry = next.clone();
            next
        };

        self.publish(task_id, next.clone());
        Ok(next)
    }

    fn allocate_attempt(&self) -> u64 {
        self.next_attempt.fetch_add(1, Ordering::SeqCst)
    }

    /// Applies `next` only while `attempt` still owns the task.
    fn transition(&self, task_id: TaskId, attempt: u64, next: ApprovalStage) -> bool {
        let applied = match self.attempts.get_mut(&task_id) {
            Some(mut entry) if entry.value().attempt() == Some(attempt) => {
                *entry = next.clone();
                true
            }
            _ => false,
        };

        if applied {
            self.publish(task_id, next);
        } else {
            tracing::debug!(%task_id, attempt, "stale attempt, transition dropped");
        }
        applied
    }

    fn publish(&self, task_id: TaskId, stage: ApprovalStage) {
        let _ = self.events.send(StageEvent {
            task_id,
            label: stage.label(),
            stage,
        });
    }
}
