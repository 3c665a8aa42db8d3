//! In-memory stand-in for the deployed contract.
//!
//! Several `MockContract` handles can share one chain state, each acting as
//! a different sender. Confirmation can be held open to observe in-flight
//! stages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::sol_types::Eip712Domain;
use async_trait::async_trait;
use hustle_core::enums::{DisputeStatus, TaskCategory, TaskStatus};
use hustle_core::ids::TaskId;
use hustle_core::reputation::{HustleScore, ReputationData};
use hustle_core::task::{Dispute, Task, TaskLookup, TaskPage};
use hustle_core::time::unix_timestamp;
use tokio::sync::watch;

use crate::signature::{approval_domain, ApprovalRequest, SignedApproval};
use crate::{ContractError, HustleReader, HustleWriter, NewTask, RevertReason, WriteReceipt};

pub const MOCK_CREATION_FEE: u64 = 200_000_000_000_000;
pub const MOCK_DISPUTE_FEE: u64 = 500_000_000_000_000;

/// Write as recorded by the mock, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    CreateTask { from: Address, task: NewTask, fee: U256 },
    Approve { from: Address, task_id: TaskId },
    ApproveWithSignature { from: Address, task_id: TaskId, deadline: u64 },
    FileDispute { from: Address, task_id: TaskId, evidence: String },
    MarkExpired { from: Address, task_ids: Vec<TaskId> },
}

#[derive(Default)]
struct ChainState {
    tasks: HashMap<TaskId, Task>,
    scores: HashMap<Address, HustleScore>,
    reputation: HashMap<Address, ReputationData>,
    nonces: HashMap<Address, U256>,
    disputes: HashMap<TaskId, Dispute>,
    writes: Vec<WriteCall>,
    pending: HashMap<TxHash, WriteCall>,
    next_task: u64,
}

struct Shared {
    state: Mutex<ChainState>,
    domain: Eip712Domain,
    fail_reads: AtomicBool,
    reject_writes: AtomicBool,
    revert_on_confirm: AtomicBool,
    confirm_gate: watch::Sender<bool>,
    tx_counter: AtomicU64,
}

#[derive(Clone)]
pub struct MockContract {
    shared: Arc<Shared>,
    sender: Address,
}

impl MockContract {
    pub fn new(chain_id: u64, contract_address: Address) -> Self {
        let (confirm_gate, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ChainState {
                    next_task: 1,
                    ..Default::default()
                }),
                domain: approval_domain(chain_id, contract_address),
                fail_reads: AtomicBool::new(false),
                reject_writes: AtomicBool::new(false),
                revert_on_confirm: AtomicBool::new(false),
                confirm_gate,
                tx_counter: AtomicU64::new(0),
            }),
            sender: Address::ZERO,
        }
    }

    /// Handle on the same chain state that sends as `sender`.
    pub fn as_sender(&self, sender: Address) -> Self {
        Self {
            shared: self.shared.clone(),
            sender,
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_task(&self, task: Task) {
        let mut state = self.state();
        state.next_task = state.next_task.max(task.id.0 + 1);
        state.tasks.insert(task.id, task);
    }

    /// Seeds a pending task between `worker` and `client` and returns its id.
    pub fn seed_task(&self, worker: Address, client: Address, deadline: u64) -> TaskId {
        let mut state = self.state();
        let id = TaskId(state.next_task);
        state.next_task += 1;
        state.tasks.insert(
            id,
            Task {
                id,
                worker,
                client,
                timestamp: unix_timestamp(),
                deadline,
                status: TaskStatus::Pending,
                category: TaskCategory::Development,
                difficulty_weight: 100,
                proof_reference: format!("bafy-seed-{}", id.0),
            },
        );
        id
    }

    pub fn set_score(&self, who: Address, score: HustleScore, data: ReputationData) {
        let mut state = self.state();
        state.scores.insert(who, score);
        state.reputation.insert(who, data);
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state().tasks.get(&id).cloned()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.state().writes.clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.shared.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.shared.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn set_revert_on_confirm(&self, revert: bool) {
        self.shared.revert_on_confirm.store(revert, Ordering::SeqCst);
    }

    /// While held, `confirm` blocks until `release_confirmations`.
    pub fn hold_confirmations(&self) {
        self.shared.confirm_gate.send_replace(false);
    }

    pub fn release_confirmations(&self) {
        self.shared.confirm_gate.send_replace(true);
    }

    fn check_reads(&self) -> Result<(), ContractError> {
        if self.shared.fail_reads.load(Ordering::SeqCst) {
            return Err(ContractError::CallFailed("mock rpc unavailable".into()));
        }
        Ok(())
    }

    fn submit(&self, call: WriteCall) -> Result<TxHash, ContractError> {
        if self.shared.reject_writes.load(Ordering::SeqCst) {
            return Err(ContractError::Rejected("user rejected the request".into()));
        }
        let n = self.shared.tx_counter.fetch_add(1, Ordering::SeqCst);
        let tx_hash = keccak256(n.to_be_bytes());
        let mut state = self.state();
        state.writes.push(call.clone());
        state.pending.insert(tx_hash, call);
        Ok(tx_hash)
    }

    fn pending_task(&self, task_id: TaskId) -> Result<Task, ContractError> {
        let task = self
            .task(task_id)
            .ok_or(ContractError::Revert(RevertReason::InvalidTask))?;
        if task.status != TaskStatus::Pending {
            return Err(ContractError::Revert(RevertReason::TaskNotPending));
        }
        if unix_timestamp() > task.deadline {
            return Err(ContractError::Revert(RevertReason::TaskExpired));
        }
        Ok(task)
    }

    fn page(&self, ids: Vec<TaskId>, offset: u64, limit: u64) -> TaskPage {
        let total = ids.len() as u64;
        let task_ids = ids
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        TaskPage { task_ids, total }
    }

    fn apply(state: &mut ChainState, call: WriteCall) -> Option<TaskId> {
        match call {
            WriteCall::CreateTask { from, task, .. } => {
                let id = TaskId(state.next_task);
                state.next_task += 1;
                state.tasks.insert(
                    id,
                    Task {
                        id,
                        worker: from,
                        client: task.client,
                        timestamp: unix_timestamp(),
                        deadline: task.deadline,
                        status: TaskStatus::Pending,
                        category: TaskCategory::from_index(task.category)
                            .unwrap_or(TaskCategory::Other),
                        difficulty_weight: task.difficulty_weight,
                        proof_reference: task.proof_reference,
                    },
                );
                return Some(id);
            }
            WriteCall::Approve { task_id, .. } | WriteCall::ApproveWithSignature { task_id, .. } => {
                let Some(task) = state.tasks.get_mut(&task_id) else {
                    return None;
                };
                task.status = TaskStatus::Approved;
                let (worker, client, weight) = (task.worker, task.client, task.difficulty_weight);

                let gain = u128::from(weight) * 100;
                let score = state.scores.entry(worker).or_default();
                score.score += gain;
                score.experience += 1;
                score.reliability = 100;
                let rep = state.reputation.entry(worker).or_default();
                rep.total_score += gain;
                rep.total_weight += u128::from(weight);
                rep.task_count += 1;
                rep.last_updated = unix_timestamp();

                let nonce = state.nonces.entry(client).or_default();
                *nonce += U256::from(1);
            }
            WriteCall::FileDispute { from, task_id, evidence } => {
                if let Some(task) = state.tasks.get_mut(&task_id) {
                    task.status = TaskStatus::Disputed;
                }
                state.disputes.insert(
                    task_id,
                    Dispute {
                        task_id,
                        initiator: from,
                        created_at: unix_timestamp(),
                        resolved_at: None,
                        status: DisputeStatus::Pending,
                        evidence,
                        resolver: None,
                    },
                );
            }
            WriteCall::MarkExpired { task_ids, .. } => {
                let now = unix_timestamp();
                for id in task_ids {
                    if let Some(task) = state.tasks.get_mut(&id) {
                        if task.status == TaskStatus::Pending && now > task.deadline {
                            task.status = TaskStatus::Expired;
                        }
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl HustleReader for MockContract {
    async fn get_task(&self, task_id: TaskId) -> Result<TaskLookup, ContractError> {
        self.check_reads()?;
        Ok(match self.task(task_id) {
            Some(task) => TaskLookup::Found(task),
            None => TaskLookup::NotFound(task_id),
        })
    }

    async fn get_hustle_score(&self, who: Address) -> Result<HustleScore, ContractError> {
        self.check_reads()?;
        Ok(self.state().scores.get(&who).copied().unwrap_or_default())
    }

    async fn get_reputation_data(&self, who: Address) -> Result<ReputationData, ContractError> {
        self.check_reads()?;
        Ok(self.state().reputation.get(&who).copied().unwrap_or_default())
    }

    async fn get_tasks_by_worker(
        &self,
        worker: Address,
        offset: u64,
        limit: u64,
    ) -> Result<TaskPage, ContractError> {
        self.check_reads()?;
        let mut ids: Vec<TaskId> = self
            .state()
            .tasks
            .values()
            .filter(|t| t.worker == worker)
            .map(|t| t.id)
            .collect();
        ids.sort();
        Ok(self.page(ids, offset, limit))
    }

    async fn get_tasks_by_client(
        &self,
        client: Address,
        offset: u64,
        limit: u64,
    ) -> Result<TaskPage, ContractError> {
        self.check_reads()?;
        let mut ids: Vec<TaskId> = self
            .state()
            .tasks
            .values()
            .filter(|t| t.client == client)
            .map(|t| t.id)
            .collect();
        ids.sort();
        Ok(self.page(ids, offset, limit))
    }

    async fn get_dispute(&self, task_id: TaskId) -> Result<Option<Dispute>, ContractError> {
        self.check_reads()?;
        Ok(self.state().disputes.get(&task_id).cloned())
    }

    async fn nonce(&self, who: Address) -> Result<U256, ContractError> {
        self.check_reads()?;
        Ok(self.state().nonces.get(&who).copied().unwrap_or_default())
    }

    async fn total_tasks(&self) -> Result<u64, ContractError> {
        self.check_reads()?;
        Ok(self.state().tasks.len() as u64)
    }

    async fn task_creation_fee(&self) -> Result<U256, ContractError> {
        self.check_reads()?;
        Ok(U256::from(MOCK_CREATION_FEE))
    }

    async fn dispute_fee(&self) -> Result<U256, ContractError> {
        self.check_reads()?;
        Ok(U256::from(MOCK_DISPUTE_FEE))
    }
}

#[async_trait]
impl HustleWriter for MockContract {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn send_create_task(&self, task: &NewTask, fee: U256) -> Result<TxHash, ContractError> {
        if fee < U256::from(MOCK_CREATION_FEE) {
            return Err(ContractError::Revert(RevertReason::InsufficientFee));
        }
        self.submit(WriteCall::CreateTask {
            from: self.sender,
            task: task.clone(),
            fee,
        })
    }

    async fn send_approve_task(&self, task_id: TaskId) -> Result<TxHash, ContractError> {
        let task = self.pending_task(task_id)?;
        if task.client != self.sender {
            return Err(ContractError::Revert(RevertReason::NotClient));
        }
        self.submit(WriteCall::Approve {
            from: self.sender,
            task_id,
        })
    }

    async fn send_approve_with_signature(
        &self,
        task_id: TaskId,
        deadline: u64,
        signature: Bytes,
    ) -> Result<TxHash, ContractError> {
        let task = self.pending_task(task_id)?;
        let nonce = self
            .state()
            .nonces
            .get(&task.client)
            .copied()
            .unwrap_or_default();
        let signed = SignedApproval {
            request: ApprovalRequest {
                task_id,
                client: task.client,
                nonce,
                deadline,
            },
            signature,
        };
        signed.verify(&self.shared.domain, unix_timestamp())?;
        self.submit(WriteCall::ApproveWithSignature {
            from: self.sender,
            task_id,
            deadline,
        })
    }

    async fn send_file_dispute(
        &self,
        task_id: TaskId,
        evidence: &str,
        fee: U256,
    ) -> Result<TxHash, ContractError> {
        let task = self.pending_task(task_id)?;
        if task.client != self.sender && task.worker != self.sender {
            return Err(ContractError::Revert(RevertReason::NotClient));
        }
        if fee < U256::from(MOCK_DISPUTE_FEE) {
            return Err(ContractError::Revert(RevertReason::InsufficientFee));
        }
        self.submit(WriteCall::FileDispute {
            from: self.sender,
            task_id,
            evidence: evidence.to_string(),
        })
    }

    async fn send_mark_expired(&self, task_ids: &[TaskId]) -> Result<TxHash, ContractError> {
        self.submit(WriteCall::MarkExpired {
            from: self.sender,
            task_ids: task_ids.to_vec(),
        })
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<WriteReceipt, ContractError> {
        let mut gate = self.shared.confirm_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.shared.revert_on_confirm.load(Ordering::SeqCst) {
            self.state().pending.remove(&tx_hash);
            return Err(ContractError::Reverted(tx_hash));
        }

        let mut state = self.state();
        let call = state
            .pending
            .remove(&tx_hash)
            .ok_or(ContractError::Reverted(tx_hash))?;
        let created_task = Self::apply(&mut state, call);

        Ok(WriteReceipt {
            tx_hash,
            block_number: Some(self.shared.tx_counter.load(Ordering::SeqCst)),
            created_task,
        })
    }
}
