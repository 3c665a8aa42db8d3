pub mod signature;

#[cfg(feature = "mock")]
pub mod mock;

use std::str::FromStr;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::aliases::U40;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use hustle_core::ids::TaskId;
use hustle_core::reputation::{HustleScore, ReputationData};
use hustle_core::task::{Dispute, RawDispute, RawTask, Task, TaskLookup, TaskPage};
use hustle_core::HustleError;
use tokio::time::{interval, timeout};

sol! {
    #[sol(rpc)]
    contract ProofOfHustle {
        struct ReputationData {
            uint256 totalScore;
            uint256 totalWeight;
            uint256 taskCount;
            uint256 disputeCount;
            uint256 lastUpdated;
        }

        struct Dispute {
            address initiator;
            uint40 createdAt;
            uint40 resolvedAt;
            uint8 status;
            string evidence;
            address resolver;
        }

        error AlreadyApproved();
        error DeadlineExpired();
        error DisputeAlreadyExists();
        error EnforcedPause();
        error InsufficientFee();
        error InvalidCategory();
        error InvalidSignature();
        error InvalidTask();
        error NotClient();
        error NotWorker();
        error TaskExpired();
        error TaskNotPending();

        function getTask(uint256 taskId) external view returns (
            address worker,
            address client,
            uint40 timestamp,
            uint40 deadline,
            uint8 status,
            uint8 category,
            uint16 difficultyWeight,
            string memory ipfsCid
        );
        function getHustleScore(address worker) external view returns (uint256 score, uint256 reliability, uint256 experience);
        function getReputationData(address user) external view returns (ReputationData memory rep);
        function getTasksByWorker(address worker, uint256 offset, uint256 limit) external view returns (uint256[] memory taskIds, uint256 total);
        function getTasksByClient(address client, uint256 offset, uint256 limit) external view returns (uint256[] memory taskIds, uint256 total);
        function getDispute(uint256 taskId) external view returns (Dispute memory dispute);
        function nonces(address owner) external view returns (uint256);
        function totalTasks() external view returns (uint256);
        function TASK_CREATION_FEE() external view returns (uint256);
        function DISPUTE_FEE() external view returns (uint256);

        function createTask(address client, string calldata ipfsCid, uint8 category, uint16 difficultyWeight, uint40 deadline) external payable returns (uint256 taskId);
        function approveTask(uint256 taskId) external;
        function approveTaskWithSignature(uint256 taskId, uint256 deadline, bytes calldata sig) external;
        function fileDispute(uint256 taskId, string calldata evidence) external payable;
        function markTasksExpired(uint256[] calldata taskIds) external;

        event TaskCreated(uint256 indexed taskId, address indexed worker, address indexed client, uint8 category, uint16 difficultyWeight, uint40 deadline, string ipfsCid);
        event TaskApproved(uint256 indexed taskId, address indexed client, uint256 reputationGain);
        event TaskApprovedWithSignature(uint256 indexed taskId, address indexed client, address indexed submittedBy, uint256 reputationGain);
        event DisputeCreated(uint256 indexed taskId, address indexed initiator, string evidence);
    }
}

/// Custom errors the contract reverts with that the client reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    InvalidTask,
    NotClient,
    NotWorker,
    TaskNotPending,
    AlreadyApproved,
    TaskExpired,
    DeadlineExpired,
    InvalidSignature,
    InsufficientFee,
    InvalidCategory,
    DisputeAlreadyExists,
    Paused,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("contract call failed: {0}")]
    CallFailed(String),

    #[error("contract reverted: {0:?}")]
    Revert(RevertReason),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("transaction {0} not confirmed in time")]
    ConfirmationTimeout(TxHash),

    #[error("malformed contract data: {0}")]
    Decode(String),

    #[error("no signer configured")]
    NoSigner,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<ContractError> for HustleError {
    fn from(e: ContractError) -> Self {
        match e {
            ContractError::CallFailed(msg) => HustleError::TransientFetch(msg),
            ContractError::Revert(reason) => match reason {
                RevertReason::InvalidTask => HustleError::NotFound("task".into()),
                RevertReason::NotClient => {
                    HustleError::Unauthorized("only the task's client may do this".into())
                }
                RevertReason::NotWorker => {
                    HustleError::Unauthorized("only the task's worker may do this".into())
                }
                RevertReason::TaskNotPending | RevertReason::AlreadyApproved => {
                    HustleError::InvalidState("task is no longer pending".into())
                }
                RevertReason::TaskExpired => {
                    HustleError::InvalidState("task deadline has passed".into())
                }
                RevertReason::DeadlineExpired => {
                    HustleError::InvalidState("approval signature has expired".into())
                }
                RevertReason::DisputeAlreadyExists => {
                    HustleError::InvalidState("a dispute already exists for this task".into())
                }
                RevertReason::InvalidCategory => {
                    HustleError::InvalidInput("category rejected by contract".into())
                }
                other => HustleError::WriteRejected(format!("contract reverted: {other:?}")),
            },
            ContractError::Rejected(msg) => HustleError::WriteRejected(msg),
            ContractError::Reverted(tx) => {
                HustleError::FinalizationFailed(format!("transaction {tx} reverted"))
            }
            ContractError::ConfirmationTimeout(tx) => {
                HustleError::FinalizationFailed(format!("transaction {tx} not confirmed in time"))
            }
            ContractError::Decode(msg) => HustleError::InvalidInput(msg),
            ContractError::NoSigner => HustleError::NoIdentity,
            ContractError::InvalidConfig(msg) => HustleError::InvalidInput(msg),
        }
    }
}

impl From<HustleError> for ContractError {
    fn from(e: HustleError) -> Self {
        ContractError::Decode(e.to_string())
    }
}

/// Finalized write as seen in its receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// Set when the transaction emitted `TaskCreated`.
    pub created_task: Option<TaskId>,
}

/// Arguments of `createTask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub client: Address,
    pub proof_reference: String,
    pub category: u8,
    pub difficulty_weight: u16,
    pub deadline: u64,
}

#[async_trait]
pub trait HustleReader: Send + Sync {
    async fn get_task(&self, task_id: TaskId) -> Result<TaskLookup, ContractError>;
    async fn get_hustle_score(&self, who: Address) -> Result<HustleScore, ContractError>;
    async fn get_reputation_data(&self, who: Address) -> Result<ReputationData, ContractError>;
    async fn get_tasks_by_worker(
        &self,
        worker: Address,
        offset: u64,
        limit: u64,
    ) -> Result<TaskPage, ContractError>;
    async fn get_tasks_by_client(
        &self,
        client: Address,
        offset: u64,
        limit: u64,
    ) -> Result<TaskPage, ContractError>;
    async fn get_dispute(&self, task_id: TaskId) -> Result<Option<Dispute>, ContractError>;
    async fn nonce(&self, who: Address) -> Result<U256, ContractError>;
    async fn total_tasks(&self) -> Result<u64, ContractError>;
    async fn task_creation_fee(&self) -> Result<U256, ContractError>;
    async fn dispute_fee(&self) -> Result<U256, ContractError>;
}

/// Writes are split in two: `send_*` returns once the provider accepted the
/// transaction, `confirm` waits for it to finalize.
#[async_trait]
pub trait HustleWriter: Send + Sync {
    fn sender(&self) -> Address;
    async fn send_create_task(&self, task: &NewTask, fee: U256) -> Result<TxHash, ContractError>;
    async fn send_approve_task(&self, task_id: TaskId) -> Result<TxHash, ContractError>;
    async fn send_approve_with_signature(
        &self,
        task_id: TaskId,
        deadline: u64,
        signature: Bytes,
    ) -> Result<TxHash, ContractError>;
    async fn send_file_dispute(
        &self,
        task_id: TaskId,
        evidence: &str,
        fee: U256,
    ) -> Result<TxHash, ContractError>;
    async fn send_mark_expired(&self, task_ids: &[TaskId]) -> Result<TxHash, ContractError>;
    async fn confirm(&self, tx_hash: TxHash) -> Result<WriteReceipt, ContractError>;
}

#[derive(Debug, Clone)]
pub struct ContractConfig {
    pub rpc_url: String,
    pub contract_address: Address,
    pub receipt_poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::ZERO,
            receipt_poll_interval: Duration::from_secs(1),
            confirm_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ContractClient {
    rpc_url: Url,
    pub contract_address: Address,
    signer: Option<PrivateKeySigner>,
    receipt_poll_interval: Duration,
    confirm_timeout: Duration,
}

impl ContractClient {
    /// Read-only client. Writes fail with [`ContractError::NoSigner`].
    pub fn new(config: &ContractConfig) -> Result<Self, ContractError> {
        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| ContractError::InvalidConfig(format!("{e}")))?;
        Ok(Self {
            rpc_url: url,
            contract_address: config.contract_address,
            signer: None,
            receipt_poll_interval: config.receipt_poll_interval,
            confirm_timeout: config.confirm_timeout,
        })
    }

    pub fn with_private_key(config: &ContractConfig, private_key: &str) -> Result<Self, ContractError> {
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| ContractError::InvalidConfig(e.to_string()))?;
        Ok(Self::new(config)?.with_signer(signer))
    }

    pub fn with_signer(mut self, signer: PrivateKeySigner) -> Self {
        self.signer = Some(signer);
        self
    }

    fn reader(&self) -> ProofOfHustle::ProofOfHustleInstance<impl Provider> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        ProofOfHustle::new(self.contract_address, provider)
    }

    fn writer(&self) -> Result<ProofOfHustle::ProofOfHustleInstance<impl Provider>, ContractError> {
        let signer = self.signer.clone().ok_or(ContractError::NoSigner)?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone());
        Ok(ProofOfHustle::new(self.contract_address, provider))
    }

    async fn task_page(
        &self,
        owner: Address,
        offset: u64,
        limit: u64,
        by_worker: bool,
    ) -> Result<TaskPage, ContractError> {
        let contract = self.reader();
        let (ids, total) = if by_worker {
            let res = contract
                .getTasksByWorker(owner, U256::from(offset), U256::from(limit))
                .call()
                .await
                .map_err(call_error)?;
            (res.taskIds, res.total)
        } else {
            let res = contract
                .getTasksByClient(owner, U256::from(offset), U256::from(limit))
                .call()
                .await
                .map_err(call_error)?;
            (res.taskIds, res.total)
        };

        let task_ids = ids
            .into_iter()
            .map(|id| TaskId::new(id.saturating_to::<u64>()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TaskPage {
            task_ids,
            total: total.saturating_to::<u64>(),
        })
    }
}

#[async_trait]
impl HustleReader for ContractClient {
    async fn get_task(&self, task_id: TaskId) -> Result<TaskLookup, ContractError> {
        let res = match self.reader().getTask(U256::from(task_id.0)).call().await {
            Ok(res) => res,
            Err(e) => {
                return match call_error(e) {
                    ContractError::Revert(RevertReason::InvalidTask) => {
                        Ok(TaskLookup::NotFound(task_id))
                    }
                    other => Err(other),
                }
            }
        };

        let raw = RawTask {
            worker: res.worker,
            client: res.client,
            timestamp: res.timestamp.to::<u64>(),
            deadline: res.deadline.to::<u64>(),
            status: res.status,
            category: res.category,
            difficulty_weight: res.difficultyWeight,
            proof_reference: res.ipfsCid,
        };

        Ok(match Task::from_raw(task_id, raw)? {
            Some(task) => TaskLookup::Found(task),
            None => TaskLookup::NotFound(task_id),
        })
    }

    async fn get_hustle_score(&self, who: Address) -> Result<HustleScore, ContractError> {
        let res = self
            .reader()
            .getHustleScore(who)
            .call()
            .await
            .map_err(call_error)?;
        Ok(HustleScore {
            score: res.score.saturating_to(),
            reliability: res.reliability.saturating_to(),
            experience: res.experience.saturating_to(),
        })
    }

    async fn get_reputation_data(&self, who: Address) -> Result<ReputationData, ContractError> {
        let rep = self
            .reader()
            .getReputationData(who)
            .call()
            .await
            .map_err(call_error)?;
        Ok(ReputationData {
            total_score: rep.totalScore.saturating_to(),
            total_weight: rep.totalWeight.saturating_to(),
            task_count: rep.taskCount.saturating_to(),
            dispute_count: rep.disputeCount.saturating_to(),
            last_updated: rep.lastUpdated.saturating_to(),
        })
    }

    async fn get_tasks_by_worker(
        &self,
        worker: Address,
        offset: u64,
        limit: u64,
    ) -> Result<TaskPage, ContractError> {
        self.task_page(worker, offset, limit, true).await
    }

    async fn get_tasks_by_client(
        &self,
        client: Address,
        offset: u64,
        limit: u64,
    ) -> Result<TaskPage, ContractError> {
        self.task_page(client, offset, limit, false).await
    }

    async fn get_dispute(&self, task_id: TaskId) -> Result<Option<Dispute>, ContractError> {
        let d = match self.reader().getDispute(U256::from(task_id.0)).call().await {
            Ok(d) => d,
            Err(e) => {
                return match call_error(e) {
                    ContractError::Revert(RevertReason::InvalidTask) => Ok(None),
                    other => Err(other),
                }
            }
        };
        let raw = RawDispute {
            initiator: d.initiator,
            created_at: d.createdAt.to::<u64>(),
            resolved_at: d.resolvedAt.to::<u64>(),
            status: d.status,
            evidence: d.evidence,
            resolver: d.resolver,
        };
        Ok(Dispute::from_raw(task_id, raw)?)
    }

    async fn nonce(&self, who: Address) -> Result<U256, ContractError> {
        self.reader().nonces(who).call().await.map_err(call_error)
    }

    async fn total_tasks(&self) -> Result<u64, ContractError> {
        let total = self.reader().totalTasks().call().await.map_err(call_error)?;
        Ok(total.saturating_to())
    }

    async fn task_creation_fee(&self) -> Result<U256, ContractError> {
        self.reader().TASK_CREATION_FEE().call().await.map_err(call_error)
    }

    async fn dispute_fee(&self) -> Result<U256, ContractError> {
        self.reader().DISPUTE_FEE().call().await.map_err(call_error)
    }
}

#[async_trait]
impl HustleWriter for ContractClient {
    fn sender(&self) -> Address {
        self.signer
            .as_ref()
            .map(|s| s.address())
            .unwrap_or(Address::ZERO)
    }

    async fn send_create_task(&self, task: &NewTask, fee: U256) -> Result<TxHash, ContractError> {
        let contract = self.writer()?;
        let pending = contract
            .createTask(
                task.client,
                task.proof_reference.clone(),
                task.category,
                task.difficulty_weight,
                U40::saturating_from(task.deadline),
            )
            .value(fee)
            .send()
            .await
            .map_err(send_error)?;
        Ok(*pending.tx_hash())
    }

    async fn send_approve_task(&self, task_id: TaskId) -> Result<TxHash, ContractError> {
        let contract = self.writer()?;
        let pending = contract
            .approveTask(U256::from(task_id.0))
            .send()
            .await
            .map_err(send_error)?;
        Ok(*pending.tx_hash())
    }

    async fn send_approve_with_signature(
        &self,
        task_id: TaskId,
        deadline: u64,
        signature: Bytes,
    ) -> Result<TxHash, ContractError> {
        let contract = self.writer()?;
        let pending = contract
            .approveTaskWithSignature(U256::from(task_id.0), U256::from(deadline), signature)
            .send()
            .await
            .map_err(send_error)?;
        Ok(*pending.tx_hash())
    }

    async fn send_file_dispute(
        &self,
        task_id: TaskId,
        evidence: &str,
        fee: U256,
    ) -> Result<TxHash, ContractError> {
        let contract = self.writer()?;
        let pending = contract
            .fileDispute(U256::from(task_id.0), evidence.to_string())
            .value(fee)
            .send()
            .await
            .map_err(send_error)?;
        Ok(*pending.tx_hash())
    }

    async fn send_mark_expired(&self, task_ids: &[TaskId]) -> Result<TxHash, ContractError> {
        let contract = self.writer()?;
        let ids = task_ids.iter().map(|id| U256::from(id.0)).collect::<Vec<_>>();
        let pending = contract
            .markTasksExpired(ids)
            .send()
            .await
            .map_err(send_error)?;
        Ok(*pending.tx_hash())
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<WriteReceipt, ContractError> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());

        let poll = async {
            let mut ticker = interval(self.receipt_poll_interval);
            loop {
                ticker.tick().await;
                match provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => tracing::debug!(%tx_hash, "receipt not yet available"),
                    Err(e) => tracing::warn!(%tx_hash, error = %e, "receipt poll failed"),
                }
            }
        };

        let receipt = timeout(self.confirm_timeout, poll)
            .await
            .map_err(|_| ContractError::ConfirmationTimeout(tx_hash))?;

        if !receipt.status() {
            tracing::warn!(%tx_hash, "transaction reverted");
            return Err(ContractError::Reverted(tx_hash));
        }

        let created_task = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<ProofOfHustle::TaskCreated>().ok())
            .map(|log| TaskId(log.inner.data.taskId.saturating_to::<u64>()));

        tracing::info!(%tx_hash, block = ?receipt.block_number, "transaction confirmed");

        Ok(WriteReceipt {
            tx_hash,
            block_number: receipt.block_number,
            created_task,
        })
    }
}

fn revert_reason(e: &alloy::contract::Error) -> Option<RevertReason> {
    use ProofOfHustle::ProofOfHustleErrors as E;

    let decoded = e.as_decoded_interface_error::<E>()?;
    Some(match decoded {
        E::InvalidTask(_) => RevertReason::InvalidTask,
        E::NotClient(_) => RevertReason::NotClient,
        E::NotWorker(_) => RevertReason::NotWorker,
        E::TaskNotPending(_) => RevertReason::TaskNotPending,
        E::AlreadyApproved(_) => RevertReason::AlreadyApproved,
        E::TaskExpired(_) => RevertReason::TaskExpired,
        E::DeadlineExpired(_) => RevertReason::DeadlineExpired,
        E::InvalidSignature(_) => RevertReason::InvalidSignature,
        E::InsufficientFee(_) => RevertReason::InsufficientFee,
        E::InvalidCategory(_) => RevertReason::InvalidCategory,
        E::DisputeAlreadyExists(_) => RevertReason::DisputeAlreadyExists,
        E::EnforcedPause(_) => RevertReason::Paused,
    })
}

fn call_error(e: alloy::contract::Error) -> ContractError {
    match revert_reason(&e) {
        Some(reason) => ContractError::Revert(reason),
        None if e.as_revert_data().is_some() => ContractError::Revert(RevertReason::Other),
        None => ContractError::CallFailed(e.to_string()),
    }
}

fn send_error(e: alloy::contract::Error) -> ContractError {
    match revert_reason(&e) {
        Some(reason) => ContractError::Revert(reason),
        None => ContractError::Rejected(e.to_string()),
    }
}
