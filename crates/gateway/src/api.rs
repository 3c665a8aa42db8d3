use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use alloy::signers::local::PrivateKeySigner;
use approval::{ApprovalStage, Wallet};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use contract_client::signature::SignedApproval;
use contract_client::{HustleReader, WriteReceipt};
use futures::future::join_all;
use hustle_core::enums::TaskStatus;
use hustle_core::form::parse_address;
use hustle_core::ids::TaskId;
use hustle_core::reputation::{ReputationState, ReputationView};
use hustle_core::task::{Dispute, TaskPage, TaskView};
use hustle_core::time::unix_millis;
use hustle_core::HustleError;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::create::create_task;
use crate::error::{ApiError, ErrorBody};
use crate::AppState;

pub const MAX_PAGE_SIZE: u64 = 50;
pub const DEFAULT_PAGE_SIZE: u64 = 20;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/session",
            get(get_session).post(connect_session).delete(disconnect_session),
        )
        .route("/tasks", post(create_task))
        .route("/tasks/expire", post(mark_expired))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/approve", post(approve_direct))
        .route("/tasks/{id}/signature", post(request_signature))
        .route("/tasks/{id}/signature/submit", post(submit_signature))
        .route("/tasks/{id}/approval", get(get_approval).delete(abandon_approval))
        .route("/tasks/{id}/approval/retry", post(retry_approval))
        .route("/tasks/{id}/dispute", get(get_dispute).post(file_dispute))
        .route("/workers/{addr}/tasks", get(worker_tasks))
        .route("/clients/{addr}/tasks", get(client_tasks))
        .route("/reputation", get(own_reputation))
        .route("/reputation/{addr}", get(reputation_of))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    Ok(raw.parse::<TaskId>()?)
}

// --- session ---

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub address: Option<Address>,
}

async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        address: state.session().address(),
    })
}

async fn connect_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let signer: PrivateKeySigner = req
        .private_key
        .trim()
        .parse()
        .map_err(|_| HustleError::InvalidInput("malformed private key".into()))?;
    let writer = state.writers.writer_for(signer.clone())?;
    let wallet = Wallet::new(Arc::new(signer), writer);
    let address = wallet.address();
    state.session().connect(wallet);

    Ok(Json(SessionResponse {
        address: Some(address),
    }))
}

async fn disconnect_session(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session().disconnect();
    StatusCode::NO_CONTENT
}

// --- task reads ---

#[derive(Deserialize)]
pub struct ViewerQuery {
    pub viewer: Option<String>,
}

fn viewer_or_session(state: &AppState, viewer: Option<&str>) -> Result<Option<Address>, ApiError> {
    match viewer {
        Some(raw) => Ok(Some(parse_address(raw)?)),
        None => Ok(state.session().address()),
    }
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<TaskView>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let viewer = viewer_or_session(&state, query.viewer.as_deref())?;

    let task = timeout(state.config.read_timeout, state.reader.get_task(task_id))
        .await
        .map_err(|_| HustleError::TransientFetch(format!("task {task_id} read timed out")))??
        .into_result()?;

    Ok(Json(TaskView::derive(task, viewer, unix_millis())))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub offset: u64,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub viewer: Option<String>,
}

#[derive(Serialize)]
pub struct TaskEntry {
    pub id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<TaskView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Serialize)]
pub struct TaskListResponse {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub tasks: Vec<TaskEntry>,
}

#[derive(Clone, Copy)]
enum Role {
    Worker,
    Client,
}

fn parse_status(raw: &str) -> Result<TaskStatus, HustleError> {
    TaskStatus::ALL
        .into_iter()
        .find(|s| s.label().eq_ignore_ascii_case(raw.trim()))
        .ok_or_else(|| HustleError::InvalidInput(format!("unknown status {raw:?}")))
}

async fn worker_tasks(
    state: State<Arc<AppState>>,
    Path(addr): Path<String>,
    query: Query<ListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    list_tasks(state, Role::Worker, addr, query).await
}

async fn client_tasks(
    state: State<Arc<AppState>>,
    Path(addr): Path<String>,
    query: Query<ListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    list_tasks(state, Role::Client, addr, query).await
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    role: Role,
    addr: String,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let owner = parse_address(&addr)?;
    let viewer = viewer_or_session(&state, query.viewer.as_deref())?;
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let page_read = async {
        match role {
            Role::Worker => state.reader.get_tasks_by_worker(owner, query.offset, limit).await,
            Role::Client => state.reader.get_tasks_by_client(owner, query.offset, limit).await,
        }
    };
    let page: TaskPage = timeout(state.config.read_timeout, page_read)
        .await
        .map_err(|_| HustleError::TransientFetch("task list read timed out".into()))??;

    let now_ms = unix_millis();
    let reads = page.task_ids.iter().map(|&id| {
        let reader = state.reader.clone();
        let read_timeout = state.config.read_timeout;
        async move { (id, read_one(reader.as_ref(), id, read_timeout).await) }
    });

    let tasks = join_all(reads)
        .await
        .into_iter()
        .filter_map(|(id, result)| match result {
            Ok(task) => {
                let view = TaskView::derive(task, viewer, now_ms);
                if status.is_some_and(|s| s != view.display_status) {
                    return None;
                }
                Some(TaskEntry {
                    id,
                    view: Some(view),
                    error: None,
                })
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "task read failed");
                Some(TaskEntry {
                    id,
                    view: None,
                    error: Some(ErrorBody::from(&e)),
                })
            }
        })
        .collect();

    Ok(Json(TaskListResponse {
        total: page.total,
        offset: query.offset,
        limit,
        tasks,
    }))
}

async fn read_one(
    reader: &dyn HustleReader,
    id: TaskId,
    read_timeout: std::time::Duration,
) -> Result<hustle_core::task::Task, HustleError> {
    timeout(read_timeout, reader.get_task(id))
        .await
        .map_err(|_| HustleError::TransientFetch(format!("task {id} read timed out")))??
        .into_result()
}

// --- reputation ---

async fn own_reputation(State(state): State<Arc<AppState>>) -> Result<Json<ReputationState>, ApiError> {
    match state.session().address() {
        Some(address) => Ok(Json(ReputationState::Ready(
            load_reputation(&state, address).await?,
        ))),
        None => Ok(Json(ReputationState::NoIdentity)),
    }
}

async fn reputation_of(
    State(state): State<Arc<AppState>>,
    Path(addr): Path<String>,
) -> Result<Json<ReputationState>, ApiError> {
    let address = parse_address(&addr)?;
    Ok(Json(ReputationState::Ready(
        load_reputation(&state, address).await?,
    )))
}

async fn load_reputation(state: &AppState, address: Address) -> Result<ReputationView, HustleError> {
    let reads = async {
        tokio::try_join!(
            state.reader.get_hustle_score(address),
            state.reader.get_reputation_data(address),
        )
    };
    let (score, data) = timeout(state.config.read_timeout, reads)
        .await
        .map_err(|_| HustleError::TransientFetch("reputation read timed out".into()))??;
    Ok(ReputationView::derive(score, data))
}

// --- approvals and disputes ---

#[derive(Debug, Serialize, Deserialize)]
pub struct TxResponse {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl From<WriteReceipt> for TxResponse {
    fn from(receipt: WriteReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            task_id: receipt.created_task,
        }
    }
}

#[derive(Serialize)]
pub struct StageResponse {
    pub task_id: TaskId,
    pub label: &'static str,
    #[serde(flatten)]
    pub stage: ApprovalStage,
}

impl StageResponse {
    fn new(task_id: TaskId, stage: ApprovalStage) -> Self {
        Self {
            task_id,
            label: stage.label(),
            stage,
        }
    }
}

async fn approve_direct(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TxResponse>, ApiError> {
    let receipt = state.orchestrator.approve_direct(parse_task_id(&id)?).await?;
    Ok(Json(receipt.into()))
}

async fn request_signature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SignedApproval>, ApiError> {
    Ok(Json(state.orchestrator.request_signature(parse_task_id(&id)?).await?))
}

#[derive(Default, Deserialize)]
pub struct SubmitSignatureRequest {
    /// Signature obtained elsewhere; defaults to the one awaiting relay.
    #[serde(default)]
    pub approval: Option<SignedApproval>,
    /// Send through the gateway's relayer instead of the session wallet.
    #[serde(default)]
    pub use_relayer: bool,
}

async fn submit_signature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SubmitSignatureRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let relayer = if req.use_relayer {
        Some(
            state
                .relayer
                .clone()
                .ok_or_else(|| HustleError::InvalidState("no relayer configured".into()))?,
        )
    } else {
        None
    };

    let receipt = state
        .orchestrator
        .submit_signature(task_id, relayer, req.approval)
        .await?;
    Ok(Json(receipt.into()))
}

async fn get_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StageResponse>, ApiError> {
    let task_id = parse_task_id(&id)?;
    Ok(Json(StageResponse::new(task_id, state.orchestrator.stage(task_id))))
}

async fn abandon_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StageResponse>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let previous = state.orchestrator.abandon(task_id)?;
    Ok(Json(StageResponse::new(task_id, previous)))
}

async fn retry_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StageResponse>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let stage = state.orchestrator.retry(task_id)?;
    Ok(Json(StageResponse::new(task_id, stage)))
}

#[derive(Deserialize)]
pub struct DisputeRequest {
    pub evidence: String,
}

async fn file_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<DisputeRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let receipt = state
        .orchestrator
        .file_dispute(parse_task_id(&id)?, &req.evidence)
        .await?;
    Ok(Json(receipt.into()))
}

async fn get_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Dispute>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let dispute = timeout(state.config.read_timeout, state.reader.get_dispute(task_id))
        .await
        .map_err(|_| HustleError::TransientFetch("dispute read timed out".into()))??
        .ok_or_else(|| HustleError::NotFound(format!("dispute for task {task_id}")))?;
    Ok(Json(dispute))
}

#[derive(Deserialize)]
pub struct ExpireRequest {
    pub task_ids: Vec<u64>,
}

async fn mark_expired(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExpireRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let ids = req
        .task_ids
        .into_iter()
        .map(TaskId::new)
        .collect::<Result<Vec<_>, _>>()?;
    let receipt = state.orchestrator.mark_expired(&ids).await?;
    Ok(Json(receipt.into()))
}
