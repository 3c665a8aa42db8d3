//! `POST /tasks`: a worker submits proof of work for a client to approve.
//!
//! The request is `multipart/form-data` with one `form` field holding the
//! JSON [`CreateTaskForm`] and one or more `file` fields. Proof files are
//! pinned before anything is sent on-chain; a failed upload creates no task.
//! If the chain step fails after the upload, the error body carries the
//! pinned proof and a retry may pass its manifest CID as `proof_reference`
//! with no files attached.

use std::sync::Arc;

use alloy::primitives::TxHash;
use approval::Wallet;
use axum::extract::{Multipart, State};
use axum::Json;
use contract_client::NewTask;
use hustle_core::form::{CreateTaskForm, ValidTaskForm};
use hustle_core::ids::{Cid, TaskId};
use hustle_core::time::unix_timestamp;
use hustle_core::HustleError;
use serde::{Deserialize, Serialize};
use upload::{PinningService, ProofFile, ProofUpload};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: Option<TaskId>,
    pub tx_hash: TxHash,
    pub proof_reference: Cid,
    pub proof_url: String,
    pub file_cids: Vec<Cid>,
}

async fn read_parts(mut multipart: Multipart) -> Result<(CreateTaskForm, Vec<ProofFile>), HustleError> {
    let bad_body = |e: axum::extract::multipart::MultipartError| {
        HustleError::InvalidInput(format!("malformed multipart body: {e}"))
    };

    let mut form = None;
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_body)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("form") => {
                let raw = field.text().await.map_err(bad_body)?;
                form = Some(serde_json::from_str::<CreateTaskForm>(&raw).map_err(|e| {
                    HustleError::InvalidInput(format!("malformed task form: {e}"))
                })?);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("proof").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_body)?;
                files.push(ProofFile::new(file_name, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let form = form.ok_or_else(|| HustleError::InvalidInput("missing form field".into()))?;
    Ok((form, files))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    let wallet = state.session().current().ok_or(HustleError::NoIdentity)?;
    let (form, files) = read_parts(multipart).await?;

    let valid = form.validate(unix_timestamp())?;
    if valid.client == wallet.address() {
        return Err(HustleError::InvalidInput("client must differ from the worker".into()).into());
    }

    let proof = match &valid.proof_reference {
        Some(_) if !files.is_empty() => {
            return Err(HustleError::InvalidInput(
                "attach proof files or reuse a proof reference, not both".into(),
            )
            .into());
        }
        Some(cid) => {
            tracing::info!(%cid, "reusing pinned proof");
            ProofUpload {
                url: state.uploads.service().gateway_url(cid),
                manifest_cid: cid.clone(),
                file_cids: Vec::new(),
            }
        }
        None if files.is_empty() => {
            return Err(HustleError::InvalidInput("at least one proof file is required".into()).into());
        }
        None => state.uploads.upload_proof(files, &valid.description).await?,
    };

    match submit(&state, &wallet, &valid, &proof.manifest_cid).await {
        Ok((task_id, tx_hash)) => Ok(Json(CreateTaskResponse {
            task_id,
            tx_hash,
            proof_reference: proof.manifest_cid,
            proof_url: proof.url,
            file_cids: proof.file_cids,
        })),
        Err(e) => {
            tracing::warn!(cid = %proof.manifest_cid, error = %e, "task not created, proof stays pinned");
            Err(ApiError::from(e).with_proof(proof))
        }
    }
}

async fn submit(
    state: &AppState,
    wallet: &Wallet,
    valid: &ValidTaskForm,
    proof_reference: &Cid,
) -> Result<(Option<TaskId>, TxHash), HustleError> {
    let fee = tokio::time::timeout(state.config.read_timeout, state.reader.task_creation_fee())
        .await
        .map_err(|_| HustleError::TransientFetch("fee read timed out".into()))??;

    let task = NewTask {
        client: valid.client,
        proof_reference: proof_reference.0.clone(),
        category: valid.category.index(),
        difficulty_weight: valid.difficulty_weight,
        deadline: valid.deadline,
    };
    tracing::info!(
        worker = %wallet.address(),
        client = %task.client,
        cid = %proof_reference,
        %fee,
        "creating task"
    );

    let tx_hash = tokio::time::timeout(
        state.config.signing_timeout,
        wallet.writer.send_create_task(&task, fee),
    )
    .await
    .map_err(|_| HustleError::WriteRejected("wallet did not respond in time".into()))??;
    let receipt = wallet.writer.confirm(tx_hash).await?;

    tracing::info!(task_id = ?receipt.created_task, %tx_hash, "task created");
    Ok((receipt.created_task, tx_hash))
}
