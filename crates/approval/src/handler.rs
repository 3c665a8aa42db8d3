use std::future::Future;
use std::sync::Arc;

use alloy::primitives::{TxHash, U256};
use contract_client::signature::{sign_approval, ApprovalRequest, SignedApproval};
use contract_client::{ContractError, HustleWriter, WriteReceipt};
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use hustle_core::enums::TaskStatus;
use hustle_core::ids::TaskId;
use hustle_core::task::Task;
use hustle_core::time::unix_timestamp;
use hustle_core::HustleError;
use tokio::time::timeout;

use crate::{ApprovalOrchestrator, ApprovalStage, SubmissionMode, Wallet};

impl ApprovalOrchestrator {
    /// Client approves with its own transaction.
    pub async fn approve_direct(&self, task_id: TaskId) -> Result<WriteReceipt, HustleError> {
        let wallet = self.session.current().ok_or(HustleError::NoIdentity)?;
        let task = self.read_task(task_id).await?;
        check_actionable(&task)?;
        if task.client != wallet.address() {
            return Err(HustleError::Unauthorized(
                "only the task's client may approve".into(),
            ));
        }

        let mode = SubmissionMode::Direct;
        let attempt = self.reserve(task_id, false, |attempt| ApprovalStage::Submitting {
            attempt,
            mode,
        })?;
        tracing::info!(%task_id, attempt, "direct approval started");

        let writer = self.writer_for(task_id, attempt, mode, &wallet)?;
        self.drive(task_id, attempt, mode, &writer, None, writer.send_approve_task(task_id))
            .await
    }

    /// Asks the connected client to sign an `ApproveTask` message. The result
    /// is kept as `SignatureReady` until someone relays it.
    pub async fn request_signature(&self, task_id: TaskId) -> Result<SignedApproval, HustleError> {
        let wallet = self.session.current().ok_or(HustleError::NoIdentity)?;
        let client = wallet.address();
        let task = self.read_task(task_id).await?;
        check_actionable(&task)?;
        if task.client != client {
            return Err(HustleError::Unauthorized(
                "only the task's client may sign an approval".into(),
            ));
        }

        let nonce: U256 = timeout(self.config.read_timeout, self.reader.nonce(client))
            .await
            .map_err(|_| HustleError::TransientFetch("nonce read timed out".into()))??;
        let request = ApprovalRequest::new(task_id, client, nonce, unix_timestamp());

        let attempt = self.reserve(task_id, false, |attempt| ApprovalStage::AwaitingSignature {
            attempt,
            request,
        })?;
        tracing::info!(%task_id, attempt, deadline = request.deadline, "signature requested");

        let signed = match timeout(
            self.config.signing_timeout,
            sign_approval(wallet.signer.as_ref(), request, &self.domain),
        )
        .await
        {
            Ok(Ok(signed)) => signed,
            Ok(Err(e)) => {
                let err = HustleError::from(e);
                self.fail(task_id, attempt, SubmissionMode::Signature, &err, None);
                return Err(err);
            }
            Err(_) => {
                let err = HustleError::WriteRejected("wallet did not sign in time".into());
                self.fail(task_id, attempt, SubmissionMode::Signature, &err, None);
                return Err(err);
            }
        };

        if self.session.address() != Some(client) {
            let err = HustleError::Unauthorized("wallet changed while signing".into());
            self.fail(task_id, attempt, SubmissionMode::Signature, &err, None);
            return Err(err);
        }

        let ready = ApprovalStage::SignatureReady {
            attempt,
            approval: signed.clone(),
        };
        if !self.transition(task_id, attempt, ready) {
            return Err(HustleError::InvalidState(
                "approval attempt was abandoned".into(),
            ));
        }
        Ok(signed)
    }

    /// Relays a signed approval. `approval` defaults to the one held in
    /// `SignatureReady`; `relayer` defaults to the connected wallet.
    pub async fn submit_signature(
        &self,
        task_id: TaskId,
        relayer: Option<Arc<dyn HustleWriter>>,
        approval: Option<SignedApproval>,
    ) -> Result<WriteReceipt, HustleError> {
        let approval = match approval {
            Some(approval) => approval,
            None => match self.stage(task_id) {
                ApprovalStage::SignatureReady { approval, .. } => approval,
                other if other.is_in_flight() => {
                    return Err(HustleError::InFlight(other.label().to_string()))
                }
                _ => {
                    return Err(HustleError::InvalidState(
                        "no signed approval for this task".into(),
                    ))
                }
            },
        };
        if approval.request.task_id != task_id {
            return Err(HustleError::InvalidInput(
                "signature was issued for another task".into(),
            ));
        }

        if !approval.request.is_live_at(unix_timestamp()) {
            let err = HustleError::InvalidState("approval signature has expired".into());
            if let ApprovalStage::SignatureReady { attempt, .. } = self.stage(task_id) {
                self.fail(task_id, attempt, SubmissionMode::Signature, &err, None);
            }
            return Err(err);
        }
        approval
            .recover_signer(&self.domain)
            .ok()
            .filter(|signer| *signer == approval.request.client)
            .ok_or_else(|| HustleError::InvalidInput("signature does not match client".into()))?;

        let writer = match relayer {
            Some(writer) => writer,
            None => self
                .session
                .current()
                .map(|wallet| wallet.writer)
                .ok_or(HustleError::NoIdentity)?,
        };

        let task = self.read_task(task_id).await?;
        check_actionable(&task)?;
        if task.client != approval.request.client {
            return Err(HustleError::Unauthorized(
                "signature is not from the task's client".into(),
            ));
        }

        let mode = SubmissionMode::Signature;
        let attempt = self.reserve(task_id, true, |attempt| ApprovalStage::Submitting {
            attempt,
            mode,
        })?;
        tracing::info!(%task_id, attempt, relayer = %writer.sender(), "relaying signed approval");

        let send = writer.send_approve_with_signature(
            task_id,
            approval.request.deadline,
            approval.signature.clone(),
        );
        self.drive(task_id, attempt, mode, &writer, Some(approval.clone()), send)
            .await
    }

    /// Opens a dispute on a pending task, paying the contract's dispute fee.
    pub async fn file_dispute(
        &self,
        task_id: TaskId,
        evidence: &str,
    ) -> Result<WriteReceipt, HustleError> {
        let evidence = evidence.trim();
        if evidence.is_empty() {
            return Err(HustleError::InvalidInput("evidence is required".into()));
        }

        let wallet = self.session.current().ok_or(HustleError::NoIdentity)?;
        let task = self.read_task(task_id).await?;
        check_actionable(&task)?;
        let who = wallet.address();
        if who != task.worker && who != task.client {
            return Err(HustleError::Unauthorized(
                "only the task's worker or client may dispute".into(),
            ));
        }

        let (existing, fee) = tokio::join!(
            timeout(self.config.read_timeout, self.reader.get_dispute(task_id)),
            timeout(self.config.read_timeout, self.reader.dispute_fee()),
        );
        let read_timed_out = |_| HustleError::TransientFetch("dispute read timed out".into());
        if existing.map_err(read_timed_out)??.is_some() {
            return Err(HustleError::InvalidState(
                "a dispute already exists for this task".into(),
            ));
        }
        let fee = fee.map_err(read_timed_out)??;

        let mode = SubmissionMode::Dispute;
        let attempt = self.reserve(task_id, false, |attempt| ApprovalStage::Submitting {
            attempt,
            mode,
        })?;
        tracing::info!(%task_id, attempt, %fee, "filing dispute");

        let writer = self.writer_for(task_id, attempt, mode, &wallet)?;
        self.drive(
            task_id,
            attempt,
            mode,
            &writer,
            None,
            writer.send_file_dispute(task_id, evidence, fee),
        )
        .await
    }

    /// Flips overdue pending tasks to Expired. Ids that are unknown, not
    /// overdue or unreadable are skipped; a read failure only surfaces when
    /// nothing else qualifies.
    pub async fn mark_expired(&self, task_ids: &[TaskId]) -> Result<WriteReceipt, HustleError> {
        let wallet = self.session.current().ok_or(HustleError::NoIdentity)?;
        let now_ms = hustle_core::time::unix_millis();

        let reads = join_all(task_ids.iter().map(|&task_id| self.read_task(task_id))).await;
        let mut overdue = Vec::new();
        let mut read_error = None;
        for (&task_id, read) in task_ids.iter().zip(reads) {
            match read {
                Ok(task) if task.status == TaskStatus::Pending && task.is_expired_at(now_ms) => {
                    overdue.push(task_id);
                }
                Ok(_) => {}
                Err(HustleError::NotFound(_)) => {
                    tracing::debug!(%task_id, "unknown task skipped");
                }
                Err(e) => {
                    tracing::warn!(%task_id, error = %e, "task read failed, skipped");
                    read_error.get_or_insert(e);
                }
            }
        }
        if overdue.is_empty() {
            return Err(read_error
                .unwrap_or_else(|| HustleError::InvalidInput("no overdue pending tasks".into())));
        }

        tracing::info!(count = overdue.len(), "marking tasks expired");
        let tx_hash = timeout(
            self.config.signing_timeout,
            wallet.writer.send_mark_expired(&overdue),
        )
        .await
        .map_err(|_| HustleError::WriteRejected("wallet did not respond in time".into()))??;
        Ok(wallet.writer.confirm(tx_hash).await?)
    }

    async fn read_task(&self, task_id: TaskId) -> Result<Task, HustleError> {
        timeout(self.config.read_timeout, self.reader.get_task(task_id))
            .await
            .map_err(|_| HustleError::TransientFetch(format!("task {task_id} read timed out")))??
            .into_result()
    }

    /// Starts a new attempt unless one is in flight or the task is settled.
    /// With `reuse_ready`, a `SignatureReady` attempt is carried forward
    /// instead of being rejected.
    fn reserve(
        &self,
        task_id: TaskId,
        reuse_ready: bool,
        build: impl FnOnce(u64) -> ApprovalStage,
    ) -> Result<u64, HustleError> {
        let (attempt, stage) = match self.attempts.entry(task_id) {
            Entry::Occupied(mut entry) => {
                let attempt = match entry.get() {
                    ApprovalStage::SignatureReady { attempt, .. } if reuse_ready => *attempt,
                    current => {
                        check_startable(current)?;
                        self.allocate_attempt()
                    }
                };
                let stage = build(attempt);
                entry.insert(stage.clone());
                (attempt, stage)
            }
            Entry::Vacant(entry) => {
                let attempt = self.allocate_attempt();
                let stage = build(attempt);
                entry.insert(stage.clone());
                (attempt, stage)
            }
        };
        self.publish(task_id, stage);
        Ok(attempt)
    }

    /// The session may have changed while preconditions were read.
    fn writer_for(
        &self,
        task_id: TaskId,
        attempt: u64,
        mode: SubmissionMode,
        wallet: &Wallet,
    ) -> Result<Arc<dyn HustleWriter>, HustleError> {
        if self.session.address() != Some(wallet.address()) {
            let err = HustleError::Unauthorized("wallet disconnected".into());
            self.fail(task_id, attempt, mode, &err, None);
            return Err(err);
        }
        Ok(wallet.writer.clone())
    }

    async fn drive(
        &self,
        task_id: TaskId,
        attempt: u64,
        mode: SubmissionMode,
        writer: &Arc<dyn HustleWriter>,
        approval: Option<SignedApproval>,
        send: impl Future<Output = Result<TxHash, ContractError>>,
    ) -> Result<WriteReceipt, HustleError> {
        let tx_hash = match timeout(self.config.signing_timeout, send).await {
            Ok(Ok(tx_hash)) => tx_hash,
            Ok(Err(e)) => {
                let err = HustleError::from(e);
                self.fail(task_id, attempt, mode, &err, approval);
                return Err(err);
            }
            Err(_) => {
                let err = HustleError::WriteRejected("wallet did not respond in time".into());
                self.fail(task_id, attempt, mode, &err, approval);
                return Err(err);
            }
        };

        tracing::info!(%task_id, attempt, %tx_hash, "transaction accepted");
        self.transition(
            task_id,
            attempt,
            ApprovalStage::Confirming {
                attempt,
                mode,
                tx_hash,
            },
        );

        match writer.confirm(tx_hash).await {
            Ok(receipt) => {
                tracing::info!(%task_id, attempt, %tx_hash, block = ?receipt.block_number, "write finalized");
                self.transition(task_id, attempt, ApprovalStage::Succeeded { mode, tx_hash });
                Ok(receipt)
            }
            Err(e) => {
                let err = HustleError::from(e);
                self.fail(task_id, attempt, mode, &err, approval);
                Err(err)
            }
        }
    }

    fn fail(
        &self,
        task_id: TaskId,
        attempt: u64,
        mode: SubmissionMode,
        err: &HustleError,
        approval: Option<SignedApproval>,
    ) {
        tracing::warn!(%task_id, attempt, ?mode, error = %err, "approval attempt failed");
        self.transition(
            task_id,
            attempt,
            ApprovalStage::Failed {
                attempt,
                mode,
                kind: err.kind(),
                reason: err.to_string(),
                retryable: err.is_retryable(),
                approval,
            },
        );
    }
}

fn check_actionable(task: &Task) -> Result<(), HustleError> {
    if task.status != TaskStatus::Pending {
        return Err(HustleError::InvalidState(format!(
            "task is {}",
            task.status.label()
        )));
    }
    if task.is_expired_at(hustle_core::time::unix_millis()) {
        return Err(HustleError::InvalidState("task deadline has passed".into()));
    }
    Ok(())
}

fn check_startable(stage: &ApprovalStage) -> Result<(), HustleError> {
    match stage {
        s if s.is_in_flight() => Err(HustleError::InFlight(s.label().to_string())),
        ApprovalStage::SignatureReady { .. } => Err(HustleError::InvalidState(
            "a signed approval is waiting to be relayed; submit or abandon it first".into(),
        )),
        ApprovalStage::Succeeded {
            mode: SubmissionMode::Dispute,
            ..
        } => Err(HustleError::InvalidState("task is under dispute".into())),
        ApprovalStage::Succeeded { .. } => {
            Err(HustleError::InvalidState("task is already approved".into()))
        }
        _ => Ok(()),
    }
}
