use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use approval::{
    ApprovalConfig, ApprovalOrchestrator, ApprovalStage, Session, SubmissionMode, Wallet,
};
use async_trait::async_trait;
use contract_client::mock::{MockContract, WriteCall};
use contract_client::ContractError;
use contract_client::signature::{sign_approval, ApprovalRequest, SigningProvider, DEFAULT_CHAIN_ID};
use hustle_core::enums::TaskStatus;
use hustle_core::error::ErrorKind;
use hustle_core::ids::TaskId;
use hustle_core::time::unix_timestamp;
use hustle_core::HustleError;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

const CONTRACT: Address = Address::repeat_byte(0x42);

struct Harness {
    chain: MockContract,
    orchestrator: Arc<ApprovalOrchestrator>,
    client: PrivateKeySigner,
    worker: PrivateKeySigner,
}

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt::try_init();
        let chain = MockContract::new(DEFAULT_CHAIN_ID, CONTRACT);
        let config = ApprovalConfig {
            contract_address: CONTRACT,
            read_timeout: Duration::from_secs(2),
            signing_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let orchestrator = Arc::new(ApprovalOrchestrator::new(
            Arc::new(chain.clone()),
            Session::new(),
            config,
        ));
        Self {
            chain,
            orchestrator,
            client: PrivateKeySigner::random(),
            worker: PrivateKeySigner::random(),
        }
    }

    fn connect(&self, signer: &PrivateKeySigner) {
        let address = SigningProvider::address(signer);
        self.orchestrator.session().connect(Wallet::new(
            Arc::new(signer.clone()),
            Arc::new(self.chain.as_sender(address)),
        ));
    }

    fn client_addr(&self) -> Address {
        SigningProvider::address(&self.client)
    }

    fn worker_addr(&self) -> Address {
        SigningProvider::address(&self.worker)
    }

    fn seed_pending(&self) -> TaskId {
        self.chain
            .seed_task(self.worker_addr(), self.client_addr(), unix_timestamp() + 3_600)
    }

    async fn wait_for_confirming(&self, task_id: TaskId) {
        timeout(Duration::from_secs(5), async {
            while !matches!(
                self.orchestrator.stage(task_id),
                ApprovalStage::Confirming { .. }
            ) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("attempt never reached Confirming");
    }
}

/// Wallet whose first signature hangs until `release`; later ones are
/// signed immediately.
struct StalledSigner {
    inner: PrivateKeySigner,
    calls: AtomicUsize,
    gate: Notify,
}

impl StalledSigner {
    fn new(inner: PrivateKeySigner) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        }
    }

    fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SigningProvider for StalledSigner {
    fn address(&self) -> Address {
        SigningProvider::address(&self.inner)
    }

    async fn sign_hash(&self, hash: B256) -> Result<Signature, ContractError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.gate.notified().await;
        }
        SigningProvider::sign_hash(&self.inner, hash).await
    }
}

#[tokio::test]
async fn direct_approval_succeeds_and_updates_reputation() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    let receipt = h.orchestrator.approve_direct(task_id).await.unwrap();

    assert!(matches!(
        h.orchestrator.stage(task_id),
        ApprovalStage::Succeeded { mode: SubmissionMode::Direct, tx_hash } if tx_hash == receipt.tx_hash
    ));
    assert_eq!(h.chain.task(task_id).unwrap().status, TaskStatus::Approved);
    assert_eq!(
        h.chain.writes(),
        vec![WriteCall::Approve {
            from: h.client_addr(),
            task_id
        }]
    );
}

#[tokio::test]
async fn second_submit_while_in_flight_issues_no_write() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();
    h.chain.hold_confirmations();

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.approve_direct(task_id).await });
    h.wait_for_confirming(task_id).await;

    let second = h.orchestrator.approve_direct(task_id).await;
    assert!(matches!(second, Err(HustleError::InFlight(_))));
    let relay = h.orchestrator.request_signature(task_id).await;
    assert!(matches!(relay, Err(HustleError::InFlight(_))));

    h.chain.release_confirmations();
    first.await.unwrap().unwrap();
    assert_eq!(h.chain.writes().len(), 1);
}

#[tokio::test]
async fn abandon_is_refused_while_confirming() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();
    h.chain.hold_confirmations();

    let orchestrator = h.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.approve_direct(task_id).await });
    h.wait_for_confirming(task_id).await;

    assert!(matches!(
        h.orchestrator.abandon(task_id),
        Err(HustleError::InFlight(_))
    ));

    h.chain.release_confirmations();
    pending.await.unwrap().unwrap();
}

#[tokio::test]
async fn only_the_client_may_approve() {
    let h = Harness::new();
    h.connect(&h.worker);
    let task_id = h.seed_pending();

    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();

    assert!(matches!(err, HustleError::Unauthorized(_)));
    assert_eq!(h.orchestrator.stage(task_id), ApprovalStage::Idle);
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn approval_without_wallet_is_no_identity() {
    let h = Harness::new();
    let task_id = h.seed_pending();

    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();
    assert_eq!(err, HustleError::NoIdentity);
}

#[tokio::test]
async fn expired_task_cannot_be_approved() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h
        .chain
        .seed_task(h.worker_addr(), h.client_addr(), unix_timestamp() - 10);

    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = Harness::new();
    h.connect(&h.client);

    let err = h.orchestrator.approve_direct(TaskId(999)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn signed_approval_can_be_relayed_by_anyone() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    let signed = h.orchestrator.request_signature(task_id).await.unwrap();
    assert_eq!(signed.request.client, h.client_addr());
    assert_eq!(signed.request.nonce, U256::ZERO);
    assert!(matches!(
        h.orchestrator.stage(task_id),
        ApprovalStage::SignatureReady { .. }
    ));

    h.orchestrator.session().disconnect();
    let relayer = Address::repeat_byte(0x77);
    h.orchestrator
        .submit_signature(task_id, Some(Arc::new(h.chain.as_sender(relayer))), None)
        .await
        .unwrap();

    assert_eq!(h.chain.task(task_id).unwrap().status, TaskStatus::Approved);
    assert_eq!(
        h.chain.writes(),
        vec![WriteCall::ApproveWithSignature {
            from: relayer,
            task_id,
            deadline: signed.request.deadline,
        }]
    );
}

#[tokio::test]
async fn expired_signature_is_refused_locally() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    let request = ApprovalRequest {
        task_id,
        client: h.client_addr(),
        nonce: U256::ZERO,
        deadline: unix_timestamp() - 1,
    };
    let stale = sign_approval(&h.client, request, h.orchestrator.domain())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .submit_signature(task_id, None, Some(stale))
        .await
        .unwrap_err();

    assert!(matches!(err, HustleError::InvalidState(_)));
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn signature_from_another_key_is_rejected() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    let request = ApprovalRequest::new(task_id, h.client_addr(), U256::ZERO, unix_timestamp());
    let forged = sign_approval(&h.worker, request, h.orchestrator.domain())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .submit_signature(task_id, None, Some(forged))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn pending_signature_blocks_direct_until_abandoned() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    h.orchestrator.request_signature(task_id).await.unwrap();
    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let previous = h.orchestrator.abandon(task_id).unwrap();
    assert!(matches!(previous, ApprovalStage::SignatureReady { .. }));
    assert_eq!(h.orchestrator.stage(task_id), ApprovalStage::Idle);

    h.orchestrator.approve_direct(task_id).await.unwrap();
}

#[tokio::test]
async fn disconnect_blocks_new_client_actions() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();
    h.orchestrator.session().disconnect();

    assert_eq!(
        h.orchestrator.request_signature(task_id).await.unwrap_err(),
        HustleError::NoIdentity
    );
    assert_eq!(
        h.orchestrator.approve_direct(task_id).await.unwrap_err(),
        HustleError::NoIdentity
    );
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn rejected_write_is_retryable() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();
    h.chain.set_reject_writes(true);

    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        h.orchestrator.stage(task_id),
        ApprovalStage::Failed {
            kind: ErrorKind::WriteRejected,
            retryable: true,
            ..
        }
    ));

    h.chain.set_reject_writes(false);
    assert_eq!(h.orchestrator.retry(task_id).unwrap(), ApprovalStage::Idle);
    h.orchestrator.approve_direct(task_id).await.unwrap();
    assert_eq!(h.chain.task(task_id).unwrap().status, TaskStatus::Approved);
}

#[tokio::test]
async fn failed_relay_keeps_signature_for_retry() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    h.orchestrator.request_signature(task_id).await.unwrap();
    h.chain.set_reject_writes(true);
    h.orchestrator
        .submit_signature(task_id, None, None)
        .await
        .unwrap_err();

    h.chain.set_reject_writes(false);
    assert!(matches!(
        h.orchestrator.retry(task_id).unwrap(),
        ApprovalStage::SignatureReady { .. }
    ));
    h.orchestrator
        .submit_signature(task_id, None, None)
        .await
        .unwrap();
    assert_eq!(h.chain.task(task_id).unwrap().status, TaskStatus::Approved);
}

#[tokio::test]
async fn reverted_transaction_fails_the_attempt() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();
    h.chain.set_revert_on_confirm(true);

    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FinalizationFailed);
    assert!(matches!(
        h.orchestrator.stage(task_id),
        ApprovalStage::Failed {
            mode: SubmissionMode::Direct,
            kind: ErrorKind::FinalizationFailed,
            ..
        }
    ));
    assert_eq!(h.chain.task(task_id).unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn approved_task_stays_settled() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();

    h.orchestrator.approve_direct(task_id).await.unwrap();
    let err = h.orchestrator.approve_direct(task_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.chain.writes().len(), 1);
}

#[tokio::test]
async fn stage_events_carry_progress_labels() {
    let h = Harness::new();
    h.connect(&h.client);
    let task_id = h.seed_pending();
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.approve_direct(task_id).await.unwrap();

    let mut labels = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.task_id, task_id);
        labels.push(event.label);
    }
    assert_eq!(labels, vec!["Approving...", "Confirming...", "Approved"]);
}

#[tokio::test]
async fn worker_can_file_a_dispute() {
    let h = Harness::new();
    h.connect(&h.worker);
    let task_id = h.seed_pending();

    h.orchestrator
        .file_dispute(task_id, "client went silent")
        .await
        .unwrap();

    assert_eq!(h.chain.task(task_id).unwrap().status, TaskStatus::Disputed);
    assert!(matches!(
        h.orchestrator.stage(task_id),
        ApprovalStage::Succeeded {
            mode: SubmissionMode::Dispute,
            ..
        }
    ));

    let again = h.orchestrator.file_dispute(task_id, "again").await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn dispute_needs_evidence_and_a_party() {
    let h = Harness::new();
    let task_id = h.seed_pending();

    h.connect(&h.worker);
    let err = h.orchestrator.file_dispute(task_id, "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let stranger = PrivateKeySigner::random();
    h.connect(&stranger);
    let err = h.orchestrator.file_dispute(task_id, "not mine").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn mark_expired_only_touches_overdue_tasks() {
    let h = Harness::new();
    h.connect(&h.worker);
    let live = h.seed_pending();
    let overdue = h
        .chain
        .seed_task(h.worker_addr(), h.client_addr(), unix_timestamp() - 60);

    h.orchestrator.mark_expired(&[live, overdue]).await.unwrap();

    assert_eq!(h.chain.task(overdue).unwrap().status, TaskStatus::Expired);
    assert_eq!(h.chain.task(live).unwrap().status, TaskStatus::Pending);
    assert!(matches!(
        h.chain.writes().as_slice(),
        [WriteCall::MarkExpired { task_ids, .. }] if task_ids == &vec![overdue]
    ));
}

#[tokio::test]
async fn mark_expired_skips_unknown_ids() {
    let h = Harness::new();
    h.connect(&h.worker);
    let overdue = h
        .chain
        .seed_task(h.worker_addr(), h.client_addr(), unix_timestamp() - 60);

    h.orchestrator
        .mark_expired(&[TaskId(999), overdue, TaskId(1000)])
        .await
        .unwrap();

    assert_eq!(h.chain.task(overdue).unwrap().status, TaskStatus::Expired);
    assert!(matches!(
        h.chain.writes().as_slice(),
        [WriteCall::MarkExpired { task_ids, .. }] if task_ids == &vec![overdue]
    ));

    let err = h.orchestrator.mark_expired(&[TaskId(999)]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.chain.writes().len(), 1);
}

#[tokio::test]
async fn mark_expired_reports_read_failure_when_nothing_qualifies() {
    let h = Harness::new();
    h.connect(&h.worker);
    let overdue = h
        .chain
        .seed_task(h.worker_addr(), h.client_addr(), unix_timestamp() - 60);
    h.chain.set_fail_reads(true);

    let err = h.orchestrator.mark_expired(&[overdue]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientFetch);
    assert!(err.is_retryable());
    assert!(h.chain.writes().is_empty());
}

#[tokio::test]
async fn late_signature_from_abandoned_attempt_is_dropped() {
    let h = Harness::new();
    let signer = Arc::new(StalledSigner::new(h.client.clone()));
    h.orchestrator.session().connect(Wallet::new(
        signer.clone(),
        Arc::new(h.chain.as_sender(h.client_addr())),
    ));
    let task_id = h.seed_pending();

    let stuck = tokio::spawn({
        let orchestrator = h.orchestrator.clone();
        async move { orchestrator.request_signature(task_id).await }
    });
    timeout(Duration::from_secs(5), async {
        while !matches!(
            h.orchestrator.stage(task_id),
            ApprovalStage::AwaitingSignature { .. }
        ) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first request never reached AwaitingSignature");
    let first_attempt = h.orchestrator.stage(task_id).attempt();
    assert_eq!(h.orchestrator.stage(task_id).label(), "Signing...");

    let abandoned = h.orchestrator.abandon(task_id).unwrap();
    assert!(matches!(abandoned, ApprovalStage::AwaitingSignature { .. }));

    let fresh = h.orchestrator.request_signature(task_id).await.unwrap();
    let fresh_attempt = h.orchestrator.stage(task_id).attempt();
    assert_ne!(fresh_attempt, first_attempt);

    signer.release();
    let late = stuck.await.unwrap();
    assert_eq!(late.unwrap_err().kind(), ErrorKind::InvalidState);

    match h.orchestrator.stage(task_id) {
        ApprovalStage::SignatureReady { attempt, approval } => {
            assert_eq!(Some(attempt), fresh_attempt);
            assert_eq!(approval, fresh);
        }
        other => panic!("expected the fresh signature to be kept, got {other:?}"),
    }
    assert!(h.chain.writes().is_empty());
}
