//! EIP-712 approval messages.
//!
//! A client signs `ApproveTask` off-chain; anyone holding the signature can
//! later relay it through `approveTaskWithSignature`.

use std::borrow::Cow;

use alloy::primitives::{Address, Bytes, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;
use hustle_core::ids::TaskId;
use serde::{Deserialize, Serialize};

use crate::ContractError;

pub const DOMAIN_NAME: &str = "ProofOfHustle";
pub const DOMAIN_VERSION: &str = "2";
/// Lisk Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 4202;
/// Lifetime of a freshly built approval signature.
pub const SIGNATURE_TTL_SECS: u64 = 86_400;

sol! {
    struct ApproveTask {
        uint256 taskId;
        address client;
        uint256 nonce;
        uint256 deadline;
    }
}

pub fn approval_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(DOMAIN_NAME)),
        Some(Cow::Borrowed(DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub task_id: TaskId,
    pub client: Address,
    pub nonce: U256,
    /// Seconds since epoch after which the signature is void.
    pub deadline: u64,
}

impl ApprovalRequest {
    pub fn new(task_id: TaskId, client: Address, nonce: U256, now: u64) -> Self {
        Self {
            task_id,
            client,
            nonce,
            deadline: now + SIGNATURE_TTL_SECS,
        }
    }

    pub fn message(&self) -> ApproveTask {
        ApproveTask {
            taskId: U256::from(self.task_id.0),
            client: self.client,
            nonce: self.nonce,
            deadline: U256::from(self.deadline),
        }
    }

    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        self.message().eip712_signing_hash(domain)
    }

    /// Mirrors the contract's own check: valid up to and including `deadline`.
    pub fn is_live_at(&self, now: u64) -> bool {
        now <= self.deadline
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedApproval {
    pub request: ApprovalRequest,
    pub signature: Bytes,
}

impl SignedApproval {
    pub fn recover_signer(&self, domain: &Eip712Domain) -> Result<Address, ContractError> {
        let sig = Signature::try_from(self.signature.as_ref())
            .map_err(|e| ContractError::Decode(format!("bad signature encoding: {e}")))?;
        sig.recover_address_from_prehash(&self.request.signing_hash(domain))
            .map_err(|e| ContractError::Decode(format!("signature recovery failed: {e}")))
    }

    /// Checks a signature the way the verifier will before it is relayed.
    pub fn verify(&self, domain: &Eip712Domain, now: u64) -> Result<(), ContractError> {
        if !self.request.is_live_at(now) {
            return Err(ContractError::Revert(crate::RevertReason::DeadlineExpired));
        }
        if self.recover_signer(domain)? != self.request.client {
            return Err(ContractError::Revert(crate::RevertReason::InvalidSignature));
        }
        Ok(())
    }
}

/// External wallet able to sign typed-data hashes.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    fn address(&self) -> Address;
    async fn sign_hash(&self, hash: B256) -> Result<Signature, ContractError>;
}

#[async_trait]
impl SigningProvider for PrivateKeySigner {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_hash(&self, hash: B256) -> Result<Signature, ContractError> {
        Signer::sign_hash(self, &hash)
            .await
            .map_err(|e| ContractError::Rejected(e.to_string()))
    }
}

pub async fn sign_approval(
    signer: &dyn SigningProvider,
    request: ApprovalRequest,
    domain: &Eip712Domain,
) -> Result<SignedApproval, ContractError> {
    let signature = signer.sign_hash(request.signing_hash(domain)).await?;
    Ok(SignedApproval {
        request,
        signature: Bytes::from(signature.as_bytes().to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Eip712Domain {
        approval_domain(DEFAULT_CHAIN_ID, Address::repeat_byte(0x2a))
    }

    #[tokio::test]
    async fn signature_recovers_to_client() {
        let signer = PrivateKeySigner::random();
        let client = SigningProvider::address(&signer);
        let request = ApprovalRequest::new(TaskId(5), client, U256::from(0), 1_000);

        let signed = sign_approval(&signer, request, &domain()).await.unwrap();

        assert_eq!(signed.signature.len(), 65);
        assert_eq!(signed.recover_signer(&domain()).unwrap(), client);
        signed.verify(&domain(), 1_000).unwrap();
    }

    #[tokio::test]
    async fn deadline_window_is_inclusive() {
        let signer = PrivateKeySigner::random();
        let client = SigningProvider::address(&signer);
        let now = 1_700_000_000;
        let request = ApprovalRequest::new(TaskId(5), client, U256::from(3), now);
        assert_eq!(request.deadline, now + 86_400);

        let signed = sign_approval(&signer, request, &domain()).await.unwrap();
        assert!(signed.verify(&domain(), now + 86_399).is_ok());
        assert!(signed.verify(&domain(), now + 86_400).is_ok());
        assert!(matches!(
            signed.verify(&domain(), now + 86_401),
            Err(ContractError::Revert(crate::RevertReason::DeadlineExpired))
        ));
    }

    #[tokio::test]
    async fn signature_is_bound_to_domain_and_client() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let request = ApprovalRequest::new(
            TaskId(5),
            SigningProvider::address(&other),
            U256::from(0),
            1_000,
        );

        let signed = sign_approval(&signer, request, &domain()).await.unwrap();
        assert!(signed.verify(&domain(), 1_000).is_err());

        let honest = sign_approval(&other, request, &domain()).await.unwrap();
        let foreign = approval_domain(1, Address::repeat_byte(0x2a));
        assert_ne!(honest.recover_signer(&foreign).unwrap(), request.client);
    }

    #[test]
    fn message_fields_follow_request() {
        let request = ApprovalRequest {
            task_id: TaskId(9),
            client: Address::repeat_byte(0x11),
            nonce: U256::from(4),
            deadline: 77,
        };
        let msg = request.message();
        assert_eq!(msg.taskId, U256::from(9));
        assert_eq!(msg.deadline, U256::from(77));
        assert_eq!(msg.nonce, U256::from(4));
    }
}
