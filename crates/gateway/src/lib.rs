pub mod api;
pub mod config;
pub mod create;
pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use approval::{ApprovalConfig, ApprovalOrchestrator, Session};
use contract_client::mock::MockContract;
use contract_client::{ContractClient, ContractConfig, ContractError, HustleReader, HustleWriter};
use upload::{MemoryPinning, PinataClient, PinningService, UploadAdapter, UploadError};

use crate::config::GatewayConfig;

/// Builds the transaction sender for a wallet that just connected.
pub trait WriterFactory: Send + Sync {
    fn writer_for(&self, signer: PrivateKeySigner) -> Result<Arc<dyn HustleWriter>, ContractError>;
}

pub struct RpcWriters {
    config: ContractConfig,
}

impl WriterFactory for RpcWriters {
    fn writer_for(&self, signer: PrivateKeySigner) -> Result<Arc<dyn HustleWriter>, ContractError> {
        Ok(Arc::new(ContractClient::new(&self.config)?.with_signer(signer)))
    }
}

impl WriterFactory for MockContract {
    fn writer_for(&self, signer: PrivateKeySigner) -> Result<Arc<dyn HustleWriter>, ContractError> {
        Ok(Arc::new(self.as_sender(signer.address())))
    }
}

pub struct AppState {
    pub reader: Arc<dyn HustleReader>,
    pub writers: Arc<dyn WriterFactory>,
    pub orchestrator: ApprovalOrchestrator,
    pub uploads: UploadAdapter<Arc<dyn PinningService>>,
    /// Sends signed approvals on behalf of clients when configured.
    pub relayer: Option<Arc<dyn HustleWriter>>,
    pub config: GatewayConfig,
}

impl AppState {
    pub fn session(&self) -> &Session {
        self.orchestrator.session()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("invalid relayer key: {0}")]
    RelayerKey(String),
}

pub fn build_state(config: GatewayConfig) -> Result<Arc<AppState>, SetupError> {
    let (reader, writers): (Arc<dyn HustleReader>, Arc<dyn WriterFactory>) = match &config.contract {
        Some(contract) => {
            tracing::info!(
                rpc_url = %contract.rpc_url,
                contract = %contract.contract_address,
                chain_id = config.chain_id,
                "using on-chain contract"
            );
            (
                Arc::new(ContractClient::new(contract)?),
                Arc::new(RpcWriters {
                    config: contract.clone(),
                }),
            )
        }
        None => {
            tracing::warn!("CONTRACT_ADDRESS not set, running against an in-memory chain");
            let chain = MockContract::new(config.chain_id, config.contract_address());
            (Arc::new(chain.clone()), Arc::new(chain))
        }
    };

    let pinning: Arc<dyn PinningService> = match &config.pinata {
        Some(pinata) => Arc::new(PinataClient::new(pinata.clone())?),
        None => {
            tracing::warn!("PINATA_JWT not set, proofs are kept in memory");
            Arc::new(MemoryPinning::new())
        }
    };

    let relayer = match &config.relayer_key {
        Some(key) => {
            let signer = key
                .parse::<PrivateKeySigner>()
                .map_err(|e| SetupError::RelayerKey(e.to_string()))?;
            tracing::info!(relayer = %signer.address(), "signature relayer enabled");
            Some(writers.writer_for(signer)?)
        }
        None => None,
    };

    Ok(assemble(reader, writers, pinning, relayer, config))
}

fn assemble(
    reader: Arc<dyn HustleReader>,
    writers: Arc<dyn WriterFactory>,
    pinning: Arc<dyn PinningService>,
    relayer: Option<Arc<dyn HustleWriter>>,
    config: GatewayConfig,
) -> Arc<AppState> {
    let orchestrator = ApprovalOrchestrator::new(
        reader.clone(),
        Session::new(),
        ApprovalConfig {
            chain_id: config.chain_id,
            contract_address: config.contract_address(),
            read_timeout: config.read_timeout,
            signing_timeout: config.signing_timeout,
        },
    );

    Arc::new(AppState {
        reader,
        writers,
        orchestrator,
        uploads: UploadAdapter::new(pinning, config.upload_limits),
        relayer,
        config,
    })
}

pub const TEST_RELAYER: Address = Address::repeat_byte(0x99);

/// Gateway over an in-memory chain and pinning service. The returned
/// `MockContract` shares state with the gateway for seeding and inspection.
pub fn setup_test_gateway() -> (Arc<AppState>, MockContract, Arc<MemoryPinning>) {
    let config = GatewayConfig {
        http_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..GatewayConfig::default()
    };
    let chain = MockContract::new(config.chain_id, config.contract_address());
    let pinning = Arc::new(MemoryPinning::new());
    let relayer: Arc<dyn HustleWriter> = Arc::new(chain.as_sender(TEST_RELAYER));

    let state = assemble(
        Arc::new(chain.clone()),
        Arc::new(chain.clone()),
        pinning.clone(),
        Some(relayer),
        config,
    );
    (state, chain, pinning)
}
