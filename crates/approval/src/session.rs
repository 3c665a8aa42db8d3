use std::sync::Arc;

use alloy::primitives::Address;
use contract_client::signature::SigningProvider;
use contract_client::HustleWriter;
use tokio::sync::watch;

/// A connected wallet: the identity that signs messages and the writer that
/// sends transactions from that identity.
#[derive(Clone)]
pub struct Wallet {
    pub signer: Arc<dyn SigningProvider>,
    pub writer: Arc<dyn HustleWriter>,
}

impl Wallet {
    pub fn new(signer: Arc<dyn SigningProvider>, writer: Arc<dyn HustleWriter>) -> Self {
        Self { signer, writer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

/// Process-wide wallet session. Connect and disconnect can happen at any
/// moment; consumers read the current wallet at the point of use instead of
/// holding on to it.
#[derive(Clone)]
pub struct Session {
    tx: Arc<watch::Sender<Option<Wallet>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn connect(&self, wallet: Wallet) {
        tracing::info!(address = %wallet.address(), "wallet connected");
        self.tx.send_replace(Some(wallet));
    }

    pub fn disconnect(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            tracing::info!(address = %previous.address(), "wallet disconnected");
        }
    }

    pub fn current(&self) -> Option<Wallet> {
        self.tx.borrow().clone()
    }

    pub fn address(&self) -> Option<Address> {
        self.tx.borrow().as_ref().map(Wallet::address)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Wallet>> {
        self.tx.subscribe()
    }
}
