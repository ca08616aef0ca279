//! JSON-RPC wallet implementation
//!
//! A locally-signing stand-in for a browser wallet extension: it tracks a
//! set of registered networks, a current chain, and signs with a key loaded
//! from the environment or an encrypted keystore. Switch/add-chain semantics
//! mirror an extension wallet so the session manager's network guard behaves
//! identically against either.

use super::{
    NetworkDescriptor, TransactionIntent, TransactionOutcome, WalletEvent, WalletGateway,
};
use crate::chain::ChainProvider;
use crate::config::{NetworkConfig, OrchestratorConfig, WalletConfig};
use crate::error::{
    jsonrpc_reason, strip_revert_prefix, OrchestratorError, OrchestratorResult,
};

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Middleware, MiddlewareError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, H256, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Locally-signing wallet over one or more registered networks
pub struct RpcWallet {
    signer: LocalWallet,
    chains: RwLock<HashMap<u64, Arc<ChainProvider>>>,
    current: RwLock<u64>,
    events: broadcast::Sender<WalletEvent>,
    receipt_timeout: Duration,
    receipt_poll: Duration,
}

impl RpcWallet {
    /// Connect to the configured network with a locally loaded key
    pub async fn connect(
        network: &NetworkConfig,
        wallet: &WalletConfig,
        orchestrator: &OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        let signer = Self::load_signer(wallet)?;
        info!("Wallet initialized for account {:?}", signer.address());

        let provider = Arc::new(ChainProvider::new(network.chain_id, &network.rpc_urls)?);
        provider.verify_chain_id().await?;

        let mut chains = HashMap::new();
        chains.insert(network.chain_id, provider);

        let (events, _) = broadcast::channel(64);

        Ok(Self {
            signer,
            chains: RwLock::new(chains),
            current: RwLock::new(network.chain_id),
            events,
            receipt_timeout: Duration::from_secs(orchestrator.receipt_timeout_secs),
            receipt_poll: Duration::from_millis(orchestrator.receipt_poll_ms),
        })
    }

    /// Load the signing key from the environment or an encrypted keystore
    fn load_signer(config: &WalletConfig) -> OrchestratorResult<LocalWallet> {
        let env_name = config
            .private_key_env
            .as_deref()
            .unwrap_or("ORCHESTRATOR_PRIVATE_KEY");

        if let Ok(key) = std::env::var(env_name) {
            return key.parse::<LocalWallet>().map_err(|e| {
                OrchestratorError::WalletUnavailable(format!("invalid private key: {e}"))
            });
        }

        if let Some(path) = config.keystore_path.as_deref() {
            let password = std::env::var("ORCHESTRATOR_KEYSTORE_PASSWORD").map_err(|_| {
                OrchestratorError::WalletUnavailable(
                    "ORCHESTRATOR_KEYSTORE_PASSWORD not set for keystore".to_string(),
                )
            })?;
            return LocalWallet::decrypt_keystore(path, password).map_err(|e| {
                OrchestratorError::WalletUnavailable(format!("keystore decryption failed: {e}"))
            });
        }

        Err(OrchestratorError::WalletUnavailable(format!(
            "no signing key: set {env_name} or configure a keystore"
        )))
    }

    async fn current_provider(&self) -> OrchestratorResult<Arc<ChainProvider>> {
        let current = *self.current.read().await;
        self.chains
            .read()
            .await
            .get(&current)
            .cloned()
            .ok_or(OrchestratorError::ChainUnrecognized { chain_id: current })
    }

    fn to_typed(&self, intent: &TransactionIntent) -> TypedTransaction {
        Eip1559TransactionRequest::new()
            .from(self.signer.address())
            .to(intent.to)
            .data(intent.data.clone())
            .value(intent.value)
            .into()
    }
}

#[async_trait]
impl WalletGateway for RpcWallet {
    async fn request_accounts(&self) -> OrchestratorResult<Vec<Address>> {
        let accounts = vec![self.signer.address()];
        // Extension wallets notify on account exposure; mirrored here
        let _ = self
            .events
            .send(WalletEvent::AccountsChanged(accounts.clone()));
        Ok(accounts)
    }

    async fn chain_id(&self) -> OrchestratorResult<u64> {
        Ok(*self.current.read().await)
    }

    async fn switch_chain(&self, chain_id: u64) -> OrchestratorResult<()> {
        if !self.chains.read().await.contains_key(&chain_id) {
            return Err(OrchestratorError::ChainUnrecognized { chain_id });
        }

        *self.current.write().await = chain_id;
        let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
        debug!("Switched to chain {}", chain_id);
        Ok(())
    }

    async fn add_chain(&self, descriptor: &NetworkDescriptor) -> OrchestratorResult<()> {
        let provider = Arc::new(ChainProvider::new(
            descriptor.chain_id,
            &descriptor.rpc_urls,
        )?);
        provider.verify_chain_id().await?;

        self.chains
            .write()
            .await
            .insert(descriptor.chain_id, provider);

        // Registering a network also switches to it, as extension wallets do
        *self.current.write().await = descriptor.chain_id;
        let _ = self
            .events
            .send(WalletEvent::ChainChanged(descriptor.chain_id));
        info!(
            "Registered network {} (chain {})",
            descriptor.name, descriptor.chain_id
        );
        Ok(())
    }

    async fn native_balance(&self, account: Address) -> OrchestratorResult<U256> {
        self.current_provider().await?.get_balance(account).await
    }

    async fn call(&self, intent: &TransactionIntent) -> OrchestratorResult<Bytes> {
        let provider = self.current_provider().await?;
        provider.call(&self.to_typed(intent)).await
    }

    async fn send(&self, intent: &TransactionIntent) -> OrchestratorResult<H256> {
        let chain_id = *self.current.read().await;
        let provider = self.current_provider().await?;

        let signer = self.signer.clone().with_chain_id(chain_id);
        let client = SignerMiddleware::new(provider.http().clone(), signer);

        let tx = self.to_typed(intent);
        let pending = client.send_transaction(tx, None).await.map_err(|e| {
            let reason = match e.as_error_response() {
                Some(resp) => jsonrpc_reason(resp),
                None => strip_revert_prefix(&e.to_string()),
            };
            OrchestratorError::RemoteRejected(reason)
        })?;

        Ok(pending.tx_hash())
    }

    async fn await_outcome(&self, tx_hash: H256) -> OrchestratorResult<TransactionOutcome> {
        let provider = self.current_provider().await?;
        let poll = self.receipt_poll;

        let wait = async {
            loop {
                if let Some(receipt) = provider.get_transaction_receipt(tx_hash).await? {
                    let success = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
                    return Ok(TransactionOutcome {
                        tx_hash,
                        block_number: receipt
                            .block_number
                            .map(|b| b.as_u64())
                            .unwrap_or_default(),
                        success,
                        logs: receipt.logs,
                    });
                }
                tokio::time::sleep(poll).await;
            }
        };

        tokio::time::timeout(self.receipt_timeout, wait)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: format!("receipt for {tx_hash:?}"),
            })?
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
