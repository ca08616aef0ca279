//! Chain provider with multi-RPC support and automatic failover

use crate::error::{rpc_reason, OrchestratorError, OrchestratorResult};

use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain this provider serves
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Last known block number
    last_block: RwLock<u64>,
}

impl ChainProvider {
    /// Create a new chain provider from a set of RPC endpoints
    pub fn new(chain_id: u64, rpc_urls: &[String]) -> OrchestratorResult<Self> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(OrchestratorError::ChainConnection(format!(
                "no valid RPC providers for chain {chain_id}"
            )));
        }

        Ok(Self {
            chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
            last_block: RwLock::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    /// Whether the node actually answered (as opposed to a transport failure).
    /// Answered errors are final; transport failures rotate endpoints.
    fn is_node_response(err: &ProviderError) -> bool {
        err.as_error_response().is_some()
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> OrchestratorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => {
                    let block_num = block.as_u64();
                    *self.last_block.write().await = block_num;
                    return Ok(block_num);
                }
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::ChainConnection(format!(
            "all providers failed for chain {}",
            self.chain_id
        )))
    }

    /// Execute a read-only call or a no-state-change simulation
    pub async fn call(&self, tx: &TypedTransaction) -> OrchestratorResult<Bytes> {
        for _ in 0..self.http_providers.len() {
            match self.http().call(tx, None).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if Self::is_node_response(&e) => {
                    return Err(OrchestratorError::RemoteRejected(rpc_reason(&e)));
                }
                Err(e) => {
                    warn!("Call transport failure on chain {}: {}", self.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::ChainConnection(format!(
            "all providers failed for chain {}",
            self.chain_id
        )))
    }

    /// Get the native balance of an account
    pub async fn get_balance(&self, account: Address) -> OrchestratorResult<U256> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_balance(account, None).await {
                Ok(balance) => return Ok(balance),
                Err(e) => {
                    warn!("Balance fetch failed on chain {}: {}", self.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(OrchestratorError::ChainConnection(format!(
            "all providers failed for chain {}",
            self.chain_id
        )))
    }

    /// Get a transaction receipt if the transaction has been included
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> OrchestratorResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| OrchestratorError::ChainConnection(e.to_string()))
    }

    /// Verify the endpoint really serves the expected chain
    pub async fn verify_chain_id(&self) -> OrchestratorResult<()> {
        let reported = self
            .http()
            .get_chainid()
            .await
            .map_err(|e| OrchestratorError::ChainConnection(e.to_string()))?
            .as_u64();

        if reported != self.chain_id {
            return Err(OrchestratorError::ChainConnection(format!(
                "endpoint serves chain {reported}, expected {}",
                self.chain_id
            )));
        }
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain_id, e);
                false
            }
        }
    }

    /// Last block observed by a successful call
    pub async fn last_block(&self) -> u64 {
        *self.last_block.read().await
    }
}
