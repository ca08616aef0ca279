//! The wallet capability seam
//!
//! Everything the orchestrator needs from a wallet sits behind
//! [`WalletGateway`]: accounts, chain identity, network switching, read
//! calls, signed submission, receipt awaiting and change notifications.
//! The shipped implementation signs locally and talks JSON-RPC; tests mock
//! the trait to count and script remote calls.

pub mod rpc;

pub use rpc::RpcWallet;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::status::StatusReporter;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, H256, U256};
use tokio::sync::broadcast;

/// Parameters used to register an unrecognized network with the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub native_decimals: u8,
    pub rpc_urls: Vec<String>,
    pub explorer_url: String,
}

/// One encoded call, created per user action and consumed once by submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl TransactionIntent {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            value: U256::zero(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// The resolved result of a submitted transaction
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub tx_hash: H256,
    pub block_number: u64,
    pub success: bool,
    pub logs: Vec<Log>,
}

/// Wallet-side notifications the session manager subscribes to
#[derive(Debug, Clone)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Abstract wallet capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Request the wallet's account list
    async fn request_accounts(&self) -> OrchestratorResult<Vec<Address>>;

    /// The chain the wallet is currently on
    async fn chain_id(&self) -> OrchestratorResult<u64>;

    /// Ask the wallet to switch to a chain it already knows.
    /// Fails with `ChainUnrecognized` when the chain must be added first.
    async fn switch_chain(&self, chain_id: u64) -> OrchestratorResult<()>;

    /// Register a network with the wallet (and switch to it)
    async fn add_chain(&self, descriptor: &NetworkDescriptor) -> OrchestratorResult<()>;

    /// Native currency balance of an account
    async fn native_balance(&self, account: Address) -> OrchestratorResult<U256>;

    /// Read-only call or no-state-change simulation of an intent
    async fn call(&self, intent: &TransactionIntent) -> OrchestratorResult<Bytes>;

    /// Sign and submit an intent, returning the transaction hash immediately
    async fn send(&self, intent: &TransactionIntent) -> OrchestratorResult<H256>;

    /// Await the receipt of a previously submitted transaction
    async fn await_outcome(&self, tx_hash: H256) -> OrchestratorResult<TransactionOutcome>;

    /// Subscribe to account/chain change notifications
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Submit one intent and await its outcome, reporting the submitted hash and
/// the confirmed inclusion block along the way.
///
/// A mined-but-reverted transaction is a rejection like any other.
pub async fn submit_and_confirm(
    wallet: &dyn WalletGateway,
    intent: &TransactionIntent,
    reporter: &StatusReporter,
    label: &str,
) -> OrchestratorResult<TransactionOutcome> {
    let tx_hash = wallet.send(intent).await?;
    reporter.submitted(format!("{label} sent, awaiting confirmation"), tx_hash);
    crate::metrics::record_tx_submitted(label);

    let outcome = wallet.await_outcome(tx_hash).await?;
    if !outcome.success {
        crate::metrics::record_tx_failed(label);
        return Err(OrchestratorError::RemoteRejected(format!(
            "{label} reverted in block {}",
            outcome.block_number
        )));
    }

    reporter.confirmed(
        format!("{label} confirmed in block {}", outcome.block_number),
        tx_hash,
        outcome.block_number,
    );
    crate::metrics::record_tx_confirmed(label);

    Ok(outcome)
}
