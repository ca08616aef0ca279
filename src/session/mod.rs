//! Session management
//!
//! Owns the single active session per orchestrator instance: the connected
//! account, the chain the wallet is on, and the subscription to wallet
//! change notifications. Connecting enforces the required network, asking
//! the wallet to switch (and register the network if it is unrecognized)
//! before giving up with `WrongNetwork`.

use crate::config::NetworkConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wallet::{WalletEvent, WalletGateway};

use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The active session: one account, one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub account: Address,
    pub chain_id: u64,
}

/// Session lifecycle notifications for dependent components
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected(Session),
    AccountChanged(Address),
    ChainChanged(u64),
    Disconnected,
}

/// Manages wallet connection and the required-network guard
pub struct SessionManager {
    wallet: Arc<dyn WalletGateway>,
    network: NetworkConfig,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
    watcher: RwLock<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(wallet: Arc<dyn WalletGateway>, network: NetworkConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            wallet,
            network,
            session: RwLock::new(None),
            events,
            watcher: RwLock::new(None),
        })
    }

    /// Connect the wallet and enforce the required network.
    ///
    /// A missing wallet capability or empty account list is fatal and never
    /// retried automatically.
    pub async fn connect(self: &Arc<Self>) -> OrchestratorResult<Session> {
        let accounts = self
            .wallet
            .request_accounts()
            .await
            .map_err(|e| OrchestratorError::WalletUnavailable(e.to_string()))?;

        let account = *accounts
            .first()
            .ok_or_else(|| OrchestratorError::WalletUnavailable("no accounts".to_string()))?;

        let chain_id = self.ensure_network().await?;

        let session = Session { account, chain_id };
        *self.session.write().await = Some(session);
        self.spawn_watcher().await;

        info!(
            "Session connected: account {:?} on chain {}",
            account, chain_id
        );
        let _ = self.events.send(SessionEvent::Connected(session));

        Ok(session)
    }

    /// Drive the wallet onto the required chain.
    ///
    /// Issues at most one switch request and, if the wallet reports the chain
    /// as unregistered, at most one add-network request. A mismatch after
    /// that is `WrongNetwork` with no further requests.
    async fn ensure_network(&self) -> OrchestratorResult<u64> {
        let required = self.network.chain_id;
        let current = self.wallet.chain_id().await?;
        if current == required {
            return Ok(current);
        }

        match self.wallet.switch_chain(required).await {
            Ok(()) => {}
            Err(OrchestratorError::ChainUnrecognized { .. }) => {
                self.wallet.add_chain(&self.network.descriptor()).await?;
            }
            Err(e) => return Err(e),
        }

        let after = self.wallet.chain_id().await?;
        if after != required {
            return Err(OrchestratorError::WrongNetwork {
                expected: required,
                actual: after,
            });
        }

        Ok(after)
    }

    /// Watch wallet notifications and re-derive the session on change
    async fn spawn_watcher(self: &Arc<Self>) {
        let mut rx = self.wallet.subscribe();
        let manager = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_wallet_event(event).await;
            }
        });

        let mut watcher = self.watcher.write().await;
        if let Some(previous) = watcher.replace(handle) {
            previous.abort();
        }
    }

    async fn handle_wallet_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(account) => {
                    let mut session = self.session.write().await;
                    if let Some(s) = session.as_mut() {
                        s.account = *account;
                    }
                    info!("Session account changed to {:?}", account);
                    let _ = self.events.send(SessionEvent::AccountChanged(*account));
                }
                None => {
                    *self.session.write().await = None;
                    warn!("Wallet reported no accounts; session disconnected");
                    let _ = self.events.send(SessionEvent::Disconnected);
                }
            },
            WalletEvent::ChainChanged(chain_id) => {
                {
                    let mut session = self.session.write().await;
                    if let Some(s) = session.as_mut() {
                        s.chain_id = chain_id;
                    }
                }
                if chain_id != self.network.chain_id {
                    warn!(
                        "Wallet moved to chain {}, required chain is {}",
                        chain_id, self.network.chain_id
                    );
                }
                let _ = self.events.send(SessionEvent::ChainChanged(chain_id));
            }
        }
    }

    /// The current session, or `WalletUnavailable` when disconnected
    pub async fn current(&self) -> OrchestratorResult<Session> {
        (*self.session.read().await)
            .ok_or_else(|| OrchestratorError::WalletUnavailable("no active session".to_string()))
    }

    /// Whether the session sits on the required network
    pub async fn on_required_network(&self) -> bool {
        matches!(
            *self.session.read().await,
            Some(s) if s.chain_id == self.network.chain_id
        )
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Tear the session down and stop watching wallet notifications
    pub async fn teardown(&self) {
        if let Some(handle) = self.watcher.write().await.take() {
            handle.abort();
        }
        *self.session.write().await = None;
        let _ = self.events.send(SessionEvent::Disconnected);
        info!("Session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::MockWalletGateway;
    use mockall::predicate::eq;

    fn network() -> NetworkConfig {
        NetworkConfig {
            chain_id: 11155111,
            name: "Sepolia".to_string(),
            rpc_urls: vec!["https://rpc.sepolia.org".to_string()],
            native_symbol: "ETH".to_string(),
            native_decimals: 18,
            explorer_url: "https://sepolia.etherscan.io".to_string(),
        }
    }

    fn account() -> Address {
        Address::from([0x11; 20])
    }

    fn subscription() -> tokio::sync::broadcast::Receiver<WalletEvent> {
        tokio::sync::broadcast::channel(8).1
    }

    #[tokio::test]
    async fn connect_on_correct_chain_issues_no_switch() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_request_accounts()
            .times(1)
            .returning(|| Ok(vec![account()]));
        wallet
            .expect_chain_id()
            .times(1)
            .returning(|| Ok(11155111));
        wallet.expect_switch_chain().times(0);
        wallet.expect_add_chain().times(0);
        wallet.expect_subscribe().returning(subscription);

        let manager = SessionManager::new(Arc::new(wallet), network());
        let session = manager.connect().await.unwrap();
        assert_eq!(session.account, account());
        assert_eq!(session.chain_id, 11155111);
    }

    #[tokio::test]
    async fn mismatch_triggers_exactly_one_switch() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_request_accounts()
            .returning(|| Ok(vec![account()]));
        let mut chain = mockall::Sequence::new();
        wallet
            .expect_chain_id()
            .times(1)
            .in_sequence(&mut chain)
            .returning(|| Ok(1));
        wallet
            .expect_switch_chain()
            .with(eq(11155111u64))
            .times(1)
            .returning(|_| Ok(()));
        wallet
            .expect_chain_id()
            .times(1)
            .in_sequence(&mut chain)
            .returning(|| Ok(11155111));
        wallet.expect_add_chain().times(0);
        wallet.expect_subscribe().returning(subscription);

        let manager = SessionManager::new(Arc::new(wallet), network());
        let session = manager.connect().await.unwrap();
        assert_eq!(session.chain_id, 11155111);
    }

    #[tokio::test]
    async fn unrecognized_chain_triggers_exactly_one_add() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_request_accounts()
            .returning(|| Ok(vec![account()]));
        let mut chain = mockall::Sequence::new();
        wallet
            .expect_chain_id()
            .times(1)
            .in_sequence(&mut chain)
            .returning(|| Ok(1));
        wallet
            .expect_switch_chain()
            .times(1)
            .returning(|_| Err(OrchestratorError::ChainUnrecognized { chain_id: 11155111 }));
        wallet
            .expect_add_chain()
            .times(1)
            .returning(|_| Ok(()));
        wallet
            .expect_chain_id()
            .times(1)
            .in_sequence(&mut chain)
            .returning(|| Ok(11155111));
        wallet.expect_subscribe().returning(subscription);

        let manager = SessionManager::new(Arc::new(wallet), network());
        assert!(manager.connect().await.is_ok());
    }

    #[tokio::test]
    async fn persistent_mismatch_is_wrong_network_with_no_extra_requests() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_request_accounts()
            .returning(|| Ok(vec![account()]));
        wallet.expect_chain_id().times(2).returning(|| Ok(1));
        wallet
            .expect_switch_chain()
            .times(1)
            .returning(|_| Ok(()));
        wallet.expect_add_chain().times(0);
        wallet.expect_subscribe().times(0);

        let manager = SessionManager::new(Arc::new(wallet), network());
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::WrongNetwork {
                expected: 11155111,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn account_change_updates_the_session() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_request_accounts()
            .returning(|| Ok(vec![account()]));
        wallet.expect_chain_id().returning(|| Ok(11155111));
        wallet.expect_subscribe().returning(subscription);

        let manager = SessionManager::new(Arc::new(wallet), network());
        manager.connect().await.unwrap();

        let replacement = Address::from([0x22; 20]);
        manager
            .handle_wallet_event(WalletEvent::AccountsChanged(vec![replacement]))
            .await;
        assert_eq!(manager.current().await.unwrap().account, replacement);

        // An empty account list tears the session down
        manager
            .handle_wallet_event(WalletEvent::AccountsChanged(vec![]))
            .await;
        assert!(manager.current().await.is_err());
    }

    #[tokio::test]
    async fn missing_accounts_is_fatal() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_request_accounts()
            .returning(|| Ok(vec![]));
        wallet.expect_chain_id().times(0);
        wallet.expect_subscribe().times(0);

        let manager = SessionManager::new(Arc::new(wallet), network());
        let err = manager.connect().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
