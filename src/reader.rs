//! Balance and metadata reads
//!
//! Read-only queries against the wallet's current chain: native balances,
//! ERC-20 snapshots, and the fund reference load sequence. Independent reads
//! within one action are issued concurrently and awaited jointly.

use crate::abi::{self, COMPTROLLER, ERC20};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::units;
use crate::wallet::{TransactionIntent, WalletGateway};

use ethers::types::{Address, U256};
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of an ERC-20 position
#[derive(Debug, Clone, Serialize)]
pub struct TokenSnapshot {
    pub token: Option<Address>,
    pub symbol: String,
    pub decimals: u8,
    pub balance: U256,
    pub balance_display: String,
}

impl TokenSnapshot {
    /// Empty snapshot for a missing or malformed token address
    fn empty() -> Self {
        Self {
            token: None,
            symbol: String::new(),
            decimals: 18,
            balance: U256::zero(),
            balance_display: "0".to_string(),
        }
    }
}

/// In-memory fund reference, replaced wholesale on each load
#[derive(Debug, Clone, Serialize)]
pub struct FundReference {
    pub comptroller: Address,
    pub vault: Address,
    pub denomination_asset: Address,
    pub denomination_symbol: String,
    pub denomination_decimals: u8,
    pub gross_asset_value: U256,
    pub gross_share_value: U256,
}

/// Read-only queries for balances, token metadata and fund references
pub struct BalanceReader {
    wallet: Arc<dyn WalletGateway>,
}

impl BalanceReader {
    pub fn new(wallet: Arc<dyn WalletGateway>) -> Self {
        Self { wallet }
    }

    /// Native currency balance of an account
    pub async fn native_balance(&self, account: Address) -> OrchestratorResult<U256> {
        self.wallet.native_balance(account).await
    }

    /// Fetch symbol, decimals and balance for a token, concurrently.
    ///
    /// A missing or syntactically invalid token address yields an empty
    /// snapshot without issuing any remote call.
    pub async fn token_snapshot(
        &self,
        account: Address,
        token: Option<&str>,
    ) -> OrchestratorResult<TokenSnapshot> {
        let Some(raw) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(TokenSnapshot::empty());
        };
        if !units::is_hex_address(raw) {
            return Ok(TokenSnapshot::empty());
        }
        let token = units::parse_address(raw, "token")?;

        let (symbol, decimals, balance) = tokio::join!(
            self.read_symbol(token),
            self.read_decimals(token),
            self.read_balance(token, account),
        );

        // Metadata failures degrade to defaults; only the balance read is
        // load-bearing.
        let symbol = symbol.unwrap_or_default();
        let decimals = decimals.unwrap_or(18);
        let balance = balance?;

        Ok(TokenSnapshot {
            token: Some(token),
            symbol,
            decimals,
            balance,
            balance_display: units::format_amount(balance, decimals),
        })
    }

    /// Load a fund reference from its pool controller address.
    ///
    /// Resolves the denomination asset first, then fetches vault, valuation
    /// figures and denomination metadata concurrently.
    pub async fn load_fund(&self, comptroller: &str) -> OrchestratorResult<FundReference> {
        let comptroller = units::parse_address(comptroller, "comptroller")?;

        let denomination: Address = self
            .read(comptroller, &COMPTROLLER, "getDenominationAsset", ())
            .await?;

        let (vault, gav, share_value, symbol, decimals) = tokio::join!(
            self.read::<Address>(comptroller, &COMPTROLLER, "getVaultProxy", ()),
            self.read::<U256>(comptroller, &COMPTROLLER, "calcGav", ()),
            self.read::<U256>(comptroller, &COMPTROLLER, "calcGrossShareValue", ()),
            self.read_symbol(denomination),
            self.read_decimals(denomination),
        );

        Ok(FundReference {
            comptroller,
            vault: vault?,
            denomination_asset: denomination,
            denomination_symbol: symbol.unwrap_or_default(),
            denomination_decimals: decimals.unwrap_or(18),
            gross_asset_value: gav?,
            gross_share_value: share_value?,
        })
    }

    /// ERC-20 balance of an account
    pub async fn read_balance(&self, token: Address, account: Address) -> OrchestratorResult<U256> {
        self.read(token, &ERC20, "balanceOf", account).await
    }

    /// ERC-20 symbol
    pub async fn read_symbol(&self, token: Address) -> OrchestratorResult<String> {
        self.read(token, &ERC20, "symbol", ()).await
    }

    /// ERC-20 decimals
    pub async fn read_decimals(&self, token: Address) -> OrchestratorResult<u8> {
        self.read(token, &ERC20, "decimals", ()).await
    }

    async fn read<D: ethers::abi::Detokenize>(
        &self,
        to: Address,
        contract: &ethers::contract::BaseContract,
        name: &str,
        args: impl ethers::abi::Tokenize + Send,
    ) -> OrchestratorResult<D> {
        let data = abi::encode_call(contract, name, args)?;
        let returned = self.wallet.call(&TransactionIntent::new(to, data)).await?;
        abi::decode_output(contract, name, &returned)
    }
}

impl Clone for BalanceReader {
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::MockWalletGateway;
    use ethers::abi::Token;
    use ethers::types::Bytes;

    fn account() -> Address {
        Address::from([0xaa; 20])
    }

    #[tokio::test]
    async fn invalid_token_address_yields_empty_snapshot_without_rpc() {
        // No expectations set: any remote call would panic the mock
        let wallet = MockWalletGateway::new();
        let reader = BalanceReader::new(Arc::new(wallet));

        for input in [None, Some(""), Some("0x1234"), Some("garbage")] {
            let snapshot = reader.token_snapshot(account(), input).await.unwrap();
            assert_eq!(snapshot.balance, U256::zero());
            assert!(snapshot.symbol.is_empty());
            assert!(snapshot.token.is_none());
        }
    }

    #[tokio::test]
    async fn valid_token_fetches_metadata_and_balance() {
        let token = Address::from([0x22; 20]);
        let mut wallet = MockWalletGateway::new();

        wallet.expect_call().times(3).returning(move |intent| {
            let selector = &intent.data[..4];
            if selector == &abi::encode_call(&ERC20, "symbol", ()).unwrap()[..4] {
                Ok(Bytes::from(ethers::abi::encode(&[Token::String(
                    "USDC".into(),
                )])))
            } else if selector == &abi::encode_call(&ERC20, "decimals", ()).unwrap()[..4] {
                Ok(Bytes::from(ethers::abi::encode(&[Token::Uint(6u8.into())])))
            } else {
                Ok(Bytes::from(ethers::abi::encode(&[Token::Uint(
                    U256::from(1_500_000u64),
                )])))
            }
        });

        let reader = BalanceReader::new(Arc::new(wallet));
        let snapshot = reader
            .token_snapshot(account(), Some(&format!("{token:#x}")))
            .await
            .unwrap();

        assert_eq!(snapshot.symbol, "USDC");
        assert_eq!(snapshot.decimals, 6);
        assert_eq!(snapshot.balance, U256::from(1_500_000u64));
        assert_eq!(snapshot.balance_display, "1.500000");
    }

    #[tokio::test]
    async fn metadata_failures_degrade_to_defaults() {
        let mut wallet = MockWalletGateway::new();

        wallet.expect_call().times(3).returning(move |intent| {
            let selector = &intent.data[..4];
            if selector == &abi::encode_call(&ERC20, "balanceOf", (account(),)).unwrap()[..4] {
                Ok(Bytes::from(ethers::abi::encode(&[Token::Uint(
                    U256::from(5u64),
                )])))
            } else {
                Err(OrchestratorError::RemoteRejected("no metadata".into()))
            }
        });

        let reader = BalanceReader::new(Arc::new(wallet));
        let snapshot = reader
            .token_snapshot(
                account(),
                Some("0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14"),
            )
            .await
            .unwrap();

        assert!(snapshot.symbol.is_empty());
        assert_eq!(snapshot.decimals, 18);
        assert_eq!(snapshot.balance, U256::from(5u64));
    }
}
