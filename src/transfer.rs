//! Native and ERC-20 transfer execution
//!
//! Validates recipient and amount before any remote call, submits exactly
//! one transaction per action, and reports submitted/confirmed status with
//! the transaction hash and inclusion block.

use crate::abi::{self, ERC20};
use crate::error::OrchestratorResult;
use crate::reader::BalanceReader;
use crate::status::StatusReporter;
use crate::units;
use crate::wallet::{submit_and_confirm, TransactionIntent, TransactionOutcome, WalletGateway};

use std::sync::Arc;

/// What is being transferred
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// The chain's native currency
    Native,
    /// An ERC-20 token at the given address
    Token(String),
}

/// Executes one transfer per invocation
pub struct TransferExecutor {
    wallet: Arc<dyn WalletGateway>,
    reader: BalanceReader,
    native_decimals: u8,
}

impl TransferExecutor {
    pub fn new(wallet: Arc<dyn WalletGateway>, native_decimals: u8) -> Self {
        let reader = BalanceReader::new(wallet.clone());
        Self {
            wallet,
            reader,
            native_decimals,
        }
    }

    /// Transfer native currency or tokens to a recipient.
    ///
    /// `amount` is a decimal string converted at the asset's precision.
    pub async fn transfer(
        &self,
        recipient: &str,
        amount: &str,
        mode: TransferMode,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<TransactionOutcome> {
        let recipient = units::parse_address(recipient, "recipient")?;

        let intent = match mode {
            TransferMode::Native => {
                let value = units::parse_amount(amount, self.native_decimals)?;
                TransactionIntent::new(recipient, Default::default()).with_value(value)
            }
            TransferMode::Token(ref token) => {
                let token = units::parse_address(token, "token")?;
                let decimals = self.reader.read_decimals(token).await.unwrap_or(18);
                let value = units::parse_amount(amount, decimals)?;
                let data = abi::encode_call(&ERC20, "transfer", (recipient, value))?;
                TransactionIntent::new(token, data)
            }
        };

        submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "transfer").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{MemorySink, Stage};
    use crate::wallet::MockWalletGateway;
    use ethers::types::{Address, H256, U256};

    fn reporter(sink: &Arc<MemorySink>) -> StatusReporter {
        StatusReporter::new("transfer", sink.clone())
    }

    fn outcome(success: bool) -> crate::wallet::TransactionOutcome {
        crate::wallet::TransactionOutcome {
            tx_hash: H256::from_low_u64_be(7),
            block_number: 1234,
            success,
            logs: vec![],
        }
    }

    #[tokio::test]
    async fn invalid_recipient_blocks_submission_without_rpc() {
        // No expectations: any remote call panics the mock
        let wallet = MockWalletGateway::new();
        let executor = TransferExecutor::new(Arc::new(wallet), 18);
        let sink = Arc::new(MemorySink::new());

        let err = executor
            .transfer("0xnope", "1.0", TransferMode::Native, &reporter(&sink))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::OrchestratorError::InvalidInput(_)));
        assert!(sink.snapshot().is_empty());
    }

    #[tokio::test]
    async fn non_positive_amount_blocks_submission() {
        let wallet = MockWalletGateway::new();
        let executor = TransferExecutor::new(Arc::new(wallet), 18);
        let sink = Arc::new(MemorySink::new());

        let err = executor
            .transfer(
                "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14",
                "0",
                TransferMode::Native,
                &reporter(&sink),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::OrchestratorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn native_transfer_reports_submitted_then_confirmed() {
        let mut wallet = MockWalletGateway::new();
        wallet.expect_send().times(1).returning(|intent| {
            assert_eq!(intent.value, U256::from(1_500_000_000_000_000_000u128));
            assert!(intent.data.is_empty());
            Ok(H256::from_low_u64_be(7))
        });
        wallet
            .expect_await_outcome()
            .times(1)
            .returning(|_| Ok(outcome(true)));

        let executor = TransferExecutor::new(Arc::new(wallet), 18);
        let sink = Arc::new(MemorySink::new());

        let result = executor
            .transfer(
                "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14",
                "1.5",
                TransferMode::Native,
                &reporter(&sink),
            )
            .await
            .unwrap();
        assert_eq!(result.block_number, 1234);

        let stages: Vec<Stage> = sink.snapshot().iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![Stage::Submitted, Stage::Confirmed]);
    }

    #[tokio::test]
    async fn reverted_transfer_is_remote_rejected() {
        let mut wallet = MockWalletGateway::new();
        wallet
            .expect_send()
            .returning(|_| Ok(H256::from_low_u64_be(9)));
        wallet
            .expect_await_outcome()
            .returning(|_| Ok(outcome(false)));

        let executor = TransferExecutor::new(Arc::new(wallet), 18);
        let sink = Arc::new(MemorySink::new());

        let err = executor
            .transfer(
                "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14",
                "1",
                TransferMode::Native,
                &reporter(&sink),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OrchestratorError::RemoteRejected(_)
        ));
    }

    #[tokio::test]
    async fn token_transfer_encodes_erc20_call() {
        let token = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";
        let mut wallet = MockWalletGateway::new();

        // decimals read
        wallet.expect_call().times(1).returning(|_| {
            Ok(ethers::abi::encode(&[ethers::abi::Token::Uint(6u8.into())]).into())
        });
        wallet.expect_send().times(1).returning(|intent| {
            let expected =
                abi::encode_call(&ERC20, "transfer", (
                    "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14"
                        .parse::<Address>()
                        .unwrap(),
                    U256::from(2_500_000u64),
                ))
                .unwrap();
            assert_eq!(intent.data, expected);
            assert!(intent.value.is_zero());
            Ok(H256::from_low_u64_be(3))
        });
        wallet
            .expect_await_outcome()
            .returning(|_| Ok(outcome(true)));

        let executor = TransferExecutor::new(Arc::new(wallet), 18);
        let sink = Arc::new(MemorySink::new());

        executor
            .transfer(
                "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14",
                "2.5",
                TransferMode::Token(token.to_string()),
                &reporter(&sink),
            )
            .await
            .unwrap();
    }
}
