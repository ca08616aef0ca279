//! Vault-held asset swaps via the protocol's adapter plumbing
//!
//! A swap never touches assets directly: the order is encoded for the swap
//! adapter, wrapped for the generic extension entry point and routed through
//! the fund's comptroller to the integration manager, which delegates to the
//! adapter against the vault's holdings.

use super::FundOrchestrator;
use crate::abi::{self, COMPTROLLER};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::status::StatusReporter;
use crate::units;
use crate::wallet::{submit_and_confirm, TransactionIntent, TransactionOutcome};

use ethers::types::{Address, U256};
use serde::Deserialize;

/// Action id the integration manager assigns to adapter calls
const CALL_ON_INTEGRATION: u64 = 0;

/// User request to swap vault holdings through the adapter
#[derive(Debug, Clone, Deserialize)]
pub struct SwapRequest {
    /// Swap route, outgoing asset first, incoming asset last
    pub path: Vec<String>,
    /// Decimal amount of the outgoing asset to spend
    pub amount: String,
    /// Minimum incoming amount as a decimal; defaults to one base unit
    #[serde(default)]
    pub min_incoming: Option<String>,
}

impl FundOrchestrator {
    /// Swap vault holdings of the fund behind `comptroller` along `path`.
    pub async fn swap(
        &self,
        comptroller: &str,
        request: &SwapRequest,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<TransactionOutcome> {
        let comptroller = units::parse_address(comptroller, "comptroller")?;

        if request.path.len() < 2 {
            return Err(OrchestratorError::InvalidInput(
                "swap path needs an outgoing and an incoming asset".to_string(),
            ));
        }
        let mut path = Vec::with_capacity(request.path.len());
        for raw in &request.path {
            path.push(units::parse_address(raw, "swap path entry")?);
        }

        let outgoing_decimals = self
            .reader
            .read_decimals(path[0])
            .await
            .unwrap_or(18);
        let outgoing = units::parse_amount(&request.amount, outgoing_decimals)?;

        let min_incoming = match request.min_incoming.as_deref() {
            Some(raw) => {
                let incoming_decimals = self
                    .reader
                    .read_decimals(path[path.len() - 1])
                    .await
                    .unwrap_or(18);
                units::parse_amount(raw, incoming_decimals)?
            }
            None => U256::one(),
        };

        let order = abi::encode_swap_order(&path, outgoing, min_incoming);
        let call_args = abi::encode_extension_call_args(
            self.protocol.swap_adapter,
            abi::take_order_selector(),
            &order,
        );
        let data = abi::encode_call(
            &COMPTROLLER,
            "callOnExtension",
            (
                self.protocol.integration_manager,
                U256::from(CALL_ON_INTEGRATION),
                call_args,
            ),
        )?;
        let intent = TransactionIntent::new(comptroller, data);

        reporter.info(format!(
            "swapping {} unit(s) along a {}-hop route",
            outgoing,
            path.len() - 1
        ));
        self.wallet.call(&intent).await?;
        let outcome = submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "swap").await?;
        reporter.success("swap confirmed");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fund::test_support::{orchestrator_config, protocol_addresses};
    use crate::status::MemorySink;
    use crate::wallet::MockWalletGateway;
    use ethers::abi::Token;
    use ethers::types::{Bytes, H256};
    use std::sync::Arc;

    const COMPTROLLER_ADDR: &str = "0x9D2C19a267caDA33da70d74aaBF9d2f75D3CdC14";
    const OUT_ASSET: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";
    const IN_ASSET: &str = "0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14";

    fn orchestrator(wallet: MockWalletGateway) -> FundOrchestrator {
        FundOrchestrator::new(
            Arc::new(wallet),
            protocol_addresses(),
            &orchestrator_config(),
            18,
        )
    }

    fn reporter() -> StatusReporter {
        StatusReporter::new("swap", Arc::new(MemorySink::new()))
    }

    #[tokio::test]
    async fn short_path_is_rejected_without_rpc() {
        let wallet = MockWalletGateway::new();
        let request = SwapRequest {
            path: vec![OUT_ASSET.to_string()],
            amount: "1".to_string(),
            min_incoming: None,
        };

        let err = orchestrator(wallet)
            .swap(COMPTROLLER_ADDR, &request, &reporter())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn swap_routes_through_the_integration_manager() {
        let mut wallet = MockWalletGateway::new();

        // decimals read for the outgoing asset, then the simulation
        wallet.expect_call().times(2).returning(|intent| {
            let decimals_sel =
                &abi::encode_call(&crate::abi::ERC20, "decimals", ()).unwrap()[..4];
            if &intent.data[..4] == decimals_sel {
                Ok(ethers::abi::encode(&[Token::Uint(6u8.into())]).into())
            } else {
                Ok(Bytes::default())
            }
        });
        wallet.expect_send().times(1).returning(|intent| {
            let path = vec![
                OUT_ASSET.parse::<Address>().unwrap(),
                IN_ASSET.parse::<Address>().unwrap(),
            ];
            let order = abi::encode_swap_order(&path, U256::from(2_000_000u64), U256::one());
            let call_args = abi::encode_extension_call_args(
                protocol_addresses().swap_adapter,
                abi::take_order_selector(),
                &order,
            );
            let expected = abi::encode_call(
                &COMPTROLLER,
                "callOnExtension",
                (
                    protocol_addresses().integration_manager,
                    U256::zero(),
                    call_args,
                ),
            )
            .unwrap();
            assert_eq!(intent.data, expected);
            Ok(H256::from_low_u64_be(8))
        });
        wallet.expect_await_outcome().returning(|_| {
            Ok(crate::wallet::TransactionOutcome {
                tx_hash: H256::from_low_u64_be(8),
                block_number: 70,
                success: true,
                logs: vec![],
            })
        });

        let request = SwapRequest {
            path: vec![OUT_ASSET.to_string(), IN_ASSET.to_string()],
            amount: "2".to_string(),
            min_incoming: None,
        };
        orchestrator(wallet)
            .swap(COMPTROLLER_ADDR, &request, &reporter())
            .await
            .unwrap();
    }
}
