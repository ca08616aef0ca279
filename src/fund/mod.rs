//! Fund protocol orchestration
//!
//! Drives the external asset-management protocol: fund creation with the
//! denomination fallback chain, share subscription with allowance handling,
//! share redemption (in-kind or against specific assets) and adapter swaps
//! routed through the protocol's integration manager.

pub mod create;
pub mod invest;
pub mod redeem;
pub mod swap;

pub use create::{CreateFundRequest, CreatedFund};
pub use invest::InvestRequest;
pub use redeem::RedeemRequest;
pub use swap::SwapRequest;

use crate::config::{OrchestratorConfig, ProtocolAddresses, RoundingPolicy};
use crate::reader::BalanceReader;
use crate::wallet::WalletGateway;

use std::sync::Arc;

/// Shares carry a fixed 18-decimal precision regardless of denomination
pub(crate) const SHARE_DECIMALS: u8 = 18;

/// Orchestrates all protocol-facing actions against one deployment
pub struct FundOrchestrator {
    wallet: Arc<dyn WalletGateway>,
    reader: BalanceReader,
    protocol: ProtocolAddresses,
    slippage_bps: u64,
    entrance_fee_bps: u64,
    weight_rounding: RoundingPolicy,
    native_decimals: u8,
}

impl FundOrchestrator {
    pub fn new(
        wallet: Arc<dyn WalletGateway>,
        protocol: ProtocolAddresses,
        config: &OrchestratorConfig,
        native_decimals: u8,
    ) -> Self {
        let reader = BalanceReader::new(wallet.clone());
        Self {
            wallet,
            reader,
            protocol,
            slippage_bps: config.slippage_bps,
            entrance_fee_bps: config.entrance_fee_bps,
            weight_rounding: config.weight_rounding,
            native_decimals,
        }
    }

    /// Read-only call against a protocol contract
    pub(crate) async fn read<D: ethers::abi::Detokenize>(
        &self,
        to: ethers::types::Address,
        contract: &ethers::contract::BaseContract,
        name: &str,
        args: impl ethers::abi::Tokenize + Send,
    ) -> crate::error::OrchestratorResult<D> {
        let data = crate::abi::encode_call(contract, name, args)?;
        let returned = self
            .wallet
            .call(&crate::wallet::TransactionIntent::new(to, data))
            .await?;
        crate::abi::decode_output(contract, name, &returned)
    }
}
