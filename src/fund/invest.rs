//! Share subscription
//!
//! Subscribes to a fund in its denomination asset. ERC-20 denominations get
//! an allowance check first, approving only when the existing allowance falls
//! short; tokens that reject a direct re-approval are reset to zero and
//! approved again. The minimum acceptable share quantity is either supplied
//! by the user or estimated from the current share value with a slippage
//! buffer.

use super::{FundOrchestrator, SHARE_DECIMALS};
use crate::abi::{self, COMPTROLLER, ERC20};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::status::StatusReporter;
use crate::units;
use crate::wallet::{submit_and_confirm, TransactionIntent, TransactionOutcome};

use ethers::types::{Address, U256};
use serde::Deserialize;
use tracing::debug;

/// User request to subscribe for shares
#[derive(Debug, Clone, Deserialize)]
pub struct InvestRequest {
    /// Decimal amount in the denomination asset
    pub amount: String,
    /// Override the denomination asset instead of reading it from the fund
    #[serde(default)]
    pub denomination: Option<String>,
    /// Minimum acceptable share quantity as a decimal; estimated when absent
    #[serde(default)]
    pub min_shares: Option<String>,
}

impl FundOrchestrator {
    /// Subscribe for shares of the fund behind `comptroller`.
    pub async fn invest(
        &self,
        comptroller: &str,
        investor: Address,
        request: &InvestRequest,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<TransactionOutcome> {
        let comptroller = units::parse_address(comptroller, "comptroller")?;

        let denomination = match request.denomination.as_deref() {
            Some(raw) => units::parse_address(raw, "denomination")?,
            None => {
                self.read(comptroller, &COMPTROLLER, "getDenominationAsset", ())
                    .await?
            }
        };

        if denomination == self.protocol.wrapped_native {
            return self
                .invest_native(comptroller, request, reporter)
                .await;
        }

        let decimals = self.reader.read_decimals(denomination).await.unwrap_or(18);
        let amount = units::parse_amount(&request.amount, decimals)?;

        self.ensure_allowance(denomination, investor, comptroller, amount, reporter)
            .await?;

        let min_shares = self
            .resolve_min_shares(comptroller, amount, request.min_shares.as_deref())
            .await?;
        reporter.info(format!(
            "subscribing {} units for at least {} share units",
            amount, min_shares
        ));

        let data = abi::encode_call(&COMPTROLLER, "buyShares", (amount, min_shares))?;
        let intent = TransactionIntent::new(comptroller, data);

        self.wallet.call(&intent).await?;
        let outcome = submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "invest").await?;
        reporter.success("subscription confirmed");
        Ok(outcome)
    }

    /// Native-denomination path: value transfer through the payable entry
    async fn invest_native(
        &self,
        comptroller: Address,
        request: &InvestRequest,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<TransactionOutcome> {
        let amount = units::parse_amount(&request.amount, self.native_decimals)?;
        let min_shares = self
            .resolve_min_shares(comptroller, amount, request.min_shares.as_deref())
            .await?;

        let data = abi::encode_call(&COMPTROLLER, "buySharesWithEth", (min_shares,))?;
        let intent = TransactionIntent::new(comptroller, data).with_value(amount);

        self.wallet.call(&intent).await?;
        let outcome = submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "invest").await?;
        reporter.success("subscription confirmed");
        Ok(outcome)
    }

    /// Approve the comptroller to pull the investment amount, but only when
    /// the standing allowance is insufficient. Tokens that reject a direct
    /// re-approval get the zero-then-set sequence instead.
    async fn ensure_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<()> {
        let allowance: U256 = self
            .read(token, &ERC20, "allowance", (owner, spender))
            .await?;
        if allowance >= amount {
            debug!("Standing allowance {} covers {}", allowance, amount);
            return Ok(());
        }

        let approve = |value: U256| -> OrchestratorResult<TransactionIntent> {
            let data = abi::encode_call(&ERC20, "approve", (spender, value))?;
            Ok(TransactionIntent::new(token, data))
        };

        match submit_and_confirm(self.wallet.as_ref(), &approve(amount)?, reporter, "approve").await
        {
            Ok(_) => Ok(()),
            Err(OrchestratorError::RemoteRejected(reason)) => {
                reporter.info(format!(
                    "direct approval rejected ({reason}); resetting allowance to zero first"
                ));
                submit_and_confirm(
                    self.wallet.as_ref(),
                    &approve(U256::zero())?,
                    reporter,
                    "approve-reset",
                )
                .await?;
                submit_and_confirm(self.wallet.as_ref(), &approve(amount)?, reporter, "approve")
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the minimum share quantity for a subscription.
    ///
    /// A user-supplied minimum wins. Otherwise the estimate divides the
    /// investment by the current gross share value and discounts it by the
    /// configured slippage, clamped to one share unit so a zero minimum is
    /// never submitted.
    async fn resolve_min_shares(
        &self,
        comptroller: Address,
        amount: U256,
        user_min: Option<&str>,
    ) -> OrchestratorResult<U256> {
        if let Some(raw) = user_min {
            return units::parse_amount(raw, SHARE_DECIMALS);
        }

        let share_value: U256 = self
            .read(comptroller, &COMPTROLLER, "calcGrossShareValue", ())
            .await?;
        if share_value.is_zero() {
            return Ok(U256::one());
        }

        let unit = U256::exp10(SHARE_DECIMALS as usize);
        let estimated = amount * unit / share_value;
        let discounted =
            estimated * U256::from(units::BPS_DENOMINATOR - self.slippage_bps)
                / U256::from(units::BPS_DENOMINATOR);

        Ok(discounted.max(U256::one()))
    }
}
