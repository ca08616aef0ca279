//! Share redemption
//!
//! Shares are redeemed either in kind (a proportional slice of every vault
//! holding) or against an explicit list of payout assets with weights.
//! Weights accept fractions, percentages or raw basis points and are
//! normalized to sum to exactly 10000 before encoding.

use super::{FundOrchestrator, SHARE_DECIMALS};
use crate::abi::{self, COMPTROLLER};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::status::StatusReporter;
use crate::units;
use crate::wallet::{submit_and_confirm, TransactionIntent, TransactionOutcome};

use ethers::types::{Address, U256};
use serde::Deserialize;

/// User request to redeem shares
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemRequest {
    /// Decimal share quantity to redeem
    pub shares: String,
    /// Payout assets; empty means redeem in kind
    #[serde(default)]
    pub payout_assets: Vec<String>,
    /// One weight per payout asset (fractions, percentages or basis points)
    #[serde(default)]
    pub payout_weights: Vec<String>,
}

impl FundOrchestrator {
    /// Redeem shares of the fund behind `comptroller`, paying out to
    /// `recipient`.
    pub async fn redeem(
        &self,
        comptroller: &str,
        recipient: Address,
        request: &RedeemRequest,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<TransactionOutcome> {
        let comptroller = units::parse_address(comptroller, "comptroller")?;
        let shares = units::parse_amount(&request.shares, SHARE_DECIMALS)?;

        let intent = if request.payout_assets.is_empty() {
            reporter.info("redeeming in kind");
            let data = abi::encode_call(
                &COMPTROLLER,
                "redeemSharesInKind",
                (
                    recipient,
                    shares,
                    Vec::<Address>::new(),
                    Vec::<Address>::new(),
                ),
            )?;
            TransactionIntent::new(comptroller, data)
        } else {
            if request.payout_assets.len() != request.payout_weights.len() {
                return Err(OrchestratorError::InvalidInput(format!(
                    "{} payout assets but {} weights",
                    request.payout_assets.len(),
                    request.payout_weights.len()
                )));
            }

            let mut assets = Vec::with_capacity(request.payout_assets.len());
            for raw in &request.payout_assets {
                assets.push(units::parse_address(raw, "payout asset")?);
            }
            let weights: Vec<U256> =
                units::normalize_weights(&request.payout_weights, self.weight_rounding)?
                    .into_iter()
                    .map(U256::from)
                    .collect();

            reporter.info(format!(
                "redeeming against {} specific asset(s)",
                assets.len()
            ));
            let data = abi::encode_call(
                &COMPTROLLER,
                "redeemSharesForSpecificAssets",
                (recipient, shares, assets, weights),
            )?;
            TransactionIntent::new(comptroller, data)
        };

        self.wallet.call(&intent).await?;
        let outcome = submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "redeem").await?;
        reporter.success("redemption confirmed");
        Ok(outcome)
    }
}
