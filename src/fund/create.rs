//! Fund creation with the denomination fallback chain
//!
//! Deployment is attempted up to three times: first with the preferred
//! denomination asset plus an entrance fee and an investor whitelist policy,
//! then with the preferred denomination and no extras, and finally with the
//! fallback denomination. Each attempt is simulated before submission so a
//! doomed configuration never costs gas.

use super::FundOrchestrator;
use crate::abi::{self, FUND_DEPLOYER, ADDRESS_LIST_REGISTRY};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::status::StatusReporter;
use crate::units;
use crate::wallet::{submit_and_confirm, TransactionIntent};

use ethers::types::{Address, Bytes, U256};
use serde::Deserialize;
use tracing::{debug, warn};

/// User request to create a new fund
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFundRequest {
    pub name: String,
    pub symbol: String,
    /// Entrance fee recipient; defaults to the fund owner
    #[serde(default)]
    pub fee_recipient: Option<String>,
    /// Investors to allow via a freshly created address list
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Reuse an already-registered address list instead of creating one
    #[serde(default)]
    pub existing_list_id: Option<u64>,
    /// Timelock between subscription and redemption, in seconds
    #[serde(default)]
    pub shares_action_timelock_secs: u64,
}

/// A successfully deployed fund
#[derive(Debug, Clone, serde::Serialize)]
pub struct CreatedFund {
    pub comptroller: Address,
    pub vault: Address,
    pub denomination_asset: Address,
    /// Whether the entrance fee configuration made it into the deployment
    pub with_fee: bool,
    /// Whether the deposit whitelist policy made it into the deployment
    pub with_policy: bool,
}

/// One deployment attempt in the fallback chain
struct DeploymentPlan {
    label: &'static str,
    denomination: Address,
    fee_config: Bytes,
    policy_config: Bytes,
    with_fee: bool,
    with_policy: bool,
}

impl FundOrchestrator {
    /// Create a new fund, falling back through simpler configurations when
    /// the richer ones are rejected.
    pub async fn create_fund(
        &self,
        owner: Address,
        request: &CreateFundRequest,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<CreatedFund> {
        let name = request.name.trim();
        let symbol = request.symbol.trim();
        if name.is_empty() || symbol.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "fund name and symbol are required".to_string(),
            ));
        }

        let fee_recipient = match request.fee_recipient.as_deref() {
            Some(raw) => units::parse_address(raw, "fee recipient")?,
            None => owner,
        };

        let list_id = self.resolve_list_id(owner, request, reporter).await?;

        let fee_config = abi::encode_address_bytes_pairs(
            &[self.protocol.entrance_rate_direct_fee],
            &[abi::encode_entrance_fee_settings(
                self.entrance_fee_bps,
                fee_recipient,
            )],
        );
        let policy_config = match list_id {
            Some(id) => abi::encode_address_bytes_pairs(
                &[self.protocol.allowed_deposit_recipients_policy],
                &[abi::encode_deposit_policy_settings(&[id])],
            ),
            None => abi::empty_config(),
        };

        let plans = [
            DeploymentPlan {
                label: "preferred denomination with fee and policy",
                denomination: self.protocol.wrapped_native,
                fee_config,
                policy_config,
                with_fee: true,
                with_policy: list_id.is_some(),
            },
            DeploymentPlan {
                label: "preferred denomination, plain",
                denomination: self.protocol.wrapped_native,
                fee_config: abi::empty_config(),
                policy_config: abi::empty_config(),
                with_fee: false,
                with_policy: false,
            },
            DeploymentPlan {
                label: "fallback denomination, plain",
                denomination: self.protocol.fallback_denomination,
                fee_config: abi::empty_config(),
                policy_config: abi::empty_config(),
                with_fee: false,
                with_policy: false,
            },
        ];

        let mut rejections: Vec<String> = Vec::new();

        for plan in plans {
            reporter.info(format!("deploying fund: {}", plan.label));

            match self.attempt_deployment(owner, name, symbol, request, &plan, reporter).await {
                Ok(fund) => {
                    if !rejections.is_empty() {
                        reporter.partial_success(format!(
                            "deployed via {} after {} rejected attempt(s)",
                            plan.label,
                            rejections.len()
                        ));
                    }
                    reporter.success(format!(
                        "fund deployed: comptroller {:?}, vault {:?}",
                        fund.comptroller, fund.vault
                    ));
                    return Ok(fund);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Deployment attempt rejected ({}): {}", plan.label, e);
                    rejections.push(
                        e.reason().map(str::to_string).unwrap_or_else(|| e.to_string()),
                    );
                }
            }
        }

        let reason = rejections
            .iter()
            .find(|r| !r.is_empty())
            .cloned()
            .unwrap_or_else(|| "all deployment attempts rejected".to_string());
        Err(OrchestratorError::RemoteRejected(reason))
    }

    /// Simulate one deployment plan, then submit it
    async fn attempt_deployment(
        &self,
        owner: Address,
        name: &str,
        symbol: &str,
        request: &CreateFundRequest,
        plan: &DeploymentPlan,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<CreatedFund> {
        let data = abi::encode_call(
            &FUND_DEPLOYER,
            "createNewFund",
            (
                owner,
                name.to_string(),
                symbol.to_string(),
                plan.denomination,
                U256::from(request.shares_action_timelock_secs),
                plan.fee_config.clone(),
                plan.policy_config.clone(),
            ),
        )?;
        let intent = TransactionIntent::new(self.protocol.fund_deployer, data);

        // Simulation failures count as a rejected attempt
        let returned = self.wallet.call(&intent).await?;
        let predicted: (Address, Address) =
            abi::decode_output(&FUND_DEPLOYER, "createNewFund", &returned)?;
        debug!(
            "Deployment simulation predicts comptroller {:?}, vault {:?}",
            predicted.0, predicted.1
        );

        let outcome = submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "create-fund").await?;

        // Prefer the on-chain event; the simulated prediction covers deployers
        // whose logs we fail to match.
        let (comptroller, vault) =
            abi::parse_new_fund_created(&outcome.logs, self.protocol.fund_deployer)
                .unwrap_or(predicted);

        Ok(CreatedFund {
            comptroller,
            vault,
            denomination_asset: plan.denomination,
            with_fee: plan.with_fee,
            with_policy: plan.with_policy,
        })
    }

    /// Resolve the investor whitelist to a registry list id.
    ///
    /// Prefers an explicitly supplied id; otherwise registers the given
    /// addresses as a new list. A list that cannot be created or located in
    /// the logs downgrades the deployment to run without the deposit policy.
    async fn resolve_list_id(
        &self,
        owner: Address,
        request: &CreateFundRequest,
        reporter: &StatusReporter,
    ) -> OrchestratorResult<Option<U256>> {
        if let Some(id) = request.existing_list_id {
            return Ok(Some(U256::from(id)));
        }
        if request.whitelist.is_empty() {
            return Ok(None);
        }

        let mut members = Vec::with_capacity(request.whitelist.len());
        for raw in &request.whitelist {
            members.push(units::parse_address(raw, "whitelist member")?);
        }

        let data = abi::encode_call(
            &ADDRESS_LIST_REGISTRY,
            "createList",
            (owner, 0u8, members),
        )?;
        let intent = TransactionIntent::new(self.protocol.address_list_registry, data);

        let outcome =
            match submit_and_confirm(self.wallet.as_ref(), &intent, reporter, "create-list").await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    reporter.partial_success(format!(
                        "investor list creation rejected ({e}); continuing without deposit policy"
                    ));
                    return Ok(None);
                }
            };

        match abi::parse_list_created(&outcome.logs, self.protocol.address_list_registry) {
            Some(id) => {
                reporter.info(format!("investor list registered with id {id}"));
                Ok(Some(id))
            }
            None => {
                reporter.partial_success(
                    "investor list id not found in logs; continuing without deposit policy",
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fund::test_support::{orchestrator_config, protocol_addresses};
    use crate::status::{MemorySink, Stage};
    use crate::wallet::{MockWalletGateway, TransactionOutcome};
    use ethers::abi::Token;
    use ethers::types::H256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn owner() -> Address {
        Address::from([0xaa; 20])
    }

    fn request() -> CreateFundRequest {
        CreateFundRequest {
            name: "Alpha Fund".to_string(),
            symbol: "ALPHA".to_string(),
            fee_recipient: None,
            whitelist: vec![],
            existing_list_id: None,
            shares_action_timelock_secs: 0,
        }
    }

    fn deployed_pair() -> Bytes {
        ethers::abi::encode(&[
            Token::Address(Address::from([0x77; 20])),
            Token::Address(Address::from([0x78; 20])),
        ])
        .into()
    }

    fn mined() -> TransactionOutcome {
        TransactionOutcome {
            tx_hash: H256::from_low_u64_be(1),
            block_number: 100,
            success: true,
            logs: vec![],
        }
    }

    #[tokio::test]
    async fn empty_name_is_rejected_without_rpc() {
        let wallet = MockWalletGateway::new();
        let orchestrator = FundOrchestrator::new(
            Arc::new(wallet),
            protocol_addresses(),
            &orchestrator_config(),
            18,
        );
        let sink = Arc::new(MemorySink::new());
        let reporter = StatusReporter::new("create-fund", sink);

        let mut req = request();
        req.name = "  ".to_string();
        let err = orchestrator
            .create_fund(owner(), &req, &reporter)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn falls_back_to_second_plan_when_first_simulation_rejects() {
        let mut wallet = MockWalletGateway::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let call_counter = calls.clone();
        wallet.expect_call().times(2).returning(move |_| {
            if call_counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(OrchestratorError::RemoteRejected(
                    "denomination not allowed".to_string(),
                ))
            } else {
                Ok(deployed_pair())
            }
        });
        // Only the surviving plan is ever submitted
        wallet
            .expect_send()
            .times(1)
            .returning(|_| Ok(H256::from_low_u64_be(1)));
        wallet.expect_await_outcome().returning(|_| Ok(mined()));

        let orchestrator = FundOrchestrator::new(
            Arc::new(wallet),
            protocol_addresses(),
            &orchestrator_config(),
            18,
        );
        let sink = Arc::new(MemorySink::new());
        let reporter = StatusReporter::new("create-fund", sink.clone());

        let fund = orchestrator
            .create_fund(owner(), &request(), &reporter)
            .await
            .unwrap();

        assert_eq!(fund.comptroller, Address::from([0x77; 20]));
        assert_eq!(fund.vault, Address::from([0x78; 20]));
        assert_eq!(fund.denomination_asset, protocol_addresses().wrapped_native);
        assert!(!fund.with_fee);

        let stages: Vec<Stage> = sink.snapshot().iter().map(|r| r.stage).collect();
        assert!(stages.contains(&Stage::PartialSuccess));
        assert!(stages.contains(&Stage::Success));
    }

    #[tokio::test]
    async fn surfaces_first_reason_when_all_plans_reject() {
        let mut wallet = MockWalletGateway::new();
        wallet.expect_call().times(3).returning(|_| {
            Err(OrchestratorError::RemoteRejected(
                "deployer paused".to_string(),
            ))
        });
        wallet.expect_send().times(0);

        let orchestrator = FundOrchestrator::new(
            Arc::new(wallet),
            protocol_addresses(),
            &orchestrator_config(),
            18,
        );
        let sink = Arc::new(MemorySink::new());
        let reporter = StatusReporter::new("create-fund", sink);

        let err = orchestrator
            .create_fund(owner(), &request(), &reporter)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some("deployer paused"));
    }

    #[tokio::test]
    async fn whitelist_event_miss_downgrades_to_no_policy() {
        let mut wallet = MockWalletGateway::new();

        // createList submission mines but emits nothing we can match
        wallet
            .expect_send()
            .times(2)
            .returning(|_| Ok(H256::from_low_u64_be(2)));
        wallet.expect_await_outcome().returning(|_| Ok(mined()));
        wallet
            .expect_call()
            .times(1)
            .returning(|_| Ok(deployed_pair()));

        let orchestrator = FundOrchestrator::new(
            Arc::new(wallet),
            protocol_addresses(),
            &orchestrator_config(),
            18,
        );
        let sink = Arc::new(MemorySink::new());
        let reporter = StatusReporter::new("create-fund", sink.clone());

        let mut req = request();
        req.whitelist = vec!["0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14".to_string()];

        let fund = orchestrator
            .create_fund(owner(), &req, &reporter)
            .await
            .unwrap();
        assert!(!fund.with_policy);
        assert!(fund.with_fee);

        let stages: Vec<Stage> = sink.snapshot().iter().map(|r| r.stage).collect();
        assert!(stages.contains(&Stage::PartialSuccess));
    }
}
