//! Configuration management for the fund orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.
//! The loaded value is immutable and injected into every component at
//! construction; nothing reads ambient configuration after startup.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wallet::NetworkDescriptor;

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub orchestrator: OrchestratorConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// How long to wait for a transaction receipt before giving up
    pub receipt_timeout_secs: u64,
    /// Poll interval while waiting for a receipt
    pub receipt_poll_ms: u64,
    /// Slippage buffer applied to estimated share quantities, in basis points
    pub slippage_bps: u64,
    /// Entrance fee rate attached to newly created funds, in basis points
    pub entrance_fee_bps: u64,
    /// Where rounding remainders go when normalizing payout weights
    #[serde(default)]
    pub weight_rounding: RoundingPolicy,
    pub health_check_interval_secs: u64,
}

/// Rounding remainder policy for basis-point weight normalization.
///
/// The external protocol's own rounding is not authoritative here, so the
/// choice is configurable rather than baked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingPolicy {
    /// Absorb the remainder into the last weight
    #[default]
    AbsorbLast,
    /// Absorb the remainder into the largest weight
    AbsorbLargest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// The single network this orchestrator instance requires
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub native_symbol: String,
    pub native_decimals: u8,
    pub explorer_url: String,
}

impl NetworkConfig {
    /// Descriptor handed to the wallet when the chain must be registered
    pub fn descriptor(&self) -> NetworkDescriptor {
        NetworkDescriptor {
            chain_id: self.chain_id,
            name: self.name.clone(),
            native_symbol: self.native_symbol.clone(),
            native_decimals: self.native_decimals,
            rpc_urls: self.rpc_urls.clone(),
            explorer_url: self.explorer_url.clone(),
        }
    }
}

/// Fixed addresses of the external asset-management protocol deployment
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub fund_deployer: String,
    pub address_list_registry: String,
    pub allowed_deposit_recipients_policy: String,
    pub entrance_rate_direct_fee: String,
    /// Preferred denomination asset (the wrapped native token)
    pub wrapped_native: String,
    /// Fallback denomination asset for the last deployment attempt
    pub fallback_denomination: String,
    pub integration_manager: String,
    pub swap_adapter: String,
}

impl ProtocolConfig {
    /// Parse and validate every configured address
    pub fn addresses(&self) -> OrchestratorResult<ProtocolAddresses> {
        Ok(ProtocolAddresses {
            fund_deployer: parse_named(&self.fund_deployer, "fund_deployer")?,
            address_list_registry: parse_named(
                &self.address_list_registry,
                "address_list_registry",
            )?,
            allowed_deposit_recipients_policy: parse_named(
                &self.allowed_deposit_recipients_policy,
                "allowed_deposit_recipients_policy",
            )?,
            entrance_rate_direct_fee: parse_named(
                &self.entrance_rate_direct_fee,
                "entrance_rate_direct_fee",
            )?,
            wrapped_native: parse_named(&self.wrapped_native, "wrapped_native")?,
            fallback_denomination: parse_named(
                &self.fallback_denomination,
                "fallback_denomination",
            )?,
            integration_manager: parse_named(&self.integration_manager, "integration_manager")?,
            swap_adapter: parse_named(&self.swap_adapter, "swap_adapter")?,
        })
    }
}

/// Parsed protocol addresses, validated once at startup
#[derive(Debug, Clone, Copy)]
pub struct ProtocolAddresses {
    pub fund_deployer: Address,
    pub address_list_registry: Address,
    pub allowed_deposit_recipients_policy: Address,
    pub entrance_rate_direct_fee: Address,
    pub wrapped_native: Address,
    pub fallback_denomination: Address,
    pub integration_manager: Address,
    pub swap_adapter: Address,
}

fn parse_named(value: &str, name: &str) -> OrchestratorResult<Address> {
    Address::from_str(value).map_err(|_| {
        OrchestratorError::Config(format!("protocol.{name} is not a valid address: {value}"))
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub keystore_path: Option<String>,
    pub private_key_env: Option<String>,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("ORCHESTRATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.is_empty() {
            anyhow::bail!("network has no RPC URLs configured");
        }

        // Every protocol address must be well-formed before any action runs
        self.protocol.addresses()?;

        if self.orchestrator.slippage_bps >= 10_000 {
            anyhow::bail!("orchestrator.slippage_bps must be below 10000");
        }
        if self.orchestrator.entrance_fee_bps >= 10_000 {
            anyhow::bail!("orchestrator.entrance_fee_bps must be below 10000");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
