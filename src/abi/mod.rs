//! ABI fragments and encoding helpers for the external protocol
//!
//! Only the minimal human-readable fragments each action needs are declared,
//! matching the shapes of the deployed asset-management protocol: the fund
//! deployer, comptroller (pool controller), vault, ERC-20 assets, the
//! address-list registry and the swap adapter entry point.

use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::abi::{parse_abi, Detokenize, RawLog, Token, Tokenize};
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, Log, Selector, U256};
use lazy_static::lazy_static;

lazy_static! {
    /// Minimal ERC-20 surface
    pub static ref ERC20: BaseContract = BaseContract::from(
        parse_abi(&[
            "function balanceOf(address) view returns (uint256)",
            "function allowance(address,address) view returns (uint256)",
            "function approve(address,uint256) returns (bool)",
            "function transfer(address,uint256) returns (bool)",
            "function symbol() view returns (string)",
            "function decimals() view returns (uint8)",
        ])
        .unwrap()
    );

    /// Pool controller (comptroller) surface
    pub static ref COMPTROLLER: BaseContract = BaseContract::from(
        parse_abi(&[
            "function getDenominationAsset() view returns (address)",
            "function getVaultProxy() view returns (address)",
            "function calcGav() view returns (uint256)",
            "function calcGrossShareValue() view returns (uint256)",
            "function buyShares(uint256 _investmentAmount, uint256 _minSharesQuantity)",
            "function buySharesWithEth(uint256 _minSharesQuantity) payable",
            "function redeemSharesInKind(address _recipient, uint256 _sharesQuantity, address[] _additionalAssets, address[] _assetsToSkip)",
            "function redeemSharesForSpecificAssets(address _recipient, uint256 _sharesQuantity, address[] _payoutAssets, uint256[] _payoutAssetPercentages)",
            "function callOnExtension(address _extension, uint256 _actionId, bytes _callArgs)",
        ])
        .unwrap()
    );

    /// Fund deployer (factory) surface
    pub static ref FUND_DEPLOYER: BaseContract = BaseContract::from(
        parse_abi(&[
            "function createNewFund(address _fundOwner, string _fundName, string _fundSymbol, address _denominationAsset, uint256 _sharesActionTimelock, bytes _feeManagerConfigData, bytes _policyManagerConfigData) returns (address comptrollerProxy, address vaultProxy)",
            "event NewFundCreated(address indexed creator, address indexed fundOwner, address comptrollerProxy, address vaultProxy, string fundName, string fundSymbol)",
        ])
        .unwrap()
    );

    /// Address-list registry surface (investor whitelists)
    pub static ref ADDRESS_LIST_REGISTRY: BaseContract = BaseContract::from(
        parse_abi(&[
            "function createList(address owner, uint8 updateType, address[] initialItems) returns (uint256 listId)",
            "event ListCreated(uint256 indexed listId, address indexed owner, uint8 updateType, address[] initialItems)",
        ])
        .unwrap()
    );
}

/// Selector of the adapter's order entry point, `takeOrder(address,bytes,bytes)`
pub fn take_order_selector() -> Selector {
    ethers::utils::id("takeOrder(address,bytes,bytes)")
}

/// Encode a call against one of the static fragments
pub fn encode_call<T: Tokenize>(
    contract: &BaseContract,
    name: &str,
    args: T,
) -> OrchestratorResult<Bytes> {
    contract
        .encode(name, args)
        .map_err(|e| OrchestratorError::Internal(format!("abi encode {name}: {e}")))
}

/// Decode the return value of a read or simulated call
pub fn decode_output<D: Detokenize>(
    contract: &BaseContract,
    name: &str,
    data: &Bytes,
) -> OrchestratorResult<D> {
    contract
        .decode_output(name, data)
        .map_err(|e| OrchestratorError::ParseFailure(format!("decode {name} output: {e}")))
}

/// Encode the `(address[], bytes[])` pair shape used by fee and policy
/// manager configuration payloads
pub fn encode_address_bytes_pairs(addresses: &[Address], payloads: &[Bytes]) -> Bytes {
    let addr_tokens = addresses.iter().map(|a| Token::Address(*a)).collect();
    let data_tokens = payloads
        .iter()
        .map(|b| Token::Bytes(b.to_vec()))
        .collect();

    ethers::abi::encode(&[Token::Array(addr_tokens), Token::Array(data_tokens)]).into()
}

/// Empty fee/policy configuration: no managers attached
pub fn empty_config() -> Bytes {
    encode_address_bytes_pairs(&[], &[])
}

/// Entrance-rate fee settings: `(rate_bps, recipient)`
pub fn encode_entrance_fee_settings(rate_bps: u64, recipient: Address) -> Bytes {
    ethers::abi::encode(&[Token::Uint(U256::from(rate_bps)), Token::Address(recipient)]).into()
}

/// Allowed-deposit-recipients policy settings: `(uint256[] list_ids, bytes[] new_lists)`
pub fn encode_deposit_policy_settings(list_ids: &[U256]) -> Bytes {
    let ids = list_ids.iter().map(|id| Token::Uint(*id)).collect();
    ethers::abi::encode(&[Token::Array(ids), Token::Array(vec![])]).into()
}

/// Adapter order payload: `(address[] path, uint256 outgoing, uint256 min_incoming)`
pub fn encode_swap_order(path: &[Address], outgoing: U256, min_incoming: U256) -> Bytes {
    let path_tokens = path.iter().map(|a| Token::Address(*a)).collect();
    ethers::abi::encode(&[
        Token::Array(path_tokens),
        Token::Uint(outgoing),
        Token::Uint(min_incoming),
    ])
    .into()
}

/// Wrap an adapter order for the generic extension-call entry point:
/// `(address adapter, bytes4 selector, bytes order_data)`
pub fn encode_extension_call_args(adapter: Address, selector: Selector, order: &Bytes) -> Bytes {
    ethers::abi::encode(&[
        Token::Address(adapter),
        Token::FixedBytes(selector.to_vec()),
        Token::Bytes(order.to_vec()),
    ])
    .into()
}

/// Extract the list id from a `ListCreated` event emitted by the registry
pub fn parse_list_created(logs: &[Log], registry: Address) -> Option<U256> {
    let event = ADDRESS_LIST_REGISTRY.abi().event("ListCreated").ok()?;
    logs.iter()
        .filter(|log| log.address == registry)
        .find_map(|log| {
            let parsed = event.parse_log(RawLog::from(log.clone())).ok()?;
            parsed
                .params
                .into_iter()
                .find(|p| p.name == "listId")
                .and_then(|p| p.value.into_uint())
        })
}

/// Extract `(comptroller, vault)` from a `NewFundCreated` event
pub fn parse_new_fund_created(logs: &[Log], deployer: Address) -> Option<(Address, Address)> {
    let event = FUND_DEPLOYER.abi().event("NewFundCreated").ok()?;
    logs.iter()
        .filter(|log| log.address == deployer)
        .find_map(|log| {
            let parsed = event.parse_log(RawLog::from(log.clone())).ok()?;
            let mut comptroller = None;
            let mut vault = None;
            for param in parsed.params {
                match param.name.as_str() {
                    "comptrollerProxy" => comptroller = param.value.into_address(),
                    "vaultProxy" => vault = param.value.into_address(),
                    _ => {}
                }
            }
            Some((comptroller?, vault?))
        })
}
