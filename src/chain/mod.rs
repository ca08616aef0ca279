//! Chain module - JSON-RPC connectivity for the required network
//!
//! Provides a multi-RPC provider with automatic failover. Transport failures
//! rotate to the next endpoint; node-level rejections (reverts, bad params)
//! are surfaced immediately since every endpoint would answer the same.

pub mod provider;

pub use provider::ChainProvider;
