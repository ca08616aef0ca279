//! Input validation and numeric conversion helpers
//!
//! All user-facing inputs (addresses, decimal amounts, payout weights) are
//! validated here before any remote call is assembled.

use crate::config::RoundingPolicy;
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::{Address, U256};
use ethers::utils::{format_units, parse_units, ParseUnits};
use std::str::FromStr;

/// Basis points in one whole
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Relative tolerance when matching a weight sum against a known base
const BASE_TOLERANCE: f64 = 1e-6;

/// Parse a hex address, mapping failures to `InvalidInput`
pub fn parse_address(value: &str, what: &str) -> OrchestratorResult<Address> {
    Address::from_str(value.trim())
        .map_err(|_| OrchestratorError::InvalidInput(format!("{what} is not a valid address")))
}

/// Whether a string is a syntactically valid hex address
pub fn is_hex_address(value: &str) -> bool {
    Address::from_str(value.trim()).is_ok()
}

/// Convert a decimal amount string into base units at the given precision.
///
/// Rejects non-positive and malformed amounts before any remote call.
pub fn parse_amount(amount: &str, decimals: u8) -> OrchestratorResult<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "amount must not be empty".to_string(),
        ));
    }

    // parse_units accepts signed decimals; anything negative is invalid here
    let value = match parse_units(trimmed, decimals as u32) {
        Ok(ParseUnits::U256(value)) => value,
        Ok(ParseUnits::I256(_)) => {
            return Err(OrchestratorError::InvalidInput(
                "amount must be positive".to_string(),
            ))
        }
        Err(e) => {
            return Err(OrchestratorError::InvalidInput(format!(
                "malformed amount: {e}"
            )))
        }
    };

    if value.is_zero() {
        return Err(OrchestratorError::InvalidInput(
            "amount must be positive".to_string(),
        ));
    }

    Ok(value)
}

/// Format base units back into a decimal string at the given precision
pub fn format_amount(value: U256, decimals: u8) -> String {
    format_units(value, decimals as u32).unwrap_or_else(|_| value.to_string())
}

/// Normalize payout weights into basis points summing to exactly 10000.
///
/// Accepts three bases: fractions (sum ~ 1.0), human percentages
/// (sum ~ 100), or raw basis points (all values integral, taken literally,
/// sum must be exactly 10000). For the scaled bases the rounding remainder
/// is absorbed per `policy`.
pub fn normalize_weights(
    weights: &[String],
    policy: RoundingPolicy,
) -> OrchestratorResult<Vec<u64>> {
    if weights.is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "at least one payout weight is required".to_string(),
        ));
    }

    let mut parsed = Vec::with_capacity(weights.len());
    for raw in weights {
        let value = f64::from_str(raw.trim()).map_err(|_| {
            OrchestratorError::InvalidInput(format!("malformed weight: {}", raw.trim()))
        })?;
        if !value.is_finite() || value < 0.0 {
            return Err(OrchestratorError::InvalidInput(format!(
                "weight must be a non-negative number: {}",
                raw.trim()
            )));
        }
        parsed.push(value);
    }

    let sum: f64 = parsed.iter().sum();

    if near(sum, 1.0) {
        scale_to_bps(&parsed, 1.0, policy)
    } else if near(sum, 100.0) {
        scale_to_bps(&parsed, 100.0, policy)
    } else if parsed.iter().all(|v| v.fract() == 0.0) {
        literal_bps(&parsed)
    } else {
        Err(OrchestratorError::InvalidInput(format!(
            "weights sum to {sum}, expected 1, 100 or 10000"
        )))
    }
}

fn near(sum: f64, base: f64) -> bool {
    (sum - base).abs() <= base * BASE_TOLERANCE
}

/// Scale fractional or percentage weights to basis points, fixing the
/// rounding remainder so the result sums to exactly 10000.
fn scale_to_bps(values: &[f64], base: f64, policy: RoundingPolicy) -> OrchestratorResult<Vec<u64>> {
    let scale = BPS_DENOMINATOR as f64 / base;
    let mut out: Vec<i64> = values.iter().map(|v| (v * scale).round() as i64).collect();

    let total: i64 = out.iter().sum();
    let remainder = BPS_DENOMINATOR as i64 - total;

    if remainder != 0 {
        let target = match policy {
            RoundingPolicy::AbsorbLast => out.len() - 1,
            RoundingPolicy::AbsorbLargest => out
                .iter()
                .enumerate()
                .max_by_key(|(_, w)| **w)
                .map(|(i, _)| i)
                .unwrap_or(out.len() - 1),
        };
        out[target] += remainder;
    }

    if out.iter().any(|w| *w < 0) {
        return Err(OrchestratorError::InvalidInput(
            "weight normalization produced a negative entry".to_string(),
        ));
    }

    Ok(out.into_iter().map(|w| w as u64).collect())
}

/// Raw basis points are taken literally: the sum must be exact
fn literal_bps(values: &[f64]) -> OrchestratorResult<Vec<u64>> {
    let out: Vec<u64> = values.iter().map(|v| *v as u64).collect();

    let total: u64 = out.iter().sum();
    if total != BPS_DENOMINATOR {
        return Err(OrchestratorError::InvalidInput(format!(
            "basis-point weights sum to {total}, expected exactly {BPS_DENOMINATOR}"
        )));
    }

    Ok(out)
}
