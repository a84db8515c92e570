use crate::abi;
use crate::scanner::LogScanner;
use crate::types::TokenAmount;
use crate::utils::hex::first_word;
use alloy::primitives::{Address, Bytes, U256, U512};
use std::time::Duration;

/// `floor(a * b / c)` with a 512-bit intermediate; zero when `c` is zero.
pub fn mul_div_floor(a: U256, b: U256, c: U256) -> U256 {
    if c.is_zero() {
        return U256::ZERO;
    }
    if let Some(product) = a.checked_mul(b) {
        return product / c;
    }
    let wide = U512::from(a) * U512::from(b) / U512::from(c);
    U256::saturating_from(wide)
}

/// Token value of `shares` in a pool of `total_tokens` backed by `total_shares`.
pub fn shares_to_tokens(shares: U256, total_tokens: U256, total_shares: U256) -> U256 {
    mul_div_floor(shares, total_tokens, total_shares)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationSource {
    Computed,
    ZeroShares,
    /// `getDelegation` failed.
    CallFailed(String),
    /// Shares were found but the pool totals could not be read.
    PoolUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationQuote {
    pub validator: Address,
    pub delegator: Address,
    pub shares: U256,
    pub amount: TokenAmount,
    pub total_tokens: U256,
    pub total_shares: U256,
    pub source: DelegationSource,
}

impl DelegationQuote {
    fn zero(validator: Address, delegator: Address, shares: U256, source: DelegationSource) -> Self {
        Self {
            validator,
            delegator,
            shares,
            amount: TokenAmount::ZERO,
            total_tokens: U256::ZERO,
            total_shares: U256::ZERO,
            source,
        }
    }

    pub fn is_positive(&self) -> bool {
        !self.amount.is_zero()
    }
}

/// Converts a delegator's pool shares into tokens. Pool totals are read fresh
/// on every quote.
#[derive(Clone)]
pub struct DelegationAccountant {
    scanner: LogScanner,
    timeout: Duration,
}

impl DelegationAccountant {
    pub fn new(scanner: LogScanner, timeout: Duration) -> Self {
        Self { scanner, timeout }
    }

    async fn read_word(&self, contract: Address, input: Bytes) -> Result<U256, String> {
        let bytes = self
            .scanner
            .call(contract, input, self.timeout)
            .await
            .map_err(|e| e.to_string())?;
        first_word(&bytes).ok_or_else(|| format!("short return data ({} bytes)", bytes.len()))
    }

    pub async fn compute_delegation(&self, validator: Address, delegator: Address) -> DelegationQuote {
        let shares = match self
            .read_word(validator, abi::encode_get_delegation(delegator))
            .await
        {
            Ok(shares) => shares,
            Err(err) => {
                tracing::debug!(
                    "[ANALYTICS] getDelegation({:#x}) on {:#x} failed: {}",
                    delegator,
                    validator,
                    err
                );
                return DelegationQuote::zero(
                    validator,
                    delegator,
                    U256::ZERO,
                    DelegationSource::CallFailed(err),
                );
            }
        };
        if shares.is_zero() {
            return DelegationQuote::zero(validator, delegator, shares, DelegationSource::ZeroShares);
        }

        let totals = tokio::try_join!(
            self.read_word(validator, abi::encode_tokens()),
            self.read_word(validator, abi::encode_delegator_shares()),
        );
        let (total_tokens, total_shares) = match totals {
            Ok(pair) => pair,
            Err(err) => {
                return DelegationQuote::zero(
                    validator,
                    delegator,
                    shares,
                    DelegationSource::PoolUnavailable(err),
                )
            }
        };

        DelegationQuote {
            validator,
            delegator,
            shares,
            amount: TokenAmount::from_wei(shares_to_tokens(shares, total_tokens, total_shares)),
            total_tokens,
            total_shares,
            source: DelegationSource::Computed,
        }
    }
}
