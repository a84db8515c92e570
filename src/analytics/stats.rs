use crate::accountant::mul_div_floor;
use crate::types::{share_pct, TokenAmount};
use alloy::primitives::U256;
use serde::Serialize;

const GINI_SCALE: u64 = 1_000_000_000;
const TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConcentrationLabel {
    #[serde(rename = "No delegators")]
    NoDelegators,
    Low,
    Moderate,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ConcentrationLabel {
    /// Thresholds on the top-10 share: 40 / 60 / 80 percent.
    pub fn from_top_share(count: usize, top_share_pct: f64) -> Self {
        if count == 0 {
            Self::NoDelegators
        } else if top_share_pct < 40.0 {
            Self::Low
        } else if top_share_pct < 60.0 {
            Self::Moderate
        } else if top_share_pct < 80.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoDelegators => "No delegators",
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::VeryHigh => "Very High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegatorStats {
    pub total_staked: TokenAmount,
    pub delegator_count: usize,
    pub mean: TokenAmount,
    pub median: TokenAmount,
    pub max: TokenAmount,
    pub min: TokenAmount,
    pub top10_share_pct: f64,
    pub gini: f64,
    pub concentration: ConcentrationLabel,
}

impl DelegatorStats {
    pub fn empty() -> Self {
        Self {
            total_staked: TokenAmount::ZERO,
            delegator_count: 0,
            mean: TokenAmount::ZERO,
            median: TokenAmount::ZERO,
            max: TokenAmount::ZERO,
            min: TokenAmount::ZERO,
            top10_share_pct: 0.0,
            gini: 0.0,
            concentration: ConcentrationLabel::NoDelegators,
        }
    }
}

/// Σ|xi − xj| / (2·n·total) over all ordered pairs, evaluated on the sorted
/// values as Σ(2i − n − 1)·x(i) / (n·total).
pub fn gini(sorted_ascending: &[U256], total: U256) -> f64 {
    let n = sorted_ascending.len();
    if n < 2 || total.is_zero() {
        return 0.0;
    }
    let mut positive = U256::ZERO;
    let mut negative = U256::ZERO;
    for (i, x) in sorted_ascending.iter().enumerate() {
        let rank = 2 * (i as u64 + 1);
        let pivot = n as u64 + 1;
        if rank > pivot {
            positive = positive.saturating_add(x.saturating_mul(U256::from(rank - pivot)));
        } else {
            negative = negative.saturating_add(x.saturating_mul(U256::from(pivot - rank)));
        }
    }
    let numerator = positive.saturating_sub(negative);
    let denominator = U256::from(n as u64).saturating_mul(total);
    let scaled = mul_div_floor(numerator, U256::from(GINI_SCALE), denominator);
    let scaled: u64 = scaled.try_into().unwrap_or(GINI_SCALE);
    scaled as f64 / GINI_SCALE as f64
}

/// floor((a + b) / 2) without overflowing.
fn midpoint(a: U256, b: U256) -> U256 {
    let two = U256::from(2u64);
    a / two + b / two + (a % two + b % two) / two
}

pub fn compute_stats(amounts: &[U256]) -> DelegatorStats {
    if amounts.is_empty() {
        return DelegatorStats::empty();
    }
    let mut sorted = amounts.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let total = sorted
        .iter()
        .fold(U256::ZERO, |acc, x| acc.saturating_add(*x));
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        midpoint(sorted[n / 2 - 1], sorted[n / 2])
    };
    let top: U256 = sorted
        .iter()
        .rev()
        .take(TOP_N)
        .fold(U256::ZERO, |acc, x| acc.saturating_add(*x));
    let top10_share_pct = share_pct(top, total);

    DelegatorStats {
        total_staked: TokenAmount::from_wei(total),
        delegator_count: n,
        mean: TokenAmount::from_wei(total / U256::from(n as u64)),
        median: TokenAmount::from_wei(median),
        max: TokenAmount::from_wei(sorted[n - 1]),
        min: TokenAmount::from_wei(sorted[0]),
        top10_share_pct,
        gini: gini(&sorted, total),
        concentration: ConcentrationLabel::from_top_share(n, top10_share_pct),
    }
}
