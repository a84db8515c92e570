//! Data model shared by the scanner, verifier, controller and analytics.
//!
//! Monetary values stay integer (`U256` base units) end to end. Percentages are
//! the only floating-point values and are derived from integer ratios.

use crate::utils::constants::TOKEN_DECIMALS;
use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, B256, U256};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Percentages are computed with this many fractional decimal digits.
const PCT_SCALE: u64 = 1_000_000;

pub fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// `part / total * 100`, computed in integer space. Zero total yields zero.
pub fn share_pct(part: U256, total: U256) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    let scaled = part.saturating_mul(U256::from(PCT_SCALE * 100)) / total;
    let scaled: u128 = scaled.try_into().unwrap_or(u128::MAX);
    scaled as f64 / PCT_SCALE as f64
}

/// Token amount in base units (18 decimals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    pub fn wei(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Decimal token string, e.g. `1.500000000000000000`.
    pub fn to_token_string(&self) -> String {
        format_units(self.0, TOKEN_DECIMALS).unwrap_or_else(|_| self.0.to_string())
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token_string())
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl std::iter::Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TokenAmount", 2)?;
        s.serialize_field("wei", &self.0.to_string())?;
        s.serialize_field("tokens", &self.to_token_string())?;
        s.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryTechnique {
    TopicSlot,
    DataScan,
    TxSender,
    /// Supplied from configuration or a prior snapshot rather than extracted from logs.
    KnownAddress,
}

/// Raw values returned by the four capability probes of an accepted validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeValues {
    pub tokens: U256,
    pub delegator_shares: U256,
    pub commission_rate: U256,
    pub withdrawal_fee_gwei: U256,
}

/// Confidence of a metadata record, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Fallback,
    BasicInference,
    HexExtracted,
    Decoded,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fallback => "fallback",
            Self::BasicInference => "basic-inference",
            Self::HexExtracted => "hex-extracted",
            Self::Decoded => "decoded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorMetadata {
    pub moniker: String,
    pub identity: String,
    pub website: String,
    pub security_contact: String,
    pub details: String,
    pub commission_bps: Option<u64>,
    pub owner: Option<Address>,
    pub avatar_url: Option<String>,
    pub provenance: Provenance,
    pub source_tx: Option<B256>,
}

impl ValidatorMetadata {
    pub fn empty(provenance: Provenance) -> Self {
        Self {
            moniker: String::new(),
            identity: String::new(),
            website: String::new(),
            security_contact: String::new(),
            details: String::new(),
            commission_bps: None,
            owner: None,
            avatar_url: None,
            provenance,
            source_tx: None,
        }
    }

    /// Names that carry no information about the operator.
    pub fn has_generic_name(&self) -> bool {
        let name = self.moniker.trim().to_ascii_lowercase();
        name.is_empty()
            || name == "validator"
            || name == "unknown"
            || name == "node"
            || name.starts_with("validator-")
            || name.starts_with("validator ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorRecord {
    pub address: Address,
    pub total_staked: TokenAmount,
    pub technique: DiscoveryTechnique,
    pub probes: ProbeValues,
    pub commission_bps: u64,
    pub self_delegation: TokenAmount,
    pub voting_power_pct: f64,
    pub active: bool,
    pub metadata: Option<ValidatorMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegationRecord {
    pub delegator: Address,
    pub shares: U256,
    pub amount: TokenAmount,
    pub percentage: f64,
}

/// Recompute every record's share of the set's total.
pub fn assign_percentages(records: &mut [DelegationRecord]) {
    let total: U256 = records
        .iter()
        .fold(U256::ZERO, |acc, r| acc.saturating_add(r.amount.wei()));
    for record in records.iter_mut() {
        record.percentage = share_pct(record.amount.wei(), total);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TxType {
    CreateValidator,
    Delegate,
    Undelegate,
    Withdraw,
    UpdateCommission,
    Redelegate,
    Stake,
    Others,
}

impl TxType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateValidator => "CreateValidator",
            Self::Delegate => "Delegate",
            Self::Undelegate => "Undelegate",
            Self::Withdraw => "Withdraw",
            Self::UpdateCommission => "UpdateCommission",
            Self::Redelegate => "Redelegate",
            Self::Stake => "Stake",
            Self::Others => "Others",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TxStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub hash: B256,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub amount: TokenAmount,
    pub from: Address,
    pub to: Option<Address>,
    pub block_number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProvenance {
    pub from_block: u64,
    pub to_block: u64,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub events: usize,
    pub candidates: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSnapshot {
    pub generation: u64,
    pub validators: Vec<ValidatorRecord>,
    pub total_staked: TokenAmount,
    pub total_active_stake: TokenAmount,
    pub active_count: usize,
    pub inactive_count: usize,
    pub scan: ScanProvenance,
    pub built_at_ms: u64,
    pub build_duration_ms: u64,
}

impl NetworkSnapshot {
    pub fn validator(&self, address: &Address) -> Option<&ValidatorRecord> {
        self.validators.iter().find(|v| &v.address == address)
    }

    /// Owner addresses recorded in validator metadata.
    pub fn known_owners(&self) -> Vec<Address> {
        let mut owners = Vec::new();
        for owner in self
            .validators
            .iter()
            .filter_map(|v| v.metadata.as_ref().and_then(|m| m.owner))
        {
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }
        owners
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    Initializing,
    Scanning,
    ExtractingMetadata,
    Formatting,
    Ready,
    Degraded,
}

impl ControllerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Scanning => "scanning",
            Self::ExtractingMetadata => "extracting_metadata",
            Self::Formatting => "formatting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotStatus {
    pub ready: bool,
    pub stale: bool,
    pub degraded: bool,
    pub phase: ControllerPhase,
    pub generation: u64,
    pub validator_count: usize,
    pub last_update_ms: Option<u64>,
    pub degraded_since_ms: Option<u64>,
    pub last_error: Option<String>,
}
