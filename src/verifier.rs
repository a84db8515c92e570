use crate::abi;
use crate::extractor::CandidateAddress;
use crate::scanner::LogScanner;
use crate::types::{DiscoveryTechnique, ProbeValues};
use crate::utils::config::Config;
use crate::utils::constants::COMMISSION_RATE_MAX;
use crate::utils::hex::{address_key, first_word};
use alloy::primitives::{Address, Bytes, U256};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinSet;

/// Checkpoints a candidate passes on its way to acceptance, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VerificationStage {
    Candidate,
    ProbedTokens,
    ProbedShares,
    ProbedCommission,
    CommissionInRange,
    StakeAboveFloor,
    ProbedWithdrawalFee,
    Accepted,
}

impl VerificationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::ProbedTokens => "probed_tokens",
            Self::ProbedShares => "probed_shares",
            Self::ProbedCommission => "probed_commission",
            Self::CommissionInRange => "commission_in_range",
            Self::StakeAboveFloor => "stake_above_floor",
            Self::ProbedWithdrawalFee => "probed_withdrawal_fee",
            Self::Accepted => "accepted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Success(U256),
    Failure(String),
}

impl ProbeResult {
    pub fn value(&self) -> Option<U256> {
        match self {
            Self::Success(v) => Some(*v),
            Self::Failure(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    TokensUnavailable(String),
    SharesUnavailable(String),
    CommissionUnavailable(String),
    CommissionOutOfRange(U256),
    StakeBelowFloor { tokens: U256, floor: U256 },
    WithdrawalFeeUnavailable(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokensUnavailable(e) => write!(f, "tokens() unavailable: {e}"),
            Self::SharesUnavailable(e) => write!(f, "delegatorShares() unavailable: {e}"),
            Self::CommissionUnavailable(e) => write!(f, "commissionRate() unavailable: {e}"),
            Self::CommissionOutOfRange(rate) => {
                write!(f, "commission {rate} outside [0, {COMMISSION_RATE_MAX}]")
            }
            Self::StakeBelowFloor { tokens, floor } => {
                write!(f, "stake {tokens} below floor {floor}")
            }
            Self::WithdrawalFeeUnavailable(e) => {
                write!(f, "withdrawalFeeInGwei() unavailable: {e}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub address: Address,
    pub technique: DiscoveryTechnique,
    /// Last stage the candidate passed.
    pub stage: VerificationStage,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedValidator {
    pub address: Address,
    pub technique: DiscoveryTechnique,
    pub probes: ProbeValues,
    pub commission_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(AcceptedValidator),
    Rejected(Rejection),
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub accepted: Vec<AcceptedValidator>,
    pub rejected: Vec<Rejection>,
    pub duplicates_skipped: usize,
}

impl VerificationReport {
    pub fn rejected_at(&self, stage: VerificationStage) -> usize {
        self.rejected.iter().filter(|r| r.stage == stage).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerifierSettings {
    pub min_stake_floor: U256,
    pub batch_size: usize,
    pub probe_timeout: Duration,
}

impl VerifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_stake_floor: config.min_stake_floor_wei,
            batch_size: config.probe_batch_size.max(1),
            probe_timeout: config.probe_timeout,
        }
    }
}

/// Decides whether a candidate address is a validator contract by probing its
/// capability surface in a fixed order.
#[derive(Clone)]
pub struct ValidatorVerifier {
    scanner: LogScanner,
    settings: VerifierSettings,
}

impl ValidatorVerifier {
    pub fn new(scanner: LogScanner, settings: VerifierSettings) -> Self {
        Self { scanner, settings }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    async fn probe(&self, contract: Address, input: Bytes) -> ProbeResult {
        match self
            .scanner
            .call(contract, input, self.settings.probe_timeout)
            .await
        {
            Ok(bytes) => match first_word(&bytes) {
                Some(word) => ProbeResult::Success(word),
                None if bytes.is_empty() => ProbeResult::Failure("empty return data".to_string()),
                None => ProbeResult::Failure(format!("short return data ({} bytes)", bytes.len())),
            },
            Err(err) => ProbeResult::Failure(err.to_string()),
        }
    }

    pub async fn verify(&self, candidate: CandidateAddress) -> Verdict {
        let CandidateAddress { address, technique } = candidate;
        let reject = |stage, reason| {
            Verdict::Rejected(Rejection {
                address,
                technique,
                stage,
                reason,
            })
        };

        let tokens = match self.probe(address, abi::encode_tokens()).await {
            ProbeResult::Success(v) => v,
            ProbeResult::Failure(e) => {
                return reject(
                    VerificationStage::Candidate,
                    RejectionReason::TokensUnavailable(e),
                )
            }
        };
        let delegator_shares = match self.probe(address, abi::encode_delegator_shares()).await {
            ProbeResult::Success(v) => v,
            ProbeResult::Failure(e) => {
                return reject(
                    VerificationStage::ProbedTokens,
                    RejectionReason::SharesUnavailable(e),
                )
            }
        };
        let commission_rate = match self.probe(address, abi::encode_commission_rate()).await {
            ProbeResult::Success(v) => v,
            ProbeResult::Failure(e) => {
                return reject(
                    VerificationStage::ProbedShares,
                    RejectionReason::CommissionUnavailable(e),
                )
            }
        };
        if commission_rate > U256::from(COMMISSION_RATE_MAX) {
            return reject(
                VerificationStage::ProbedCommission,
                RejectionReason::CommissionOutOfRange(commission_rate),
            );
        }
        if tokens < self.settings.min_stake_floor {
            return reject(
                VerificationStage::CommissionInRange,
                RejectionReason::StakeBelowFloor {
                    tokens,
                    floor: self.settings.min_stake_floor,
                },
            );
        }
        let withdrawal_fee_gwei = match self.probe(address, abi::encode_withdrawal_fee()).await {
            ProbeResult::Success(v) => v,
            ProbeResult::Failure(e) => {
                return reject(
                    VerificationStage::StakeAboveFloor,
                    RejectionReason::WithdrawalFeeUnavailable(e),
                )
            }
        };

        Verdict::Accepted(AcceptedValidator {
            address,
            technique,
            probes: ProbeValues {
                tokens,
                delegator_shares,
                commission_rate,
                withdrawal_fee_gwei,
            },
            commission_bps: commission_rate.to::<u64>(),
        })
    }

    /// Verify every candidate with at most `batch_size` in flight. Each address
    /// is probed once per call.
    pub async fn verify_all(&self, candidates: &[CandidateAddress]) -> VerificationReport {
        let mut report = VerificationReport::default();
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if seen.insert(address_key(&candidate.address)) {
                unique.push(*candidate);
            } else {
                report.duplicates_skipped += 1;
            }
        }

        let limit = self.settings.batch_size.max(1);
        let mut verdicts: Vec<(usize, Verdict)> = Vec::with_capacity(unique.len());
        let mut in_flight = JoinSet::new();
        for (idx, candidate) in unique.into_iter().enumerate() {
            while in_flight.len() >= limit {
                if let Some(done) = in_flight.join_next().await {
                    collect_verdict(done, &mut verdicts);
                }
            }
            let verifier = self.clone();
            in_flight.spawn(async move { (idx, verifier.verify(candidate).await) });
        }
        while let Some(done) = in_flight.join_next().await {
            collect_verdict(done, &mut verdicts);
        }

        verdicts.sort_by_key(|(idx, _)| *idx);
        for (_, verdict) in verdicts {
            match verdict {
                Verdict::Accepted(accepted) => report.accepted.push(accepted),
                Verdict::Rejected(rejection) => {
                    tracing::debug!(
                        "[VERIFY] rejected {:#x} at {}: {}",
                        rejection.address,
                        rejection.stage.as_str(),
                        rejection.reason
                    );
                    report.rejected.push(rejection);
                }
            }
        }
        tracing::info!(
            "[VERIFY] {} candidate(s): accepted={} rejected={} duplicates={}",
            candidates.len(),
            report.accepted.len(),
            report.rejected.len(),
            report.duplicates_skipped
        );
        report
    }
}

fn collect_verdict(
    done: Result<(usize, Verdict), tokio::task::JoinError>,
    verdicts: &mut Vec<(usize, Verdict)>,
) {
    match done {
        Ok(pair) => verdicts.push(pair),
        Err(err) => tracing::warn!("[VERIFY] probe task aborted: {}", err),
    }
}
