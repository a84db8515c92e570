use crate::accountant::{DelegationAccountant, DelegationQuote};
use crate::analytics::stats::{compute_stats, DelegatorStats};
use crate::extractor::{enrich_with_senders, extract_candidates, CandidateSet};
use crate::scanner::{chunk_range, BlockRange, LogScanner};
use crate::types::{assign_percentages, DelegationRecord, DiscoveryTechnique, TokenAmount};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryCoverage {
    pub from_block: u64,
    pub to_block: u64,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub events: usize,
    pub candidates: usize,
    pub known_probed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegatorAnalytics {
    pub validator: Address,
    pub delegators: Vec<DelegationRecord>,
    pub stats: DelegatorStats,
    pub coverage: DiscoveryCoverage,
}

/// A wallet's position with one validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletPosition {
    pub validator: Address,
    pub moniker: Option<String>,
    pub shares: U256,
    pub amount: TokenAmount,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletDelegations {
    pub wallet: Address,
    pub positions: Vec<WalletPosition>,
    pub total: TokenAmount,
    pub validators_checked: usize,
}

/// Run the accountant for every `(validator, delegator)` pair with at most
/// `limit` quotes in flight. Input order is preserved.
pub async fn quote_all(
    accountant: &DelegationAccountant,
    pairs: Vec<(Address, Address)>,
    limit: usize,
) -> Vec<DelegationQuote> {
    let limit = limit.max(1);
    let mut quotes: Vec<(usize, DelegationQuote)> = Vec::with_capacity(pairs.len());
    let mut in_flight = JoinSet::new();
    for (idx, (validator, delegator)) in pairs.into_iter().enumerate() {
        while in_flight.len() >= limit {
            if let Some(done) = in_flight.join_next().await {
                collect_quote(done, &mut quotes);
            }
        }
        let accountant = accountant.clone();
        in_flight.spawn(async move { (idx, accountant.compute_delegation(validator, delegator).await) });
    }
    while let Some(done) = in_flight.join_next().await {
        collect_quote(done, &mut quotes);
    }
    quotes.sort_by_key(|(idx, _)| *idx);
    quotes.into_iter().map(|(_, q)| q).collect()
}

fn collect_quote(
    done: Result<(usize, DelegationQuote), tokio::task::JoinError>,
    quotes: &mut Vec<(usize, DelegationQuote)>,
) {
    match done {
        Ok(done) => quotes.push(done),
        Err(err) => tracing::warn!("[ANALYTICS] delegation quote task aborted: {}", err),
    }
}

/// Positive quotes ranked by amount (desc), with percentages of their total.
pub fn rank_delegations(quotes: &[DelegationQuote]) -> Vec<DelegationRecord> {
    let mut records = quotes
        .iter()
        .filter(|q| q.is_positive())
        .map(|q| DelegationRecord {
            delegator: q.delegator,
            shares: q.shares,
            amount: q.amount,
            percentage: 0.0,
        })
        .collect::<Vec<_>>();
    records.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.delegator.cmp(&b.delegator))
    });
    assign_percentages(&mut records);
    records
}

pub struct DelegatorDiscovery<'a> {
    pub scanner: &'a LogScanner,
    pub accountant: &'a DelegationAccountant,
    pub window_blocks: u64,
    pub chunk_blocks: u64,
    pub range_timeout: Duration,
    pub max_sender_lookups: usize,
    pub batch_size: usize,
}

impl DelegatorDiscovery<'_> {
    /// Scan the validator's own logs, extract candidates and senders, add the
    /// `known` addresses, then quote each candidate's delegation.
    pub async fn run(&self, validator: Address, head: u64, known: &[Address]) -> DelegatorAnalytics {
        let window = BlockRange::recent(head, self.window_blocks);
        let ranges = chunk_range(window.from, window.to, self.chunk_blocks);
        let outcome = self
            .scanner
            .scan_chunks(Some(validator), &ranges, self.range_timeout)
            .await;

        let mut candidates: CandidateSet = extract_candidates(&outcome.events);
        enrich_with_senders(
            self.scanner,
            &outcome.events,
            &mut candidates,
            self.max_sender_lookups,
        )
        .await;
        let extracted = candidates.len();
        let mut known_probed = 0usize;
        for address in known {
            if candidates.insert(*address, DiscoveryTechnique::KnownAddress) {
                known_probed += 1;
            }
        }

        let pairs = candidates
            .iter()
            .filter(|c| c.address != validator)
            .map(|c| (validator, c.address))
            .collect::<Vec<_>>();
        let quotes = quote_all(self.accountant, pairs, self.batch_size).await;
        let delegators = rank_delegations(&quotes);
        let amounts = delegators.iter().map(|d| d.amount.wei()).collect::<Vec<_>>();
        let stats = compute_stats(&amounts);
        tracing::info!(
            "[ANALYTICS] {:#x}: {} delegator(s) from {} candidate(s) (+{} known), total={}",
            validator,
            delegators.len(),
            extracted,
            known_probed,
            stats.total_staked
        );

        DelegatorAnalytics {
            validator,
            delegators,
            stats,
            coverage: DiscoveryCoverage {
                from_block: window.from,
                to_block: window.to,
                chunks: ranges.len(),
                failed_chunks: outcome.failed_chunks,
                events: outcome.events.len(),
                candidates: extracted,
                known_probed,
            },
        }
    }
}
