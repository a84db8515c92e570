//! Heuristic address discovery from raw event logs.
//!
//! Extraction is best-effort: topic slots and byte windows that merely look
//! like addresses are emitted too, and the verifier filters them.

use crate::scanner::{LogEvent, LogScanner};
use crate::types::DiscoveryTechnique;
use crate::utils::hex::address_key;
use alloy::primitives::{Address, B256};
use std::collections::{HashMap, HashSet};
use tokio::task::JoinSet;

const ADDRESS_LEN: usize = 20;
const TOPIC_PADDING: usize = 12;
const SENDER_LOOKUP_PARALLELISM: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateAddress {
    pub address: Address,
    pub technique: DiscoveryTechnique,
}

/// Insertion-ordered candidate set keyed by lowercase hex.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: Vec<CandidateAddress>,
    index: HashMap<String, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` for the zero address and for addresses already present;
    /// the technique recorded first is kept.
    pub fn insert(&mut self, address: Address, technique: DiscoveryTechnique) -> bool {
        if address == Address::ZERO {
            return false;
        }
        let key = address_key(&address);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(CandidateAddress { address, technique });
        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(&address_key(address))
    }

    pub fn technique_of(&self, address: &Address) -> Option<DiscoveryTechnique> {
        self.index
            .get(&address_key(address))
            .map(|&idx| self.entries[idx].technique)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateAddress> {
        self.entries.iter()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries.iter().map(|c| c.address).collect()
    }

    pub fn count_by(&self, technique: DiscoveryTechnique) -> usize {
        self.entries
            .iter()
            .filter(|c| c.technique == technique)
            .count()
    }

    pub fn into_vec(self) -> Vec<CandidateAddress> {
        self.entries
    }
}

/// A topic is an address slot when its top 12 bytes are zero padding and the
/// remaining 20 bytes are not all zero.
pub fn topic_address(topic: &B256) -> Option<Address> {
    let bytes = topic.as_slice();
    if bytes[..TOPIC_PADDING].iter().any(|b| *b != 0) {
        return None;
    }
    let address = Address::from_slice(&bytes[TOPIC_PADDING..]);
    (address != Address::ZERO).then_some(address)
}

/// Every non-zero 20-byte window of `data`, at every byte offset.
pub fn data_window_addresses(data: &[u8]) -> impl Iterator<Item = Address> + '_ {
    data.windows(ADDRESS_LEN)
        .map(Address::from_slice)
        .filter(|addr| *addr != Address::ZERO)
}

/// Does `event` mention `address` in a topic slot, its data, or as emitter?
pub fn event_references(event: &LogEvent, address: &Address) -> bool {
    if &event.address == address {
        return true;
    }
    if event
        .topics
        .iter()
        .filter_map(topic_address)
        .any(|a| &a == address)
    {
        return true;
    }
    event
        .data
        .windows(ADDRESS_LEN)
        .any(|w| w == address.as_slice())
}

/// Topic-slot and data-window candidates. Pure.
pub fn extract_candidates(events: &[LogEvent]) -> CandidateSet {
    let mut set = CandidateSet::new();
    for event in events {
        for topic in &event.topics {
            if let Some(address) = topic_address(topic) {
                set.insert(address, DiscoveryTechnique::TopicSlot);
            }
        }
        for address in data_window_addresses(&event.data) {
            set.insert(address, DiscoveryTechnique::DataScan);
        }
    }
    set
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderEnrichment {
    pub lookups: usize,
    pub failures: usize,
    pub added: usize,
    pub skipped_over_cap: usize,
}

/// Unique transaction hashes in first-seen order.
pub fn unique_tx_hashes(events: &[LogEvent]) -> Vec<B256> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter_map(|e| e.tx_hash)
        .filter(|h| seen.insert(*h))
        .collect()
}

/// Add the sender of each event's transaction, one lookup per unique hash and
/// at most `max_lookups` lookups in total.
pub async fn enrich_with_senders(
    scanner: &LogScanner,
    events: &[LogEvent],
    set: &mut CandidateSet,
    max_lookups: usize,
) -> SenderEnrichment {
    let hashes = unique_tx_hashes(events);
    let mut report = SenderEnrichment {
        skipped_over_cap: hashes.len().saturating_sub(max_lookups),
        ..SenderEnrichment::default()
    };

    let mut senders: Vec<(usize, Address)> = Vec::new();
    let mut in_flight = JoinSet::new();
    for (idx, hash) in hashes.into_iter().take(max_lookups).enumerate() {
        while in_flight.len() >= SENDER_LOOKUP_PARALLELISM {
            if let Some(done) = in_flight.join_next().await {
                collect_sender(done, &mut senders, &mut report);
            }
        }
        let scanner = scanner.clone();
        report.lookups += 1;
        in_flight.spawn(async move { (idx, scanner.transaction(hash).await) });
    }
    while let Some(done) = in_flight.join_next().await {
        collect_sender(done, &mut senders, &mut report);
    }

    senders.sort_by_key(|(idx, _)| *idx);
    for (_, sender) in senders {
        if set.insert(sender, DiscoveryTechnique::TxSender) {
            report.added += 1;
        }
    }
    if report.skipped_over_cap > 0 {
        tracing::debug!(
            "[SCAN] sender lookups capped at {} ({} transaction(s) skipped)",
            max_lookups,
            report.skipped_over_cap
        );
    }
    report
}

type SenderLookup = (
    usize,
    Result<Option<crate::scanner::TransactionDetails>, crate::error::RpcError>,
);

fn collect_sender(
    done: Result<SenderLookup, tokio::task::JoinError>,
    senders: &mut Vec<(usize, Address)>,
    report: &mut SenderEnrichment,
) {
    match done {
        Ok((idx, Ok(Some(tx)))) => senders.push((idx, tx.from)),
        Ok((_, Ok(None))) => report.failures += 1,
        Ok((_, Err(err))) => {
            report.failures += 1;
            tracing::debug!("[SCAN] sender lookup failed: {}", err);
        }
        Err(err) => {
            report.failures += 1;
            tracing::debug!("[SCAN] sender lookup task aborted: {}", err);
        }
    }
}
