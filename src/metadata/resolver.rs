use crate::extractor::{event_references, unique_tx_hashes};
use crate::metadata::decode::extract_from_input;
use crate::scanner::{chunk_range, BlockRange, LogEvent, LogScanner};
use crate::storage::SnapshotStore;
use crate::types::{Provenance, ValidatorMetadata};
use crate::utils::config::Config;
use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

const DEFAULT_MAX_TX_INSPECTIONS: usize = 24;

/// Which strategy produced a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPath {
    Cached,
    Decoded,
    HexExtracted,
    RawInference,
    OfficialEndpoint(String),
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub metadata: ValidatorMetadata,
    pub path: ResolutionPath,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub staking_contract: Address,
    pub window_blocks: u64,
    pub official_window_blocks: u64,
    pub chunk_blocks: u64,
    pub range_timeout: Duration,
    pub max_tx_inspections: usize,
    pub batch_size: usize,
    pub avatar_url_template: String,
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staking_contract: config.staking_contract,
            window_blocks: config.metadata_window_blocks,
            official_window_blocks: config.official_metadata_window_blocks,
            chunk_blocks: config.scan_chunk_blocks,
            range_timeout: config.range_timeout,
            max_tx_inspections: DEFAULT_MAX_TX_INSPECTIONS,
            batch_size: config.probe_batch_size.max(1),
            avatar_url_template: config.avatar_url_template.clone(),
        }
    }
}

/// Moniker used when nothing better is known: `Validator-` plus the last six
/// hex digits of the address.
pub fn synthesized_moniker(address: &Address) -> String {
    let hex = format!("{address:x}");
    format!("Validator-{}", &hex[hex.len() - 6..])
}

fn path_for(provenance: Provenance) -> ResolutionPath {
    match provenance {
        Provenance::Decoded => ResolutionPath::Decoded,
        Provenance::HexExtracted => ResolutionPath::HexExtracted,
        Provenance::BasicInference => ResolutionPath::RawInference,
        Provenance::Fallback => ResolutionPath::Synthesized,
    }
}

/// Keep the stronger of two findings; on a tie prefer one with a real name.
fn better(current: Option<ValidatorMetadata>, next: ValidatorMetadata) -> ValidatorMetadata {
    match current {
        None => next,
        Some(cur) => {
            if next.provenance > cur.provenance
                || (next.provenance == cur.provenance
                    && cur.has_generic_name()
                    && !next.has_generic_name())
            {
                next
            } else {
                cur
            }
        }
    }
}

/// Short-circuiting metadata pipeline with a provenance-ranked cache.
#[derive(Clone)]
pub struct MetadataResolver {
    primary: LogScanner,
    officials: Vec<(String, LogScanner)>,
    store: Arc<SnapshotStore>,
    settings: Arc<ResolverSettings>,
}

impl MetadataResolver {
    pub fn new(
        primary: LogScanner,
        officials: Vec<(String, LogScanner)>,
        store: Arc<SnapshotStore>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            primary,
            officials,
            store,
            settings: Arc::new(settings),
        }
    }

    fn avatar_url(&self, address: &Address) -> String {
        self.settings
            .avatar_url_template
            .replace("{address}", &format!("{address:#x}"))
    }

    /// Inspect the transactions behind `events` that reference `validator`.
    async fn inspect_events(
        &self,
        scanner: &LogScanner,
        validator: &Address,
        events: &[LogEvent],
    ) -> Option<ValidatorMetadata> {
        let relevant = events
            .iter()
            .filter(|e| event_references(e, validator))
            .cloned()
            .collect::<Vec<_>>();
        let mut best: Option<ValidatorMetadata> = None;
        for hash in unique_tx_hashes(&relevant)
            .into_iter()
            .take(self.settings.max_tx_inspections)
        {
            let tx = match scanner.transaction(hash).await {
                Ok(Some(tx)) => tx,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!("[META] tx {:#x} lookup failed: {}", hash, err);
                    continue;
                }
            };
            let Some(mut found) = extract_from_input(&tx.input) else {
                continue;
            };
            found.owner = Some(tx.from);
            found.source_tx = Some(hash);
            let done = found.provenance == Provenance::Decoded && !found.has_generic_name();
            best = Some(better(best, found));
            if done {
                break;
            }
        }
        best
    }

    /// Logs of the staking contract plus logs emitted by the validator itself.
    async fn search(
        &self,
        scanner: &LogScanner,
        validator: &Address,
        window: BlockRange,
    ) -> Option<ValidatorMetadata> {
        let ranges = chunk_range(window.from, window.to, self.settings.chunk_blocks);
        let timeout = self.settings.range_timeout;
        let (staking, own) = tokio::join!(
            scanner.scan_chunks(Some(self.settings.staking_contract), &ranges, timeout),
            scanner.scan_chunks(Some(*validator), &ranges, timeout),
        );
        let mut events = staking.events;
        events.extend(own.events);
        self.inspect_events(scanner, validator, &events).await
    }

    fn finish(&self, address: &Address, mut metadata: ValidatorMetadata, path: ResolutionPath, force: bool) -> Resolution {
        if metadata.moniker.trim().is_empty() {
            metadata.moniker = synthesized_moniker(address);
        }
        if metadata.avatar_url.is_none() {
            metadata.avatar_url = Some(self.avatar_url(address));
        }
        if !self.store.offer_metadata(address, metadata.clone(), force) {
            // A stronger entry is already cached; serve that.
            if let Some(cached) = self.store.metadata(address) {
                return Resolution {
                    metadata: cached,
                    path: ResolutionPath::Cached,
                };
            }
        }
        tracing::debug!(
            "[META] {:#x} resolved via {:?} ({})",
            address,
            path,
            metadata.provenance.as_str()
        );
        Resolution { metadata, path }
    }

    /// Resolve metadata for `address`. `hints` are already-scanned events
    /// (typically from the current refresh cycle) searched before any new scan.
    pub async fn resolve(
        &self,
        address: Address,
        hints: &[LogEvent],
        head: u64,
        force: bool,
    ) -> Resolution {
        if !force {
            if let Some(cached) = self.store.metadata(&address) {
                return Resolution {
                    metadata: cached,
                    path: ResolutionPath::Cached,
                };
            }
        }

        let mut primary = self.inspect_events(&self.primary, &address, hints).await;
        if primary.as_ref().map_or(true, |m| m.provenance != Provenance::Decoded) {
            let window = BlockRange::recent(head, self.settings.window_blocks);
            if let Some(found) = self.search(&self.primary, &address, window).await {
                primary = Some(better(primary, found));
            }
        }

        if let Some(found) = primary.as_ref() {
            if !found.has_generic_name() {
                let path = path_for(found.provenance);
                return self.finish(&address, found.clone(), path, force);
            }
        }

        for (name, scanner) in &self.officials {
            let official_head = match scanner.head_block().await {
                Ok(h) => h,
                Err(err) => {
                    tracing::warn!("[META] official endpoint {} unavailable: {}", name, err);
                    continue;
                }
            };
            let window = BlockRange::recent(official_head, self.settings.official_window_blocks);
            if let Some(found) = self.search(scanner, &address, window).await {
                if !found.has_generic_name() {
                    tracing::info!(
                        "[META] {:#x} recovered from official endpoint {}",
                        address,
                        name
                    );
                    return self.finish(
                        &address,
                        found,
                        ResolutionPath::OfficialEndpoint(name.clone()),
                        force,
                    );
                }
                primary = Some(better(primary, found));
            }
        }

        match primary {
            Some(found) => {
                let path = path_for(found.provenance);
                self.finish(&address, found, path, force)
            }
            None => {
                let mut synthesized = ValidatorMetadata::empty(Provenance::Fallback);
                synthesized.moniker = synthesized_moniker(&address);
                self.finish(&address, synthesized, ResolutionPath::Synthesized, force)
            }
        }
    }

    /// Resolve many addresses with at most `batch_size` in flight. A cached
    /// `fallback` entry is retried; anything stronger is served from cache.
    pub async fn resolve_all(
        &self,
        addresses: &[Address],
        hints: Arc<Vec<LogEvent>>,
        head: u64,
    ) -> Vec<(Address, Resolution)> {
        let limit = self.settings.batch_size.max(1);
        let mut out: Vec<(usize, Address, Resolution)> = Vec::with_capacity(addresses.len());
        let mut in_flight = JoinSet::new();
        for (idx, address) in addresses.iter().copied().enumerate() {
            while in_flight.len() >= limit {
                if let Some(done) = in_flight.join_next().await {
                    collect_resolution(done, &mut out);
                }
            }
            let resolver = self.clone();
            let hints = Arc::clone(&hints);
            let retry_fallback = self
                .store
                .metadata(&address)
                .map_or(false, |m| m.provenance == Provenance::Fallback);
            in_flight.spawn(async move {
                let resolution = resolver.resolve(address, &hints, head, retry_fallback).await;
                (idx, address, resolution)
            });
        }
        while let Some(done) = in_flight.join_next().await {
            collect_resolution(done, &mut out);
        }
        out.sort_by_key(|(idx, _, _)| *idx);
        out.into_iter().map(|(_, a, r)| (a, r)).collect()
    }
}

fn collect_resolution(
    done: Result<(usize, Address, Resolution), tokio::task::JoinError>,
    out: &mut Vec<(usize, Address, Resolution)>,
) {
    match done {
        Ok(item) => out.push(item),
        Err(err) => tracing::warn!("[META] resolution task aborted: {}", err),
    }
}
