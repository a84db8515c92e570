use crate::accountant::DelegationAccountant;
use crate::error::{RefreshError, StakeError};
use crate::extractor::{enrich_with_senders, extract_candidates};
use crate::metadata::MetadataResolver;
use crate::scanner::{chunk_range, BlockRange, LogScanner};
use crate::storage::SnapshotStore;
use crate::types::{
    share_pct, unix_now_ms, ControllerPhase, NetworkSnapshot, ScanProvenance, TokenAmount,
    ValidatorMetadata, ValidatorRecord,
};
use crate::utils::config::Config;
use crate::verifier::{AcceptedValidator, ValidatorVerifier};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub staking_contract: Address,
    pub scan_start_block: Option<u64>,
    pub scan_window_blocks: u64,
    pub scan_chunk_blocks: u64,
    pub range_timeout: Duration,
    pub include_tx_senders: bool,
    pub max_sender_lookups: usize,
    pub sanity_min_validators: usize,
    pub active_set_size: usize,
    pub batch_size: usize,
    pub interval: Duration,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staking_contract: config.staking_contract,
            scan_start_block: config.scan_start_block,
            scan_window_blocks: config.scan_window_blocks,
            scan_chunk_blocks: config.scan_chunk_blocks,
            range_timeout: config.range_timeout,
            include_tx_senders: config.scan_include_tx_senders,
            max_sender_lookups: config.max_sender_lookups,
            sanity_min_validators: config.sanity_min_validators,
            active_set_size: config.active_set_size,
            batch_size: config.probe_batch_size.max(1),
            interval: config.refresh_interval,
        }
    }

    fn scan_window(&self, head: u64) -> BlockRange {
        match self.scan_start_block {
            Some(start) => BlockRange::new(start, head),
            None => BlockRange::recent(head, self.scan_window_blocks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published {
        generation: u64,
        validators: usize,
        duration_ms: u64,
    },
    /// The cycle failed; the previous snapshot (if any) stays live.
    Degraded {
        generation: u64,
        reason: String,
        serving_generation: Option<u64>,
    },
    /// A newer cycle published first.
    Superseded { generation: u64, current: u64 },
    /// Timer tick while another refresh was running.
    Skipped,
}

/// Sort by stake descending (address ascending on ties), mark the top
/// `active_set_size` non-zero validators active and assign voting power
/// as a share of active stake.
pub fn rank_validators(records: &mut [ValidatorRecord], active_set_size: usize) -> (TokenAmount, usize) {
    records.sort_by(|a, b| {
        b.total_staked
            .cmp(&a.total_staked)
            .then_with(|| a.address.cmp(&b.address))
    });
    let mut active_stake = U256::ZERO;
    let mut active_count = 0usize;
    for record in records.iter_mut() {
        record.active = active_count < active_set_size && !record.total_staked.is_zero();
        if record.active {
            active_count += 1;
            active_stake = active_stake.saturating_add(record.total_staked.wei());
        }
    }
    for record in records.iter_mut() {
        record.voting_power_pct = if record.active {
            share_pct(record.total_staked.wei(), active_stake)
        } else {
            0.0
        };
    }
    (TokenAmount::from_wei(active_stake), active_count)
}

/// Runs the discovery pipeline and publishes snapshots into the store.
pub struct RefreshController {
    scanner: LogScanner,
    verifier: ValidatorVerifier,
    accountant: DelegationAccountant,
    resolver: MetadataResolver,
    store: Arc<SnapshotStore>,
    settings: RefreshSettings,
    lock: Mutex<()>,
}

impl RefreshController {
    pub fn new(
        scanner: LogScanner,
        verifier: ValidatorVerifier,
        accountant: DelegationAccountant,
        resolver: MetadataResolver,
        store: Arc<SnapshotStore>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            scanner,
            verifier,
            accountant,
            resolver,
            store,
            settings,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Run a cycle now, waiting for any in-flight refresh to finish first.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        let _guard = self.lock.lock().await;
        self.run_cycle().await
    }

    /// Run a cycle unless one is already in flight.
    pub async fn try_refresh(&self) -> RefreshOutcome {
        let Ok(_guard) = self.lock.try_lock() else {
            tracing::debug!("[REFRESH] refresh already in flight; tick skipped");
            return RefreshOutcome::Skipped;
        };
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        let generation = self.store.next_generation();
        let started = Instant::now();
        match self.build(generation, started).await {
            Ok(snapshot) => {
                let validators = snapshot.validators.len();
                match self.store.publish(snapshot) {
                    Ok(published) => {
                        tracing::info!(
                            "[REFRESH] generation {} published: validators={} active={} total_staked={} in {}ms",
                            generation,
                            validators,
                            published.active_count,
                            published.total_staked,
                            published.build_duration_ms
                        );
                        RefreshOutcome::Published {
                            generation,
                            validators,
                            duration_ms: published.build_duration_ms,
                        }
                    }
                    Err(RefreshError::Superseded { generation, current }) => {
                        tracing::info!(
                            "[REFRESH] generation {} arrived after {}; discarded",
                            generation,
                            current
                        );
                        RefreshOutcome::Superseded { generation, current }
                    }
                    Err(err) => self.degrade(generation, err.into()),
                }
            }
            Err(err) => self.degrade(generation, err),
        }
    }

    fn degrade(&self, generation: u64, err: StakeError) -> RefreshOutcome {
        let reason = err.to_string();
        self.store.mark_degraded(reason.clone());
        let serving = self.store.snapshot().map(|s| s.generation);
        match serving {
            Some(live) => tracing::error!(
                "[REFRESH] generation {} failed: {}; serving generation {}",
                generation,
                reason,
                live
            ),
            None => tracing::error!(
                "[REFRESH] generation {} failed: {}; no snapshot available yet",
                generation,
                reason
            ),
        }
        RefreshOutcome::Degraded {
            generation,
            reason,
            serving_generation: serving,
        }
    }

    async fn build(&self, generation: u64, started: Instant) -> Result<NetworkSnapshot, StakeError> {
        self.store.set_phase(ControllerPhase::Scanning);
        let head = self
            .scanner
            .head_block()
            .await
            .map_err(|e| RefreshError::HeadUnavailable(e.to_string()))?;
        let window = self.settings.scan_window(head);
        let ranges = chunk_range(window.from, window.to, self.settings.scan_chunk_blocks);
        let outcome = self
            .scanner
            .scan_chunks(
                Some(self.settings.staking_contract),
                &ranges,
                self.settings.range_timeout,
            )
            .await;
        tracing::info!(
            "[REFRESH] generation {} scanned blocks {}..{} in {} chunk(s): events={} failed_chunks={}",
            generation,
            window.from,
            window.to,
            ranges.len(),
            outcome.events.len(),
            outcome.failed_chunks
        );

        let mut candidates = extract_candidates(&outcome.events);
        if self.settings.include_tx_senders {
            enrich_with_senders(
                &self.scanner,
                &outcome.events,
                &mut candidates,
                self.settings.max_sender_lookups,
            )
            .await;
        }
        let candidate_count = candidates.len();
        let report = self.verifier.verify_all(&candidates.into_vec()).await;

        if report.accepted.len() < self.settings.sanity_min_validators {
            return Err(RefreshError::SanityCheck {
                found: report.accepted.len(),
                minimum: self.settings.sanity_min_validators,
            }
            .into());
        }

        self.store.set_phase(ControllerPhase::ExtractingMetadata);
        let addresses = report.accepted.iter().map(|v| v.address).collect::<Vec<_>>();
        let events = Arc::new(outcome.events);
        let metadata: HashMap<Address, ValidatorMetadata> = self
            .resolver
            .resolve_all(&addresses, Arc::clone(&events), head)
            .await
            .into_iter()
            .map(|(address, resolution)| (address, resolution.metadata))
            .collect();
        let self_delegations = self.self_delegations(&report.accepted, &metadata).await;

        self.store.set_phase(ControllerPhase::Formatting);
        let mut records = report
            .accepted
            .iter()
            .map(|v| ValidatorRecord {
                address: v.address,
                total_staked: TokenAmount::from_wei(v.probes.tokens),
                technique: v.technique,
                probes: v.probes,
                commission_bps: v.commission_bps,
                self_delegation: self_delegations
                    .get(&v.address)
                    .copied()
                    .unwrap_or(TokenAmount::ZERO),
                voting_power_pct: 0.0,
                active: false,
                metadata: metadata.get(&v.address).cloned(),
            })
            .collect::<Vec<_>>();
        let (total_active_stake, active_count) =
            rank_validators(&mut records, self.settings.active_set_size);
        let total_staked = records.iter().map(|r| r.total_staked).sum::<TokenAmount>();

        Ok(NetworkSnapshot {
            generation,
            total_staked,
            total_active_stake,
            active_count,
            inactive_count: records.len() - active_count,
            validators: records,
            scan: ScanProvenance {
                from_block: window.from,
                to_block: window.to,
                chunks: ranges.len(),
                failed_chunks: outcome.failed_chunks,
                events: events.len(),
                candidates: candidate_count,
                rejected: report.rejected.len(),
            },
            built_at_ms: unix_now_ms(),
            build_duration_ms: started.elapsed().as_millis().min(u64::MAX as u128) as u64,
        })
    }

    async fn self_delegations(
        &self,
        accepted: &[AcceptedValidator],
        metadata: &HashMap<Address, ValidatorMetadata>,
    ) -> HashMap<Address, TokenAmount> {
        let limit = self.settings.batch_size.max(1);
        let mut out = HashMap::new();
        let mut in_flight = JoinSet::new();
        let owned = accepted
            .iter()
            .filter_map(|v| Some((v.address, metadata.get(&v.address)?.owner?)));
        for (validator, owner) in owned {
            while in_flight.len() >= limit {
                if let Some(done) = in_flight.join_next().await {
                    collect_self_delegation(done, &mut out);
                }
            }
            let accountant = self.accountant.clone();
            in_flight.spawn(async move {
                let quote = accountant.compute_delegation(validator, owner).await;
                (validator, quote.amount)
            });
        }
        while let Some(done) = in_flight.join_next().await {
            collect_self_delegation(done, &mut out);
        }
        out
    }

    /// Refresh immediately, then on every interval tick until `shutdown` fires.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("[REFRESH] Shutdown signal received.");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.try_refresh().await;
                    }
                }
            }
        })
    }
}

fn collect_self_delegation(
    done: Result<(Address, TokenAmount), tokio::task::JoinError>,
    out: &mut HashMap<Address, TokenAmount>,
) {
    match done {
        Ok((addr, amount)) => {
            out.insert(addr, amount);
        }
        Err(err) => tracing::warn!("[REFRESH] self-delegation task aborted: {}", err),
    }
}
