use crate::accountant::DelegationAccountant;
use crate::analytics::{
    Analytics, AnalyticsSettings, DelegatorAnalytics, TransactionHistory, WalletDelegations,
};
use crate::controller::{RefreshController, RefreshOutcome, RefreshSettings};
use crate::error::{RefreshError, Result, StakeError};
use crate::metadata::{MetadataResolver, ResolverSettings};
use crate::scanner::{LogScanner, ScanPolicies};
use crate::storage::SnapshotStore;
use crate::types::{NetworkSnapshot, SnapshotStatus};
use crate::utils::config::Config;
use crate::utils::hex::parse_strict_address;
use crate::utils::rpc::{build_endpoint_pool, EndpointPool, HttpTransport};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const STALE_AFTER_INTERVALS: u32 = 3;

/// Entry point for everything the process exposes: snapshot reads, status,
/// manual refresh and the on-demand analytics.
#[derive(Clone)]
pub struct StakeIndex {
    store: Arc<SnapshotStore>,
    controller: Arc<RefreshController>,
    analytics: Analytics,
}

impl StakeIndex {
    /// Connect HTTP transports for every configured endpoint.
    pub fn connect(config: &Config) -> Result<Self> {
        let primary = build_endpoint_pool(&config.primary_rpc, &config.fallback_rpcs)?;
        let mut officials = Vec::with_capacity(config.official_rpcs.len());
        for endpoint in &config.official_rpcs {
            match HttpTransport::connect(endpoint.clone()) {
                Ok(transport) => {
                    officials.push((endpoint.name.clone(), EndpointPool::single(Arc::new(transport))))
                }
                Err(err) => tracing::warn!("[STARTUP] Ignoring official endpoint: {}", err),
            }
        }
        Ok(Self::from_pools(config, primary, officials))
    }

    /// Wire the pipeline over pre-built pools.
    pub fn from_pools(
        config: &Config,
        primary: EndpointPool,
        officials: Vec<(String, EndpointPool)>,
    ) -> Self {
        let policies = ScanPolicies::from_config(config);
        let scanner = LogScanner::new(primary, policies);
        let store = Arc::new(SnapshotStore::new(
            config.refresh_interval * STALE_AFTER_INTERVALS,
        ));

        let verifier = crate::verifier::ValidatorVerifier::new(
            scanner.clone(),
            crate::verifier::VerifierSettings::from_config(config),
        );
        let accountant = DelegationAccountant::new(scanner.clone(), config.probe_timeout);
        let official_scanners = officials
            .into_iter()
            .map(|(name, pool)| (name, LogScanner::new(pool, policies)))
            .collect();
        let resolver = MetadataResolver::new(
            scanner.clone(),
            official_scanners,
            Arc::clone(&store),
            ResolverSettings::from_config(config),
        );
        let controller = Arc::new(RefreshController::new(
            scanner.clone(),
            verifier,
            accountant.clone(),
            resolver,
            Arc::clone(&store),
            RefreshSettings::from_config(config),
        ));
        let analytics = Analytics::new(scanner, accountant, AnalyticsSettings::from_config(config));

        Self {
            store,
            controller,
            analytics,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// The last published snapshot, or `NotReady` before the first success.
    pub fn snapshot(&self) -> Result<Arc<NetworkSnapshot>> {
        if let Some(snapshot) = self.store.snapshot() {
            return Ok(snapshot);
        }
        let status = self.store.status();
        Err(StakeError::NotReady(match status.last_error {
            Some(err) => format!("no snapshot published yet; last refresh failed: {err}"),
            None => format!("no snapshot published yet (phase: {})", status.phase.as_str()),
        }))
    }

    pub fn status(&self) -> SnapshotStatus {
        self.store.status()
    }

    /// Run a cycle now (after any in-flight one) and report what happened to it.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.controller.refresh_now().await
    }

    /// Run a cycle now and return the snapshot it leaves live. A failed cycle
    /// is an error even when an older snapshot is still being served.
    pub async fn refresh_now(&self) -> Result<Arc<NetworkSnapshot>> {
        match self.refresh().await {
            RefreshOutcome::Degraded {
                reason,
                serving_generation: Some(serving),
                ..
            } => Err(RefreshError::Degraded { reason, serving }.into()),
            RefreshOutcome::Degraded {
                reason,
                serving_generation: None,
                ..
            } => Err(StakeError::NotReady(format!(
                "no snapshot published yet; last refresh failed: {reason}"
            ))),
            RefreshOutcome::Published { .. }
            | RefreshOutcome::Superseded { .. }
            | RefreshOutcome::Skipped => self.snapshot(),
        }
    }

    pub fn spawn_refresh_loop(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        Arc::clone(&self.controller).spawn_refresh_loop(shutdown)
    }

    pub async fn delegator_analytics(&self, validator: &str) -> Result<DelegatorAnalytics> {
        let validator = parse_strict_address(validator)?;
        let snapshot = self.store.snapshot();
        Ok(self
            .analytics
            .delegator_analytics(validator, snapshot.as_deref())
            .await?)
    }

    pub async fn transaction_history(&self, validator: &str) -> Result<TransactionHistory> {
        let validator = parse_strict_address(validator)?;
        Ok(self.analytics.transaction_history(validator).await?)
    }

    pub async fn wallet_delegations(&self, wallet: &str) -> Result<WalletDelegations> {
        let wallet = parse_strict_address(wallet)?;
        let snapshot = self.snapshot()?;
        Ok(self.analytics.wallet_delegations(wallet, &snapshot).await)
    }
}
