//! On-demand analytics over a single validator or wallet. These read the
//! published snapshot but never take the refresh lock or mutate shared state.

pub mod delegators;
pub mod stats;
pub mod transactions;

use crate::accountant::DelegationAccountant;
use crate::error::RpcError;
use crate::scanner::LogScanner;
use crate::types::{NetworkSnapshot, TokenAmount};
use crate::utils::config::Config;
use alloy::primitives::{Address, U256};
use std::time::Duration;

pub use delegators::{DelegatorAnalytics, WalletDelegations, WalletPosition};
pub use stats::{ConcentrationLabel, DelegatorStats};
pub use transactions::{ClassifyRules, HistorySummary, TransactionHistory};

#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub window_blocks: u64,
    pub chunk_blocks: u64,
    pub range_timeout: Duration,
    pub max_sender_lookups: usize,
    pub batch_size: usize,
    pub known_delegators: Vec<Address>,
    pub rules: ClassifyRules,
}

impl AnalyticsSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_blocks: config.analytics_window_blocks,
            chunk_blocks: config.analytics_chunk_blocks,
            range_timeout: config.range_timeout,
            max_sender_lookups: config.max_sender_lookups,
            batch_size: config.probe_batch_size.max(1),
            known_delegators: config.known_delegators.clone(),
            rules: ClassifyRules {
                staking_contract: config.staking_contract,
                delegation_contract: config.delegation_contract,
                create_validator_min_value: config.create_validator_min_value_wei,
            },
        }
    }
}

#[derive(Clone)]
pub struct Analytics {
    scanner: LogScanner,
    accountant: DelegationAccountant,
    settings: AnalyticsSettings,
}

impl Analytics {
    pub fn new(scanner: LogScanner, accountant: DelegationAccountant, settings: AnalyticsSettings) -> Self {
        Self {
            scanner,
            accountant,
            settings,
        }
    }

    /// Configured addresses plus validator owners recorded in `snapshot`.
    fn known_addresses(&self, snapshot: Option<&NetworkSnapshot>) -> Vec<Address> {
        let mut known = self.settings.known_delegators.clone();
        if let Some(snapshot) = snapshot {
            for owner in snapshot.known_owners() {
                if !known.contains(&owner) {
                    known.push(owner);
                }
            }
        }
        known
    }

    pub async fn delegator_analytics(
        &self,
        validator: Address,
        snapshot: Option<&NetworkSnapshot>,
    ) -> Result<DelegatorAnalytics, RpcError> {
        let head = self.scanner.head_block().await?;
        let known = self.known_addresses(snapshot);
        let discovery = delegators::DelegatorDiscovery {
            scanner: &self.scanner,
            accountant: &self.accountant,
            window_blocks: self.settings.window_blocks,
            chunk_blocks: self.settings.chunk_blocks,
            range_timeout: self.settings.range_timeout,
            max_sender_lookups: self.settings.max_sender_lookups,
            batch_size: self.settings.batch_size,
        };
        Ok(discovery.run(validator, head, &known).await)
    }

    pub async fn transaction_history(&self, validator: Address) -> Result<TransactionHistory, RpcError> {
        let head = self.scanner.head_block().await?;
        let scan = transactions::HistoryScan {
            scanner: &self.scanner,
            rules: self.settings.rules,
            window_blocks: self.settings.window_blocks,
            chunk_blocks: self.settings.chunk_blocks,
            range_timeout: self.settings.range_timeout,
            batch_size: self.settings.batch_size,
        };
        Ok(scan.run(validator, head).await)
    }

    /// Quote `wallet` against every validator of `snapshot`.
    pub async fn wallet_delegations(&self, wallet: Address, snapshot: &NetworkSnapshot) -> WalletDelegations {
        let pairs = snapshot
            .validators
            .iter()
            .map(|v| (v.address, wallet))
            .collect::<Vec<_>>();
        let quotes = delegators::quote_all(&self.accountant, pairs, self.settings.batch_size).await;
        let total = quotes
            .iter()
            .fold(U256::ZERO, |acc, q| acc.saturating_add(q.amount.wei()));
        let mut positions = quotes
            .iter()
            .filter(|q| q.is_positive())
            .map(|q| WalletPosition {
                validator: q.validator,
                moniker: snapshot
                    .validator(&q.validator)
                    .and_then(|v| v.metadata.as_ref())
                    .map(|m| m.moniker.clone()),
                shares: q.shares,
                amount: q.amount,
                percentage: crate::types::share_pct(q.amount.wei(), total),
            })
            .collect::<Vec<_>>();
        positions.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.validator.cmp(&b.validator))
        });
        tracing::info!(
            "[ANALYTICS] wallet {:#x}: {} position(s) across {} validator(s)",
            wallet,
            positions.len(),
            quotes.len()
        );
        WalletDelegations {
            wallet,
            positions,
            total: TokenAmount::from_wei(total),
            validators_checked: quotes.len(),
        }
    }
}
