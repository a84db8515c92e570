use crate::abi;
use crate::extractor::unique_tx_hashes;
use crate::scanner::{chunk_range, BlockRange, LogScanner, ReceiptDetails, TransactionDetails};
use crate::types::{TokenAmount, TransactionRecord, TxStatus, TxType};
use crate::utils::constants::UNDELEGATE_AMOUNT_OFFSET;
use crate::utils::hex::word_at;
use alloy::primitives::{Address, B256, U256};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::task::JoinSet;

/// Value/address heuristics applied when no selector matched.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRules {
    pub staking_contract: Address,
    pub delegation_contract: Address,
    pub create_validator_min_value: U256,
}

/// Selector map, then value heuristics, then receipt event override.
pub fn classify_transaction(
    tx: &TransactionDetails,
    receipt: Option<&ReceiptDetails>,
    rules: &ClassifyRules,
) -> TxType {
    let mut tx_type = abi::selector_of(&tx.input)
        .and_then(abi::classify_selector)
        .unwrap_or_else(|| {
            if tx.to == Some(rules.staking_contract)
                && tx.value >= rules.create_validator_min_value
                && !tx.value.is_zero()
            {
                TxType::CreateValidator
            } else if tx.to == Some(rules.delegation_contract) && !tx.value.is_zero() {
                TxType::Delegate
            } else {
                TxType::Others
            }
        });
    if let Some(receipt) = receipt {
        if let Some(from_event) = receipt
            .logs
            .iter()
            .filter_map(|log| log.topics.first())
            .find_map(abi::classify_event_topic)
        {
            tx_type = from_event;
        }
    }
    tx_type
}

/// The native value, except for undelegations whose amount lives in calldata.
pub fn transaction_amount(tx_type: TxType, tx: &TransactionDetails) -> U256 {
    if tx_type == TxType::Undelegate {
        if let Some(amount) = word_at(&tx.input, UNDELEGATE_AMOUNT_OFFSET) {
            return amount;
        }
    }
    tx.value
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub by_type: BTreeMap<TxType, usize>,
    pub by_status: BTreeMap<TxStatus, usize>,
}

impl HistorySummary {
    pub fn from_records(records: &[TransactionRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            *summary.by_type.entry(record.tx_type).or_default() += 1;
            *summary.by_status.entry(record.status).or_default() += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionHistory {
    pub validator: Address,
    pub transactions: Vec<TransactionRecord>,
    pub summary: HistorySummary,
    pub from_block: u64,
    pub to_block: u64,
    pub failed_chunks: usize,
    pub lookups_failed: usize,
}

pub struct HistoryScan<'a> {
    pub scanner: &'a LogScanner,
    pub rules: ClassifyRules,
    pub window_blocks: u64,
    pub chunk_blocks: u64,
    pub range_timeout: Duration,
    pub batch_size: usize,
}

type Lookup = (usize, Option<(TransactionDetails, ReceiptDetails)>);

async fn fetch_lookup(scanner: LogScanner, idx: usize, hash: B256) -> Lookup {
    let (tx, receipt) = tokio::join!(scanner.transaction(hash), scanner.receipt(hash));
    match (tx, receipt) {
        (Ok(Some(tx)), Ok(Some(receipt))) => (idx, Some((tx, receipt))),
        (tx, receipt) => {
            tracing::debug!(
                "[ANALYTICS] tx {:#x} incomplete: tx_ok={} receipt_ok={}",
                hash,
                matches!(tx, Ok(Some(_))),
                matches!(receipt, Ok(Some(_)))
            );
            (idx, None)
        }
    }
}

fn collect_lookup(done: Result<Lookup, tokio::task::JoinError>, fetched: &mut Vec<Lookup>) {
    match done {
        Ok(done) => fetched.push(done),
        Err(err) => tracing::warn!("[ANALYTICS] transaction lookup task aborted: {}", err),
    }
}

impl HistoryScan<'_> {
    pub async fn run(&self, validator: Address, head: u64) -> TransactionHistory {
        let window = BlockRange::recent(head, self.window_blocks);
        let ranges = chunk_range(window.from, window.to, self.chunk_blocks);
        let outcome = self
            .scanner
            .scan_chunks(Some(validator), &ranges, self.range_timeout)
            .await;
        let hashes = unique_tx_hashes(&outcome.events);

        let limit = self.batch_size.max(1);
        let mut fetched: Vec<Lookup> = Vec::with_capacity(hashes.len());
        let mut in_flight = JoinSet::new();
        for (idx, hash) in hashes.iter().copied().enumerate() {
            while in_flight.len() >= limit {
                if let Some(done) = in_flight.join_next().await {
                    collect_lookup(done, &mut fetched);
                }
            }
            in_flight.spawn(fetch_lookup(self.scanner.clone(), idx, hash));
        }
        while let Some(done) = in_flight.join_next().await {
            collect_lookup(done, &mut fetched);
        }
        fetched.sort_by_key(|(idx, _)| *idx);

        let mut lookups_failed = hashes.len().saturating_sub(fetched.len());
        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut transactions = Vec::with_capacity(fetched.len());
        for (_, item) in fetched {
            let Some((tx, receipt)) = item else {
                lookups_failed += 1;
                continue;
            };
            let block_number = receipt.block_number.or(tx.block_number).unwrap_or(0);
            let timestamp = match timestamps.get(&block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = self
                        .scanner
                        .block_timestamp(block_number)
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or(0);
                    timestamps.insert(block_number, ts);
                    ts
                }
            };
            let tx_type = classify_transaction(&tx, Some(&receipt), &self.rules);
            transactions.push(TransactionRecord {
                hash: tx.hash,
                tx_type,
                status: if receipt.success {
                    TxStatus::Success
                } else {
                    TxStatus::Failed
                },
                amount: TokenAmount::from_wei(transaction_amount(tx_type, &tx)),
                from: tx.from,
                to: tx.to,
                block_number,
                timestamp,
            });
        }
        transactions.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        let summary = HistorySummary::from_records(&transactions);
        tracing::info!(
            "[ANALYTICS] {:#x}: {} transaction(s) classified, {} lookup(s) failed",
            validator,
            transactions.len(),
            lookups_failed
        );

        TransactionHistory {
            validator,
            transactions,
            summary,
            from_block: window.from,
            to_block: window.to,
            failed_chunks: outcome.failed_chunks,
            lookups_failed,
        }
    }
}
