use crate::error::RpcError;
use crate::utils::config::Config;
use crate::utils::hex::{
    block_tag, field_address, field_b256, field_bytes, quantity_u256, quantity_u64,
};
use crate::utils::rpc::{EndpointPool, RetryPolicy, RpcClient};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

const SCAN_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// One `eth_getLogs` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub tx_hash: Option<B256>,
    pub block_number: u64,
}

impl LogEvent {
    pub fn from_rpc(value: &Value) -> Option<Self> {
        let address = field_address(value, "address")?;
        let topics = value
            .get("topics")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| t.as_str().and_then(|s| B256::from_str(s.trim()).ok()))
                    .collect()
            })
            .unwrap_or_default();
        let data = field_bytes(value, "data").unwrap_or_default();
        let tx_hash = field_b256(value, "transactionHash");
        let block_number = value.get("blockNumber").and_then(quantity_u64).unwrap_or(0);
        Some(Self {
            address,
            topics,
            data,
            tx_hash,
            block_number,
        })
    }
}

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// The last `window` blocks ending at `head`.
    pub fn recent(head: u64, window: u64) -> Self {
        Self {
            from: head.saturating_sub(window.saturating_sub(1)),
            to: head,
        }
    }

    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `[from, to]` into contiguous, non-overlapping chunks of at most `chunk` blocks.
pub fn chunk_range(from: u64, to: u64, chunk: u64) -> Vec<BlockRange> {
    if to < from {
        return Vec::new();
    }
    let chunk = chunk.max(1);
    let mut out = Vec::new();
    let mut start = from;
    loop {
        let end = start.saturating_add(chunk - 1).min(to);
        out.push(BlockRange::new(start, end));
        if end == to {
            break;
        }
        start = end + 1;
    }
    out
}

/// Retry policy per call class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicies {
    pub range: RetryPolicy,
    pub probe: RetryPolicy,
    pub lookup: RetryPolicy,
}

impl ScanPolicies {
    pub fn from_config(config: &Config) -> Self {
        Self {
            range: RetryPolicy::range_scan(config.range_timeout),
            probe: RetryPolicy::probe(config.probe_timeout),
            lookup: RetryPolicy::lookup(config.lookup_timeout),
        }
    }
}

impl Default for ScanPolicies {
    fn default() -> Self {
        use crate::utils::config::{
            DEFAULT_LOOKUP_TIMEOUT_MS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_RANGE_TIMEOUT_MS,
        };
        Self {
            range: RetryPolicy::range_scan(Duration::from_millis(DEFAULT_RANGE_TIMEOUT_MS)),
            probe: RetryPolicy::probe(Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS)),
            lookup: RetryPolicy::lookup(Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub events: Vec<LogEvent>,
    pub ok_chunks: usize,
    pub failed_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetails {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    pub block_number: Option<u64>,
}

impl TransactionDetails {
    fn from_rpc(hash: B256, value: &Value) -> Option<Self> {
        let from = field_address(value, "from")?;
        let to = field_address(value, "to");
        let input = field_bytes(value, "input")
            .or_else(|| field_bytes(value, "data"))
            .unwrap_or_default();
        let amount = value.get("value").and_then(quantity_u256).unwrap_or(U256::ZERO);
        let block_number = value.get("blockNumber").and_then(quantity_u64);
        Some(Self {
            hash,
            from,
            to,
            input,
            value: amount,
            block_number,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptDetails {
    pub success: bool,
    pub logs: Vec<LogEvent>,
    pub block_number: Option<u64>,
}

impl ReceiptDetails {
    fn from_rpc(value: &Value) -> Self {
        // Pre-Byzantium receipts carry no status; treat them as successful.
        let success = value
            .get("status")
            .and_then(quantity_u64)
            .map(|s| s == 1)
            .unwrap_or(true);
        let logs = value
            .get("logs")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(LogEvent::from_rpc).collect())
            .unwrap_or_default();
        Self {
            success,
            logs,
            block_number: value.get("blockNumber").and_then(quantity_u64),
        }
    }
}

struct WarnThrottle {
    last_log: Option<Instant>,
    suppressed: u64,
}

/// Rate-limited warn logging so a flapping endpoint does not flood the log.
#[derive(Clone)]
struct ScanWarnings {
    state: Arc<Mutex<WarnThrottle>>,
}

impl ScanWarnings {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WarnThrottle {
                last_log: None,
                suppressed: 0,
            })),
        }
    }

    fn warn(&self, message: String) {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let now = Instant::now();
        let due = guard
            .last_log
            .map_or(true, |last| now.duration_since(last) >= SCAN_WARN_INTERVAL);
        if !due {
            guard.suppressed = guard.suppressed.saturating_add(1);
            return;
        }
        if guard.suppressed > 0 {
            tracing::warn!(
                "{} ({} similar scanner warning(s) suppressed)",
                message,
                guard.suppressed
            );
            guard.suppressed = 0;
        } else {
            tracing::warn!("{}", message);
        }
        guard.last_log = Some(now);
    }
}

fn decode_err(method: &str, reason: impl Into<String>) -> RpcError {
    RpcError::Decode {
        method: method.to_string(),
        reason: reason.into(),
    }
}

/// Thin, stateless facade over the endpoint pool. Range failures degrade to
/// empty results; point lookups surface `RpcError` to the caller.
#[derive(Clone)]
pub struct LogScanner {
    pool: EndpointPool,
    policies: ScanPolicies,
    warnings: ScanWarnings,
}

impl LogScanner {
    pub fn new(pool: EndpointPool, policies: ScanPolicies) -> Self {
        Self {
            pool,
            policies,
            warnings: ScanWarnings::new(),
        }
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn policies(&self) -> &ScanPolicies {
        &self.policies
    }

    pub async fn head_block(&self) -> Result<u64, RpcError> {
        let raw = self
            .pool
            .request("eth_blockNumber", json!([]), &self.policies.lookup)
            .await?;
        quantity_u64(&raw).ok_or_else(|| decode_err("eth_blockNumber", format!("not a quantity: {raw}")))
    }

    fn logs_params(contract: Option<Address>, range: BlockRange) -> Value {
        let mut filter = json!({
            "fromBlock": block_tag(range.from),
            "toBlock": block_tag(range.to),
        });
        if let Some(address) = contract {
            filter["address"] = Value::String(format!("{address:#x}"));
        }
        json!([filter])
    }

    async fn scan_range_on(
        client: &RpcClient,
        warnings: &ScanWarnings,
        policy: RetryPolicy,
        contract: Option<Address>,
        range: BlockRange,
    ) -> Option<Vec<LogEvent>> {
        let params = Self::logs_params(contract, range);
        match client.request_in_lane("eth_getLogs", params, &policy).await {
            Ok(Value::Array(items)) => {
                let mut events = items.iter().filter_map(LogEvent::from_rpc).collect::<Vec<_>>();
                events.sort_by_key(|e| e.block_number);
                Some(events)
            }
            Ok(other) => {
                warnings.warn(format!(
                    "[SCAN] eth_getLogs {}..{} on {} returned non-array payload: {}",
                    range.from,
                    range.to,
                    client.name(),
                    crate::utils::rpc::compact_rpc_error(&other.to_string())
                ));
                None
            }
            Err(err) => {
                warnings.warn(format!(
                    "[SCAN] eth_getLogs {}..{} on {} failed: {}",
                    range.from,
                    range.to,
                    client.name(),
                    err
                ));
                None
            }
        }
    }

    /// One `eth_getLogs` for `range`. Failure yields an empty list.
    pub async fn scan_range(
        &self,
        contract: Option<Address>,
        range: BlockRange,
        timeout: Duration,
    ) -> Vec<LogEvent> {
        let Some(client) = self.pool.pick_ready() else {
            return Vec::new();
        };
        let policy = self.policies.range.with_timeout(timeout);
        Self::scan_range_on(&client, &self.warnings, policy, contract, range)
            .await
            .unwrap_or_default()
    }

    /// Scan pre-chunked ranges, spread round-robin over the pool's endpoints.
    /// Each endpoint serves one range at a time.
    pub async fn scan_chunks(
        &self,
        contract: Option<Address>,
        ranges: &[BlockRange],
        timeout: Duration,
    ) -> ScanOutcome {
        let clients = self.pool.clients();
        if clients.is_empty() || ranges.is_empty() {
            return ScanOutcome::default();
        }
        let policy = self.policies.range.with_timeout(timeout);
        let mut in_flight = JoinSet::new();
        for (idx, range) in ranges.iter().copied().enumerate() {
            let client = clients[idx % clients.len()].clone();
            let warnings = self.warnings.clone();
            in_flight.spawn(async move {
                let events =
                    Self::scan_range_on(&client, &warnings, policy, contract, range).await;
                (idx, events)
            });
        }

        let mut per_chunk: Vec<(usize, Vec<LogEvent>)> = Vec::with_capacity(ranges.len());
        let mut outcome = ScanOutcome::default();
        while let Some(done) = in_flight.join_next().await {
            match done {
                Ok((idx, Some(events))) => {
                    outcome.ok_chunks += 1;
                    per_chunk.push((idx, events));
                }
                Ok((_, None)) => outcome.failed_chunks += 1,
                Err(err) => {
                    outcome.failed_chunks += 1;
                    tracing::warn!("[SCAN] range task aborted: {}", err);
                }
            }
        }
        per_chunk.sort_by_key(|(idx, _)| *idx);
        outcome.events = per_chunk.into_iter().flat_map(|(_, events)| events).collect();
        // Stable: equal block numbers keep chunk order.
        outcome.events.sort_by_key(|e| e.block_number);
        tracing::debug!(
            "[SCAN] {} range(s): ok={} failed={} events={}",
            ranges.len(),
            outcome.ok_chunks,
            outcome.failed_chunks,
            outcome.events.len()
        );
        outcome
    }

    /// `eth_call` at `latest`, retried per the probe policy.
    pub async fn call(
        &self,
        contract: Address,
        input: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, RpcError> {
        let params = json!([
            {
                "to": format!("{contract:#x}"),
                "data": format!("0x{}", hex::encode(&input)),
            },
            "latest"
        ]);
        let policy = self.policies.probe.with_timeout(timeout);
        let raw = self.pool.request("eth_call", params, &policy).await?;
        let text = raw
            .as_str()
            .ok_or_else(|| decode_err("eth_call", "result is not a hex string"))?;
        Bytes::from_str(text.trim()).map_err(|e| decode_err("eth_call", e.to_string()))
    }

    pub async fn transaction(&self, hash: B256) -> Result<Option<TransactionDetails>, RpcError> {
        let raw = self
            .pool
            .request(
                "eth_getTransactionByHash",
                json!([format!("{hash:#x}")]),
                &self.policies.lookup,
            )
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        TransactionDetails::from_rpc(hash, &raw)
            .map(Some)
            .ok_or_else(|| decode_err("eth_getTransactionByHash", "missing sender"))
    }

    pub async fn receipt(&self, hash: B256) -> Result<Option<ReceiptDetails>, RpcError> {
        let raw = self
            .pool
            .request(
                "eth_getTransactionReceipt",
                json!([format!("{hash:#x}")]),
                &self.policies.lookup,
            )
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        Ok(Some(ReceiptDetails::from_rpc(&raw)))
    }

    pub async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, RpcError> {
        let raw = self
            .pool
            .request(
                "eth_getBlockByNumber",
                json!([block_tag(number), false]),
                &self.policies.lookup,
            )
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        raw.get("timestamp")
            .and_then(quantity_u64)
            .map(Some)
            .ok_or_else(|| decode_err("eth_getBlockByNumber", "missing timestamp"))
    }
}
