use crate::error::RpcError;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::Http;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Duration};

pub type HttpProvider = RootProvider<Http<Client>>;

const RPC_ERR_MAX_LEN: usize = 260;
const DEFAULT_RATE_LIMIT_COOLDOWN_MS: u64 = 15_000;
const RATE_LIMIT_COOLDOWN_CAP_MS: u64 = 120_000;
const COOLDOWN_POLL_MS: u64 = 250;

/// One JSON-RPC endpoint. Immutable process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub url: String,
    pub name: String,
    /// Ceiling for any single call; call-class policies may be shorter.
    pub timeout: Duration,
}

impl RpcEndpoint {
    pub fn new(url: impl Into<String>, name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            timeout,
        }
    }

    /// Display name derived from the URL host when none is configured.
    pub fn from_url(url: &str, timeout: Duration) -> Self {
        let name = url
            .parse::<reqwest::Url>()
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Self::new(url, name, timeout)
    }
}

/// Retry behaviour for one class of RPC call (cheap probe, heavy range scan, lookup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Contract capability probes: short timeout, one retry.
    pub fn probe(timeout: Duration) -> Self {
        Self {
            max_attempts: 2,
            base_backoff_ms: 100,
            max_backoff_ms: 800,
            timeout,
        }
    }

    /// Range scans are never retried in place; a failed range is reported empty.
    pub fn range_scan(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            timeout,
        }
    }

    /// Transaction/receipt/block lookups.
    pub fn lookup(timeout: Duration) -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 150,
            max_backoff_ms: 1_800,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        bounded_exponential_backoff_ms(
            self.base_backoff_ms,
            attempt.saturating_sub(1).min(u32::MAX as usize) as u32,
            self.max_backoff_ms,
        )
    }
}

pub fn bounded_exponential_backoff_ms(base_ms: u64, streak: u32, cap_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    let clamped = streak.min(8);
    base_ms
        .saturating_mul(1u64 << clamped)
        .min(cap_ms.max(base_ms))
}

pub fn is_retryable_rpc_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    let non_retryable = [
        "method not found",
        "-32601",
        "invalid params",
        "-32602",
        "execution reverted",
        "revert",
        "invalid opcode",
        "parse error",
        "-32700",
    ];
    !non_retryable.iter().any(|needle| msg.contains(needle))
}

pub fn is_rate_limited_rpc_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("request limit")
        || msg.contains("compute units per second")
}

/// Providers that reject a log range as too large are not worth retrying either.
pub fn is_range_too_large_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("block range")
        || msg.contains("range too large")
        || msg.contains("query returned more than")
        || msg.contains("exceed maximum block range")
}

pub fn parse_retry_after_ms(message: &str) -> Option<u64> {
    let msg = message.to_ascii_lowercase();
    let start = msg
        .find("retry-after")
        .or_else(|| msg.find("retry after"))?;
    let tail = &msg[start..];
    let digits_start = tail.find(|c: char| c.is_ascii_digit())?;
    let digits: String = tail[digits_start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let value: u64 = digits.parse().ok()?;
    let unit = tail[digits_start + digits.len()..].trim_start();
    if unit.starts_with("ms") || unit.starts_with("milli") {
        return Some(value);
    }
    Some(value.saturating_mul(1_000))
}

/// Single-line, bounded rendering of provider errors (bodies can be huge).
pub fn compact_rpc_error(message: &str) -> String {
    let head = message
        .split("Stack backtrace:")
        .next()
        .unwrap_or(message)
        .split(" text: ")
        .next()
        .unwrap_or(message);
    let mut compact = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.len() > RPC_ERR_MAX_LEN {
        let mut cut = RPC_ERR_MAX_LEN;
        while !compact.is_char_boundary(cut) {
            cut -= 1;
        }
        compact.truncate(cut);
        compact.push_str("...(truncated)");
    }
    compact
}

/// Raw JSON-RPC surface. The HTTP implementation wraps an alloy provider;
/// tests substitute a scripted chain.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    fn endpoint(&self) -> &RpcEndpoint;
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

pub struct HttpTransport {
    endpoint: RpcEndpoint,
    provider: HttpProvider,
}

impl HttpTransport {
    pub fn connect(endpoint: RpcEndpoint) -> Result<Self, RpcError> {
        let parsed = endpoint
            .url
            .trim()
            .parse::<reqwest::Url>()
            .map_err(|err| RpcError::InvalidUrl {
                url: endpoint.url.clone(),
                reason: err.to_string(),
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RpcError::InvalidUrl {
                url: endpoint.url.clone(),
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }
        let provider = ProviderBuilder::new().on_http(parsed);
        Ok(Self { endpoint, provider })
    }
}

#[async_trait]
impl JsonRpcTransport for HttpTransport {
    fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.provider
            .raw_request::<Value, Value>(Cow::Owned(method.to_string()), params)
            .await
            .map_err(|err| RpcError::Transport {
                endpoint: self.endpoint.name.clone(),
                message: compact_rpc_error(&err.to_string()),
            })
    }
}

struct RpcClientInner {
    transport: Arc<dyn JsonRpcTransport>,
    lane: Semaphore,
    epoch: Instant,
    cooldown_until_ms: AtomicU64,
    rate_limit_streak: AtomicU64,
    latency_ewma_ms: AtomicU64,
}

/// One endpoint plus its retry state: rate-limit cooldown, latency estimate,
/// and a single-permit lane that serializes heavy range scans.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<RpcClientInner>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn JsonRpcTransport>) -> Self {
        Self {
            inner: Arc::new(RpcClientInner {
                transport,
                lane: Semaphore::new(1),
                epoch: Instant::now(),
                cooldown_until_ms: AtomicU64::new(0),
                rate_limit_streak: AtomicU64::new(0),
                latency_ewma_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        self.inner.transport.endpoint()
    }

    pub fn name(&self) -> &str {
        &self.endpoint().name
    }

    fn elapsed_ms(&self) -> u64 {
        self.inner.epoch.elapsed().as_millis().min(u64::MAX as u128) as u64
    }

    pub fn cooldown_remaining_ms(&self) -> u64 {
        self.inner
            .cooldown_until_ms
            .load(Ordering::Relaxed)
            .saturating_sub(self.elapsed_ms())
    }

    pub fn latency_ewma_ms(&self) -> u64 {
        self.inner.latency_ewma_ms.load(Ordering::Relaxed)
    }

    fn observe_latency_ms(&self, sample_ms: u64) {
        let sample = sample_ms.clamp(1, 60_000);
        let slot = &self.inner.latency_ewma_ms;
        let mut prev = slot.load(Ordering::Relaxed);
        loop {
            let next = if prev == 0 {
                sample
            } else {
                prev.saturating_mul(3).saturating_add(sample) / 4
            };
            match slot.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => prev = actual,
            }
        }
    }

    fn arm_cooldown(&self, hint_ms: Option<u64>) {
        let streak = self
            .inner
            .rate_limit_streak
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        let computed = bounded_exponential_backoff_ms(
            DEFAULT_RATE_LIMIT_COOLDOWN_MS,
            streak.saturating_sub(1).min(u32::MAX as u64) as u32,
            RATE_LIMIT_COOLDOWN_CAP_MS,
        );
        let until = self
            .elapsed_ms()
            .saturating_add(computed.max(hint_ms.unwrap_or(0)));
        self.inner
            .cooldown_until_ms
            .fetch_max(until, Ordering::Relaxed);
    }

    async fn await_cooldown(&self) {
        loop {
            let remaining = self.cooldown_remaining_ms();
            if remaining == 0 {
                return;
            }
            sleep(Duration::from_millis(remaining.min(COOLDOWN_POLL_MS))).await;
        }
    }

    /// Issue one JSON-RPC call under `policy`.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        policy: &RetryPolicy,
    ) -> Result<Value, RpcError> {
        let attempts = policy.max_attempts.max(1);
        let call_timeout = policy.timeout.min(self.endpoint().timeout);
        let call_timeout_ms = call_timeout.as_millis().min(u64::MAX as u128) as u64;
        let mut attempt = 1usize;
        loop {
            self.await_cooldown().await;
            let started = Instant::now();
            let outcome = timeout(
                call_timeout,
                self.inner.transport.request(method, params.clone()),
            )
            .await;
            let elapsed = started.elapsed().as_millis().min(u64::MAX as u128) as u64;

            let err = match outcome {
                Ok(Ok(value)) => {
                    self.observe_latency_ms(elapsed);
                    self.inner.rate_limit_streak.store(0, Ordering::Relaxed);
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    self.observe_latency_ms(elapsed);
                    let message = err.to_string();
                    if is_rate_limited_rpc_error(&message) {
                        self.arm_cooldown(parse_retry_after_ms(&message));
                    }
                    if !is_retryable_rpc_error(&message) || is_range_too_large_error(&message) {
                        return Err(err);
                    }
                    err
                }
                Err(_) => {
                    self.observe_latency_ms(call_timeout_ms);
                    RpcError::Timeout {
                        endpoint: self.name().to_string(),
                        method: method.to_string(),
                        timeout_ms: call_timeout_ms,
                    }
                }
            };

            if attempt >= attempts {
                return Err(err);
            }
            tracing::debug!(
                "[RPC] {} on {} failed (attempt {}/{}): {}",
                method,
                self.name(),
                attempt,
                attempts,
                err
            );
            sleep(Duration::from_millis(policy.backoff_ms(attempt))).await;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Same as [`RpcClient::request`] but holds the endpoint's scan lane, so at
    /// most one heavy call is in flight per endpoint.
    pub async fn request_in_lane(
        &self,
        method: &str,
        params: Value,
        policy: &RetryPolicy,
    ) -> Result<Value, RpcError> {
        let _permit = self
            .inner
            .lane
            .acquire()
            .await
            .map_err(|err| RpcError::Transport {
                endpoint: self.name().to_string(),
                message: format!("scan lane closed: {err}"),
            })?;
        self.request(method, params, policy).await
    }
}

/// Primary endpoint plus ordered fallbacks.
#[derive(Clone)]
pub struct EndpointPool {
    clients: Arc<Vec<RpcClient>>,
    cursor: Arc<AtomicUsize>,
}

impl EndpointPool {
    pub fn from_transports(transports: Vec<Arc<dyn JsonRpcTransport>>) -> Self {
        let clients = transports.into_iter().map(RpcClient::new).collect();
        Self {
            clients: Arc::new(clients),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn single(transport: Arc<dyn JsonRpcTransport>) -> Self {
        Self::from_transports(vec![transport])
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clients(&self) -> &[RpcClient] {
        &self.clients
    }

    pub fn primary(&self) -> Option<&RpcClient> {
        self.clients.first()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    /// Prefer endpoints out of cooldown, then unsampled ones, then the lowest
    /// latency estimate. When everything is cooling down, the soonest to reopen.
    pub fn pick_ready(&self) -> Option<RpcClient> {
        let n = self.clients.len();
        if n == 0 {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut best: Option<(usize, u64)> = None;
        for offset in 0..n {
            let idx = start.wrapping_add(offset) % n;
            let client = &self.clients[idx];
            if client.cooldown_remaining_ms() > 0 {
                continue;
            }
            let ewma = client.latency_ewma_ms();
            if ewma == 0 {
                return Some(client.clone());
            }
            if best.map_or(true, |(_, score)| ewma < score) {
                best = Some((idx, ewma));
            }
        }
        if let Some((idx, _)) = best {
            return Some(self.clients[idx].clone());
        }
        self.clients
            .iter()
            .min_by_key(|c| c.cooldown_remaining_ms())
            .cloned()
    }

    pub async fn request(
        &self,
        method: &str,
        params: Value,
        policy: &RetryPolicy,
    ) -> Result<Value, RpcError> {
        let client = self.pick_ready().ok_or_else(|| RpcError::Transport {
            endpoint: "<none>".to_string(),
            message: "endpoint pool is empty".to_string(),
        })?;
        client.request(method, params, policy).await
    }
}

/// Connect the primary endpoint and every valid fallback. Invalid fallbacks are
/// skipped with a warning; an invalid primary is an error.
pub fn build_endpoint_pool(
    primary: &RpcEndpoint,
    fallbacks: &[RpcEndpoint],
) -> Result<EndpointPool, RpcError> {
    let mut transports: Vec<Arc<dyn JsonRpcTransport>> = Vec::with_capacity(1 + fallbacks.len());
    transports.push(Arc::new(HttpTransport::connect(primary.clone())?));
    for endpoint in fallbacks {
        if endpoint.url == primary.url {
            continue;
        }
        match HttpTransport::connect(endpoint.clone()) {
            Ok(transport) => transports.push(Arc::new(transport)),
            Err(err) => tracing::warn!("[RPC] Ignoring fallback endpoint: {}", err),
        }
    }
    Ok(EndpointPool::from_transports(transports))
}
