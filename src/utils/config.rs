use crate::error::ConfigError;
use crate::utils::constants::MIN_STAKE_FLOOR_WEI;
use crate::utils::hex::parse_strict_address;
use crate::utils::rpc::RpcEndpoint;
use alloy::primitives::{Address, U256};
use std::time::Duration;

pub const DEFAULT_SCAN_WINDOW_BLOCKS: u64 = 1_000_000;
pub const DEFAULT_SCAN_CHUNK_BLOCKS: u64 = 100_000;
pub const DEFAULT_MAX_SENDER_LOOKUPS: usize = 200;
pub const DEFAULT_SANITY_MIN_VALIDATORS: usize = 10;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PROBE_BATCH_SIZE: usize = 3;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_RANGE_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 8_000;
pub const DEFAULT_RPC_CALL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_ACTIVE_SET_SIZE: usize = 100;
pub const DEFAULT_METADATA_WINDOW_BLOCKS: u64 = 200_000;
pub const DEFAULT_OFFICIAL_METADATA_WINDOW_BLOCKS: u64 = 2_000_000;
pub const DEFAULT_ANALYTICS_WINDOW_BLOCKS: u64 = 500_000;
pub const DEFAULT_ANALYTICS_CHUNK_BLOCKS: u64 = 100_000;
/// 1 token: smaller transfers to the staking contract are not validator creations.
pub const DEFAULT_CREATE_VALIDATOR_MIN_VALUE_WEI: u128 = 1_000_000_000_000_000_000;
pub const DEFAULT_AVATAR_URL_TEMPLATE: &str =
    "https://api.dicebear.com/7.x/identicon/svg?seed={address}";

#[derive(Debug, Clone)]
pub struct Config {
    pub primary_rpc: RpcEndpoint,
    pub fallback_rpcs: Vec<RpcEndpoint>,
    /// Only consulted by the metadata resolver when the primary search comes up empty.
    pub official_rpcs: Vec<RpcEndpoint>,
    pub staking_contract: Address,
    pub delegation_contract: Address,
    /// Full-history scans start here; `None` means a bounded recent window.
    pub scan_start_block: Option<u64>,
    pub scan_window_blocks: u64,
    pub scan_chunk_blocks: u64,
    pub scan_include_tx_senders: bool,
    pub max_sender_lookups: usize,
    pub sanity_min_validators: usize,
    pub refresh_interval: Duration,
    pub probe_batch_size: usize,
    pub probe_timeout: Duration,
    pub range_timeout: Duration,
    pub lookup_timeout: Duration,
    pub min_stake_floor_wei: U256,
    pub active_set_size: usize,
    pub metadata_window_blocks: u64,
    pub official_metadata_window_blocks: u64,
    pub analytics_window_blocks: u64,
    pub analytics_chunk_blocks: u64,
    pub known_delegators: Vec<Address>,
    pub create_validator_min_value_wei: U256,
    pub avatar_url_template: String,
}

fn validate_http_url(name: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))),
    }
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

struct Lookup<F> {
    get: F,
}

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.get)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.raw(key)
            .ok_or_else(|| ConfigError::Missing(format!("{key} must be set")))
    }

    fn u64_in(&self, key: &str, default: u64, min: u64, max: u64) -> u64 {
        self.raw(key)
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|v| (min..=max).contains(v))
            .unwrap_or(default)
    }

    fn usize_in(&self, key: &str, default: usize, min: usize, max: usize) -> usize {
        self.raw(key)
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|v| (min..=max).contains(v))
            .unwrap_or(default)
    }

    fn wei(&self, key: &str, default: u128) -> Result<U256, ConfigError> {
        match self.raw(key) {
            None => Ok(U256::from(default)),
            Some(raw) => raw.parse::<U256>().map_err(|e| {
                ConfigError::Invalid(format!("{key} must be an integer wei amount, got `{raw}`: {e}"))
            }),
        }
    }

    fn address(&self, key: &str) -> Result<Address, ConfigError> {
        let raw = self.required(key)?;
        parse_strict_address(&raw)
            .map_err(|_| ConfigError::Invalid(format!("{key} must be a 0x-prefixed address, got `{raw}`")))
    }

    fn endpoints(&self, key: &str, timeout: Duration) -> Result<Vec<RpcEndpoint>, ConfigError> {
        let mut out = Vec::new();
        for url in split_list(self.raw(key)) {
            validate_http_url(&format!("{key} entry"), &url)?;
            out.push(RpcEndpoint::from_url(&url, timeout));
        }
        Ok(out)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `load` uses the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup { get };

        let lookup_timeout = Duration::from_millis(env.u64_in(
            "LOOKUP_TIMEOUT_MS",
            DEFAULT_LOOKUP_TIMEOUT_MS,
            100,
            120_000,
        ));
        let call_timeout = Duration::from_millis(env.u64_in(
            "RPC_CALL_TIMEOUT_MS",
            DEFAULT_RPC_CALL_TIMEOUT_MS,
            500,
            300_000,
        ));
        let primary_url = env.required("STAKESCOPE_RPC_URL")?;
        validate_http_url("STAKESCOPE_RPC_URL", &primary_url)?;
        let primary_rpc = RpcEndpoint::from_url(&primary_url, call_timeout);
        let fallback_rpcs = env
            .endpoints("STAKESCOPE_RPC_FALLBACK_URLS", call_timeout)?
            .into_iter()
            .filter(|ep| ep.url != primary_rpc.url)
            .collect();
        let official_rpcs = env.endpoints("STAKESCOPE_OFFICIAL_RPC_URLS", call_timeout)?;

        let staking_contract = env.address("STAKING_CONTRACT")?;
        let delegation_contract = env.address("DELEGATION_CONTRACT")?;

        let scan_start_block = match env.raw("SCAN_START_BLOCK") {
            None => None,
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!("SCAN_START_BLOCK must be a block number, got `{raw}`"))
            })?),
        };

        let mut known_delegators = Vec::new();
        for raw in split_list(env.raw("KNOWN_DELEGATOR_ADDRESSES")) {
            let addr = parse_strict_address(&raw).map_err(|_| {
                ConfigError::Invalid(format!(
                    "KNOWN_DELEGATOR_ADDRESSES entry must be a 0x-prefixed address, got `{raw}`"
                ))
            })?;
            if !known_delegators.contains(&addr) {
                known_delegators.push(addr);
            }
        }

        let avatar_url_template = env
            .raw("AVATAR_URL_TEMPLATE")
            .unwrap_or_else(|| DEFAULT_AVATAR_URL_TEMPLATE.to_string());
        if !avatar_url_template.contains("{address}") {
            return Err(ConfigError::Invalid(
                "AVATAR_URL_TEMPLATE must contain the `{address}` placeholder".to_string(),
            ));
        }

        Ok(Self {
            primary_rpc,
            fallback_rpcs,
            official_rpcs,
            staking_contract,
            delegation_contract,
            scan_start_block,
            scan_window_blocks: env.u64_in(
                "SCAN_WINDOW_BLOCKS",
                DEFAULT_SCAN_WINDOW_BLOCKS,
                1,
                u64::MAX,
            ),
            scan_chunk_blocks: env.u64_in(
                "SCAN_CHUNK_BLOCKS",
                DEFAULT_SCAN_CHUNK_BLOCKS,
                1,
                5_000_000,
            ),
            scan_include_tx_senders: env
                .raw("SCAN_INCLUDE_TX_SENDERS")
                .and_then(|raw| parse_bool_flag(&raw))
                .unwrap_or(true),
            max_sender_lookups: env.usize_in(
                "MAX_SENDER_LOOKUPS",
                DEFAULT_MAX_SENDER_LOOKUPS,
                0,
                100_000,
            ),
            sanity_min_validators: env.usize_in(
                "SANITY_MIN_VALIDATORS",
                DEFAULT_SANITY_MIN_VALIDATORS,
                0,
                100_000,
            ),
            refresh_interval: Duration::from_secs(env.u64_in(
                "REFRESH_INTERVAL_SECS",
                DEFAULT_REFRESH_INTERVAL_SECS,
                5,
                86_400,
            )),
            probe_batch_size: env.usize_in("PROBE_BATCH_SIZE", DEFAULT_PROBE_BATCH_SIZE, 1, 64),
            probe_timeout: Duration::from_millis(env.u64_in(
                "PROBE_TIMEOUT_MS",
                DEFAULT_PROBE_TIMEOUT_MS,
                100,
                60_000,
            )),
            range_timeout: Duration::from_millis(env.u64_in(
                "RANGE_TIMEOUT_MS",
                DEFAULT_RANGE_TIMEOUT_MS,
                500,
                300_000,
            )),
            lookup_timeout,
            min_stake_floor_wei: env.wei("MIN_STAKE_FLOOR_WEI", MIN_STAKE_FLOOR_WEI)?,
            active_set_size: env.usize_in("ACTIVE_SET_SIZE", DEFAULT_ACTIVE_SET_SIZE, 1, 10_000),
            metadata_window_blocks: env.u64_in(
                "METADATA_WINDOW_BLOCKS",
                DEFAULT_METADATA_WINDOW_BLOCKS,
                1,
                u64::MAX,
            ),
            official_metadata_window_blocks: env.u64_in(
                "OFFICIAL_METADATA_WINDOW_BLOCKS",
                DEFAULT_OFFICIAL_METADATA_WINDOW_BLOCKS,
                1,
                u64::MAX,
            ),
            analytics_window_blocks: env.u64_in(
                "ANALYTICS_WINDOW_BLOCKS",
                DEFAULT_ANALYTICS_WINDOW_BLOCKS,
                1,
                u64::MAX,
            ),
            analytics_chunk_blocks: env.u64_in(
                "ANALYTICS_CHUNK_BLOCKS",
                DEFAULT_ANALYTICS_CHUNK_BLOCKS,
                1,
                5_000_000,
            ),
            known_delegators,
            create_validator_min_value_wei: env.wei(
                "CREATE_VALIDATOR_MIN_VALUE_WEI",
                DEFAULT_CREATE_VALIDATOR_MIN_VALUE_WEI,
            )?,
            avatar_url_template,
        })
    }

    pub fn avatar_url(&self, address: &Address) -> String {
        self.avatar_url_template
            .replace("{address}", &format!("{address:#x}"))
    }

    /// Key/value rendering for `--explain-config` and startup logs.
    pub fn explain(&self) -> Vec<(&'static str, String)> {
        let names = |eps: &[RpcEndpoint]| {
            if eps.is_empty() {
                "-".to_string()
            } else {
                eps.iter().map(|e| e.name.clone()).collect::<Vec<_>>().join(",")
            }
        };
        vec![
            ("rpc.primary", self.primary_rpc.name.clone()),
            ("rpc.fallbacks", names(&self.fallback_rpcs)),
            ("rpc.official", names(&self.official_rpcs)),
            ("contract.staking", format!("{:#x}", self.staking_contract)),
            ("contract.delegation", format!("{:#x}", self.delegation_contract)),
            (
                "scan.start_block",
                self.scan_start_block
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "recent-window".to_string()),
            ),
            ("scan.window_blocks", self.scan_window_blocks.to_string()),
            ("scan.chunk_blocks", self.scan_chunk_blocks.to_string()),
            ("scan.include_tx_senders", self.scan_include_tx_senders.to_string()),
            ("scan.max_sender_lookups", self.max_sender_lookups.to_string()),
            ("refresh.sanity_min_validators", self.sanity_min_validators.to_string()),
            ("refresh.interval_secs", self.refresh_interval.as_secs().to_string()),
            ("probe.batch_size", self.probe_batch_size.to_string()),
            ("probe.timeout_ms", self.probe_timeout.as_millis().to_string()),
            ("range.timeout_ms", self.range_timeout.as_millis().to_string()),
            ("lookup.timeout_ms", self.lookup_timeout.as_millis().to_string()),
            ("rpc.call_timeout_ms", self.primary_rpc.timeout.as_millis().to_string()),
            ("verify.min_stake_floor_wei", self.min_stake_floor_wei.to_string()),
            ("snapshot.active_set_size", self.active_set_size.to_string()),
            ("metadata.window_blocks", self.metadata_window_blocks.to_string()),
            (
                "metadata.official_window_blocks",
                self.official_metadata_window_blocks.to_string(),
            ),
            ("analytics.window_blocks", self.analytics_window_blocks.to_string()),
            ("analytics.chunk_blocks", self.analytics_chunk_blocks.to_string()),
            ("analytics.known_delegators", self.known_delegators.len().to_string()),
            (
                "history.create_validator_min_value_wei",
                self.create_validator_min_value_wei.to_string(),
            ),
        ]
    }
}
