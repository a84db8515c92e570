use crate::controller::RefreshOutcome;
use crate::runtime::RuntimeArgs;
use crate::types::SnapshotStatus;
use crate::utils::config::Config;

pub fn emit_runtime_config_status(runtime_args: &RuntimeArgs, config: &Config) {
    tracing::info!(
        "[OPS] Runtime resolved: mode={} primary={} fallbacks={} official={} staking={:#x} delegation={:#x}",
        runtime_args.mode.as_str(),
        config.primary_rpc.name,
        config.fallback_rpcs.len(),
        config.official_rpcs.len(),
        config.staking_contract,
        config.delegation_contract
    );
    tracing::info!(
        "[OPS] Scan policy: window={} chunk={} start_block={} sanity_min={} interval={}s",
        config.scan_window_blocks,
        config.scan_chunk_blocks,
        config
            .scan_start_block
            .map(|b| b.to_string())
            .unwrap_or_else(|| "recent".to_string()),
        config.sanity_min_validators,
        config.refresh_interval.as_secs()
    );
}

/// Full key listing for `--explain-config`.
pub fn emit_explained_config(config: &Config) {
    for (key, value) in config.explain() {
        tracing::info!("[OPS] config {} = {}", key, value);
    }
}

pub fn emit_refresh_status(outcome: &RefreshOutcome, status: &SnapshotStatus) {
    match outcome {
        RefreshOutcome::Published { .. } | RefreshOutcome::Skipped => tracing::info!(
            "[OPS] Snapshot status: phase={} generation={} validators={} stale={}",
            status.phase.as_str(),
            status.generation,
            status.validator_count,
            status.stale
        ),
        RefreshOutcome::Superseded { generation, current } => tracing::info!(
            "[OPS] Snapshot status: generation {} superseded by {}",
            generation,
            current
        ),
        RefreshOutcome::Degraded { reason, .. } => tracing::warn!(
            "[OPS] Snapshot status: DEGRADED ready={} generation={} since={:?} reason={}",
            status.ready,
            status.generation,
            status.degraded_since_ms,
            reason
        ),
    }
}
