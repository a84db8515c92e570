use serde::Serialize;
use stakescope::controller::RefreshOutcome;
use stakescope::runtime::{
    emit_explained_config, emit_refresh_status, emit_runtime_config_status, parse_runtime_args,
    RunMode,
};
use stakescope::service::StakeIndex;
use stakescope::utils::config::Config;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn refresh_once(index: &StakeIndex) {
    let outcome = index.refresh().await;
    emit_refresh_status(&outcome, &index.status());
    if let RefreshOutcome::Degraded { reason, .. } = &outcome {
        tracing::warn!("[OPS] Initial refresh degraded: {}", reason);
    }
}

async fn run_daemon(index: StakeIndex, interval: std::time::Duration) -> anyhow::Result<()> {
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let refresh_handle = index.spawn_refresh_loop(shutdown_tx.subscribe());

    let mut status_ticker = tokio::time::interval(interval);
    status_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = status_ticker.tick() => {
                let status = index.status();
                tracing::info!(
                    "[OPS] ready={} stale={} phase={} generation={} validators={}",
                    status.ready,
                    status.stale,
                    status.phase.as_str(),
                    status.generation,
                    status.validator_count
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[OPS] Received Ctrl+C. Initiating graceful shutdown...");
                let _ = shutdown_tx.send(());
                break;
            }
        }
    }

    if let Err(err) = refresh_handle.await {
        tracing::warn!("[OPS] Refresh loop ended abnormally: {}", err);
    }
    tracing::info!("[OPS] Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Validate environment files and load .env before anything reads config.
    stakescope::utils::env_guard::harden_env_setup();
    let runtime_args = parse_runtime_args()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    emit_runtime_config_status(&runtime_args, &config);
    if runtime_args.explain_config {
        emit_explained_config(&config);
        return Ok(());
    }

    let index = StakeIndex::connect(&config)?;
    match runtime_args.mode {
        RunMode::Daemon => run_daemon(index, config.refresh_interval).await?,
        RunMode::Once => {
            refresh_once(&index).await;
            print_json(&*index.snapshot()?)?;
        }
        RunMode::Delegators(validator) => {
            // Owner addresses from a fresh snapshot widen delegator discovery.
            refresh_once(&index).await;
            let report = index.delegator_analytics(&format!("{validator:#x}")).await?;
            print_json(&report)?;
        }
        RunMode::History(validator) => {
            let history = index.transaction_history(&format!("{validator:#x}")).await?;
            print_json(&history)?;
        }
        RunMode::Wallet(wallet) => {
            refresh_once(&index).await;
            let positions = index.wallet_delegations(&format!("{wallet:#x}")).await?;
            print_json(&positions)?;
        }
    }
    Ok(())
}
