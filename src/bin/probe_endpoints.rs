use stakescope::utils::config::Config;
use stakescope::utils::hex::quantity_u64;
use stakescope::utils::rpc::{HttpTransport, JsonRpcTransport, RpcEndpoint};
use std::time::Instant;
use tokio::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stakescope::utils::env_guard::harden_env_setup();
    let config = Config::load()?;

    let mut endpoints: Vec<(&str, RpcEndpoint)> = vec![("primary", config.primary_rpc.clone())];
    endpoints.extend(config.fallback_rpcs.iter().cloned().map(|e| ("fallback", e)));
    endpoints.extend(config.official_rpcs.iter().cloned().map(|e| ("official", e)));

    println!("Probing {} RPC endpoints...", endpoints.len());
    println!("{:<10} | {:<50} | {:<10} | {:<10}", "Role", "URL", "Latency", "Block");
    println!("{}", "-".repeat(90));

    let mut results = vec![];
    for (role, endpoint) in endpoints {
        let transport = match HttpTransport::connect(endpoint.clone()) {
            Ok(transport) => transport,
            Err(e) => {
                println!("{:<10} | {:<50} | {:<10} | INVALID: {}", role, endpoint.url, "FAIL", e);
                continue;
            }
        };
        let start = Instant::now();
        let call = transport.request("eth_blockNumber", serde_json::json!([]));
        match tokio::time::timeout(PROBE_TIMEOUT, call).await {
            Ok(Ok(raw)) => {
                let ms = start.elapsed().as_millis();
                match quantity_u64(&raw) {
                    Some(block) => {
                        println!("{:<10} | {:<50} | {:<8}ms | #{}", role, endpoint.url, ms, block);
                        results.push((role, endpoint.url, ms, block));
                    }
                    None => println!(
                        "{:<10} | {:<50} | {:<10} | BAD RESPONSE: {}",
                        role, endpoint.url, "FAIL", raw
                    ),
                }
            }
            Ok(Err(e)) => println!("{:<10} | {:<50} | {:<10} | ERROR: {}", role, endpoint.url, "FAIL", e),
            Err(_) => println!("{:<10} | {:<50} | {:<10} | TIMEOUT", role, endpoint.url, "FAIL"),
        }
    }

    let highest = results.iter().map(|r| r.3).max().unwrap_or(0);
    for (role, url, _, block) in &results {
        if highest.saturating_sub(*block) > 10 {
            println!("WARN: {} endpoint {} lags the best head by {} blocks", role, url, highest - block);
        }
    }

    results.sort_by_key(|r| r.2);
    if let Some((role, url, ms, _)) = results.first() {
        println!("\nFastest endpoint: {} ({}, {}ms)", url, role, ms);
    } else {
        println!("\nAll endpoints failed or timed out.");
    }
    Ok(())
}
