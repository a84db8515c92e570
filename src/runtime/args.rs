use crate::utils::hex::parse_strict_address;
use alloy::primitives::Address;

/// What the process does after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Background refresh loop until ctrl-c.
    Daemon,
    /// One refresh cycle, print the snapshot, exit.
    Once,
    Delegators(Address),
    History(Address),
    Wallet(Address),
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daemon => "daemon",
            Self::Once => "once",
            Self::Delegators(_) => "delegators",
            Self::History(_) => "history",
            Self::Wallet(_) => "wallet",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeArgs {
    pub mode: RunMode,
    pub explain_config: bool,
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn address_arg(flag: &str, value: Option<String>) -> anyhow::Result<Address> {
    let raw = value.ok_or_else(|| anyhow::anyhow!("{flag} requires an address argument"))?;
    parse_strict_address(&raw).map_err(|err| anyhow::anyhow!("{flag}: {err}"))
}

fn set_mode(current: &mut Option<RunMode>, next: RunMode) -> anyhow::Result<()> {
    if let Some(existing) = current {
        return Err(anyhow::anyhow!(
            "conflicting modes: --{} and --{}",
            existing.as_str(),
            next.as_str()
        ));
    }
    *current = Some(next);
    Ok(())
}

fn parse_runtime_args_from_iter<I, S>(args: I) -> anyhow::Result<RuntimeArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mode: Option<RunMode> = None;
    let mut explain_config = std::env::var("STAKESCOPE_EXPLAIN_CONFIG")
        .ok()
        .and_then(|raw| parse_bool_flag(&raw))
        .unwrap_or(false);

    let mut iter = args.into_iter().map(|a| a.as_ref().to_string());
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--once" => set_mode(&mut mode, RunMode::Once)?,
            "--explain-config" => explain_config = true,
            "--delegators" => {
                let addr = address_arg("--delegators", iter.next())?;
                set_mode(&mut mode, RunMode::Delegators(addr))?;
            }
            "--history" => {
                let addr = address_arg("--history", iter.next())?;
                set_mode(&mut mode, RunMode::History(addr))?;
            }
            "--wallet" => {
                let addr = address_arg("--wallet", iter.next())?;
                set_mode(&mut mode, RunMode::Wallet(addr))?;
            }
            other => {
                return Err(anyhow::anyhow!(
                    "unknown argument `{}` (supported: --once, --explain-config, --delegators <addr>, --history <addr>, --wallet <addr>)",
                    other
                ))
            }
        }
    }

    Ok(RuntimeArgs {
        mode: mode.unwrap_or(RunMode::Daemon),
        explain_config,
    })
}

pub fn parse_runtime_args() -> anyhow::Result<RuntimeArgs> {
    parse_runtime_args_from_iter(std::env::args().skip(1))
}
