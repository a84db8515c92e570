use std::fs;
use std::path::Path;

fn write_minimal_env_template(file: &mut fs::File) -> std::io::Result<()> {
    use std::io::Write;
    writeln!(file, "# stakescope configuration")?;
    writeln!(file)?;
    writeln!(file, "STAKESCOPE_RPC_URL=\"https://rpc.example.org\"")?;
    writeln!(file, "STAKESCOPE_RPC_FALLBACK_URLS=\"\"")?;
    writeln!(file, "STAKESCOPE_OFFICIAL_RPC_URLS=\"\"")?;
    writeln!(file)?;
    writeln!(
        file,
        "STAKING_CONTRACT=\"0x0000000000000000000000000000000000000000\""
    )?;
    writeln!(
        file,
        "DELEGATION_CONTRACT=\"0x0000000000000000000000000000000000000000\""
    )?;
    writeln!(file)?;
    writeln!(file, "SANITY_MIN_VALIDATORS=\"10\"")?;
    writeln!(file, "REFRESH_INTERVAL_SECS=\"300\"")?;
    writeln!(file, "RUST_LOG=\"info,stakescope=info\"")?;
    Ok(())
}

/// Strip matching surrounding quotes and trailing `#` comments from a `.env` value.
fn parse_env_value(value: &str) -> &str {
    let value_no_comment = value.split('#').next().unwrap_or("").trim();
    if value_no_comment.len() >= 2
        && ((value_no_comment.starts_with('"') && value_no_comment.ends_with('"'))
            || (value_no_comment.starts_with('\'') && value_no_comment.ends_with('\'')))
    {
        &value_no_comment[1..value_no_comment.len() - 1]
    } else {
        value_no_comment
    }
}

fn parse_env_lines(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), parse_env_value(value)))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn load_dot_env() {
    let path = Path::new(".env");
    if !path.exists() {
        return;
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ENV] Failed to read .env: {}", e);
            return;
        }
    };

    for (key, value) in parse_env_lines(&content) {
        // Explicit process environment wins over the file.
        if std::env::var_os(key).is_some() {
            continue;
        }
        std::env::set_var(key, value);
    }
}

fn ensure_env_files_exist() {
    let env_example = Path::new(".env.example");
    if !env_example.exists() {
        if let Ok(mut file) = fs::File::create(env_example) {
            let _ = write_minimal_env_template(&mut file);
        }
    }
}

pub fn harden_env_setup() {
    ensure_env_files_exist();
    load_dot_env();
    for key in ["STAKESCOPE_RPC_URL", "STAKING_CONTRACT", "DELEGATION_CONTRACT"] {
        if std::env::var(key).is_err() {
            eprintln!("[ENV] WARN: {key} is not set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_env_lines;

    #[test]
    fn test_env_lines_strip_quotes_and_comments() {
        let parsed = parse_env_lines(
            "# header\nSTAKESCOPE_RPC_URL=\"https://rpc.example.org\"\n\nSANITY_MIN_VALIDATORS=25 # tuned\nBROKEN_LINE\n=orphan\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("STAKESCOPE_RPC_URL", "https://rpc.example.org"),
                ("SANITY_MIN_VALIDATORS", "25"),
            ]
        );
    }
}
