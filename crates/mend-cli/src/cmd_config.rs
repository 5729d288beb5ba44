use clap::Subcommand;
use mend_store::{parse_value, read_config_map, write_config_map, MendConfig, MendPaths};
use std::path::Path;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. max_auto_apply_risk)
        key: String,
        /// Config value (true/false/number/string; comma list for protected_*)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, repo_root: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Set { key, value } => set(repo_root, &key, &value),
        ConfigCmd::Get { key } => get(repo_root, &key),
        ConfigCmd::List => list(repo_root),
    }
}

// ── Command Implementations ──

fn initialized(repo_root: &Path) -> anyhow::Result<MendPaths> {
    let paths = MendPaths::discover(repo_root);
    if !paths.is_initialized() {
        anyhow::bail!("No .mend/ workspace found. Run `mend init` first.");
    }
    Ok(paths)
}

/// `mend config set <key> <value>`
///
/// The new map must still load as a `MendConfig`, so a typo such as
/// `max_auto_apply_risk=urgent` is rejected before it is written.
pub fn set(repo_root: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let paths = initialized(repo_root)?;
    let mut config = read_config_map(&paths.config_json)?;
    config.insert(key.to_string(), parse_value(key, value));

    let typed: MendConfig = serde_json::from_value(serde_json::Value::Object(config.clone()))
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))?;
    if typed.history_capacity == 0 {
        anyhow::bail!("history_capacity must be at least 1");
    }

    write_config_map(&paths.config_json, &config)?;
    println!("{key} = {value}");
    Ok(())
}

/// `mend config get <key>`
pub fn get(repo_root: &Path, key: &str) -> anyhow::Result<()> {
    let paths = initialized(repo_root)?;
    let config = read_config_map(&paths.config_json)?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `mend config list`
pub fn list(repo_root: &Path) -> anyhow::Result<()> {
    let paths = initialized(repo_root)?;
    let config = read_config_map(&paths.config_json)?;
    if config.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in &config {
            println!("{k} = {v}");
        }
    }
    Ok(())
}
