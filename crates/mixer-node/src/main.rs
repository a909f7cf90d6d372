#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod node;
mod rpc;

use anyhow::Context;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use mixer_core::{Address, Amount, DEFAULT_DENOMINATION, DEFAULT_TREE_HEIGHT};
use mixer_state::{LedgerConfig, TreeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use node::Node;

/// Node configuration resolved from CLI/env/defaults.
#[derive(Parser, Debug)]
#[command(name = "mixer-node", version)]
struct Config {
    /// Listen address for RPC
    #[arg(long = "listen")]
    listen: Option<String>,
    /// Commitment tree height (1..=32)
    #[arg(long = "height")]
    height: Option<u8>,
    /// Initial denomination in base units
    #[arg(long = "denomination")]
    denomination: Option<u64>,
    /// Custody address (hex, 20 bytes)
    #[arg(long = "custody")]
    custody: Option<String>,
    /// Admin address (hex, 20 bytes); requires --auth-token
    #[arg(long = "admin")]
    admin: Option<String>,
    /// Newline-delimited JSON input log to replay before serving
    #[arg(long = "replay")]
    replay: Option<PathBuf>,
    /// Seconds without input before health reports stale
    #[arg(long = "max-idle-secs")]
    max_idle_secs: Option<u64>,
    /// Token required in every RPC request
    #[arg(long = "auth-token")]
    auth_token: Option<String>,
}

struct ResolvedConfig {
    listen: String,
    ledger: LedgerConfig,
    replay: Option<PathBuf>,
    max_idle_secs: u64,
    auth_token: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = resolve_config(Config::parse())?;
    info!(
        height = cfg.ledger.tree.height,
        denomination = cfg.ledger.denomination.units(),
        custody = %cfg.ledger.custody,
        admin = cfg.ledger.admin.is_some(),
        "starting mixer node"
    );

    let mut node = Node::new(cfg.ledger, cfg.max_idle_secs).context("invalid ledger config")?;
    if let Some(path) = &cfg.replay {
        node.replay_file(path)?;
    }

    let node = Arc::new(Mutex::new(node));
    rpc::serve_rpc(&cfg.listen, cfg.auth_token, node)
        .with_context(|| format!("serving rpc on {}", cfg.listen))?;
    Ok(())
}

fn resolve_config(cli: Config) -> anyhow::Result<ResolvedConfig> {
    let listen = cli
        .listen
        .or_else(|| env::var("MIXER_LISTEN").ok())
        .unwrap_or_else(|| "127.0.0.1:18555".to_string());

    let height = cli
        .height
        .or_else(|| env::var("MIXER_HEIGHT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_TREE_HEIGHT);

    let denomination = cli
        .denomination
        .or_else(|| env::var("MIXER_DENOMINATION").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_DENOMINATION);

    let custody = match cli.custody.or_else(|| env::var("MIXER_CUSTODY").ok()) {
        Some(raw) => raw
            .parse::<Address>()
            .with_context(|| format!("invalid custody address {raw}"))?,
        None => Address::zero(),
    };

    let admin = cli
        .admin
        .or_else(|| env::var("MIXER_ADMIN").ok())
        .map(|raw| {
            raw.parse::<Address>()
                .with_context(|| format!("invalid admin address {raw}"))
        })
        .transpose()?;

    let replay = cli
        .replay
        .or_else(|| env::var("MIXER_REPLAY").ok().map(PathBuf::from));

    let max_idle_secs = cli
        .max_idle_secs
        .or_else(|| env::var("MIXER_MAX_IDLE_SECS").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(300);

    let auth_token = cli
        .auth_token
        .or_else(|| env::var("MIXER_AUTH_TOKEN").ok());

    if admin.is_some() && auth_token.is_none() {
        anyhow::bail!("an admin address requires an auth token; RPC senders are self-declared");
    }

    let ledger = LedgerConfig {
        tree: TreeConfig::with_height(height),
        denomination: Amount::from_units(denomination),
        custody,
        admin,
    };
    ledger.validate()?;

    Ok(ResolvedConfig {
        listen,
        ledger,
        replay,
        max_idle_secs,
        auth_token,
    })
}

/// Wall-clock seconds, the logical timestamp for live requests.
pub(crate) fn unix_now() -> u64 {
    u64::try_from(time::OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("mixer-node").chain(args.iter().copied()))
    }

    #[test]
    fn flags_override_defaults() {
        let custody = "cc".repeat(20);
        let admin = format!("0x{}", "ad".repeat(20));
        let cfg = resolve_config(cli(&[
            "--height",
            "8",
            "--denomination",
            "100",
            "--custody",
            custody.as_str(),
            "--admin",
            admin.as_str(),
            "--auth-token",
            "secret",
        ]))
        .expect("config");
        assert_eq!(cfg.ledger.tree.height, 8);
        assert_eq!(cfg.ledger.denomination, Amount::from_units(100));
        assert_eq!(cfg.ledger.custody, Address([0xcc; 20]));
        assert_eq!(cfg.ledger.admin, Some(Address([0xad; 20])));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(resolve_config(cli(&["--height", "33"])).is_err());
        assert!(resolve_config(cli(&["--denomination", "0"])).is_err());
        assert!(resolve_config(cli(&["--custody", "abc"])).is_err());
    }

    #[test]
    fn admin_without_auth_token_is_refused() {
        let admin = "ad".repeat(20);
        let err = resolve_config(cli(&["--admin", admin.as_str()]))
            .err()
            .expect("admin needs a token");
        assert!(err.to_string().contains("auth token"));
    }
}
