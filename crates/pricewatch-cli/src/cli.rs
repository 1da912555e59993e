//! CLI argument definitions for pricewatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Poll on the stored interval, printing events as NDJSON |
//! | `refresh` | Run one poll cycle |
//! | `list` | Show the watchlist |
//! | `add` / `remove` | Edit the watchlist |
//! | `alert` | Set or clear an alert threshold |
//! | `providers` | Show provider configs (secrets redacted) |
//! | `provider-set` | Create or edit a provider |
//! | `interval` | Show or set the refresh interval |
//! | `password` | Set or change the vault password |
//! | `reset` | Delete all stored state |
//! | `defaults` | Seed default providers and watchlist |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--timeout-ms` | `10000` | HTTP timeout per provider request |
//! | `--password` | `$PRICEWATCH_PASSWORD` | Unlocks the vault for this process |

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pricewatch",
    author,
    version,
    about = "Watchlist price poller with threshold alerts"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// HTTP timeout per provider request, in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Vault password used to decrypt provider secrets in this process.
    #[arg(long, global = true, env = "PRICEWATCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll until interrupted, printing events as NDJSON.
    Run(RunArgs),
    /// Run one poll cycle and print its report.
    Refresh,
    /// Print the watchlist.
    List,
    /// Watch a symbol on a provider.
    Add(SymbolArgs),
    /// Stop watching a symbol.
    Remove(SymbolArgs),
    /// Set or clear an alert threshold.
    Alert(AlertArgs),
    /// Print provider configs.
    Providers,
    /// Create or edit a provider config.
    ProviderSet(ProviderSetArgs),
    /// Print the refresh interval, or set it.
    Interval(IntervalArgs),
    /// Set the vault password, or change it with --old.
    Password(PasswordArgs),
    /// Delete all stored state.
    Reset,
    /// Seed default providers and watchlist where missing.
    Defaults,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Stop after this many completed cycles.
    #[arg(long)]
    pub cycles: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct SymbolArgs {
    /// Ticker, e.g. BTCUSDT or 600519.
    pub symbol: String,

    /// Provider id the symbol is quoted from.
    #[arg(long, default_value = "binance")]
    pub provider: String,
}

#[derive(Debug, Clone, Args)]
pub struct AlertArgs {
    #[command(flatten)]
    pub target: SymbolArgs,

    /// Threshold slot (1 or 2).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub slot: u8,

    /// Threshold price. Omit to clear the slot.
    #[arg(long)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ProviderSetArgs {
    /// Provider id, e.g. coingecko or my-feed.
    pub id: String,

    /// Provider kind; required when creating a provider.
    #[arg(long)]
    pub kind: Option<String>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    /// API key; an empty value clears it.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Secret key; an empty value clears it.
    #[arg(long)]
    pub secret_key: Option<String>,

    /// Force the enabled flag instead of deriving it from the API key.
    #[arg(long)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Args)]
pub struct IntervalArgs {
    /// New interval in seconds (minimum 5).
    pub seconds: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct PasswordArgs {
    /// New password.
    #[arg(long = "new")]
    pub new_password: String,

    /// Current password, when changing an existing one.
    #[arg(long = "old")]
    pub old_password: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn alert_slot_is_bounded() {
        let parsed = Cli::try_parse_from(["pricewatch", "alert", "BTCUSDT", "--slot", "3"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "pricewatch",
            "alert",
            "BTCUSDT",
            "--slot",
            "2",
            "--price",
            "50000",
        ])
        .expect("valid alert");
        let Command::Alert(args) = parsed.command else {
            panic!("expected alert command");
        };
        assert_eq!(args.slot, 2);
        assert_eq!(args.target.provider, "binance");
    }
}
