mod providers;
mod refresh;
mod run;
mod settings;
mod watchlist;

use std::sync::Arc;

use pricewatch_core::{PriceWatch, ReqwestHttpClient, StateWarehouse, VaultError, WatchConfig};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a subcommand hands back to `main` for rendering.
pub struct CommandResult {
    pub data: Option<Value>,
    /// Some work was skipped, e.g. symbols that failed to fetch.
    pub partial_failure: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            partial_failure: false,
        }
    }

    /// Output was already streamed.
    pub fn streamed() -> Self {
        Self {
            data: None,
            partial_failure: false,
        }
    }

    pub fn with_partial_failure(mut self, partial_failure: bool) -> Self {
        self.partial_failure = partial_failure;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let service = open_service(cli).await?;

    match &cli.command {
        Command::Run(args) => run::run(args, service).await,
        Command::Refresh => refresh::run(&service).await,
        Command::List => watchlist::list(&service).await,
        Command::Add(args) => watchlist::add(args, &service).await,
        Command::Remove(args) => watchlist::remove(args, &service).await,
        Command::Alert(args) => watchlist::alert(args, &service).await,
        Command::Providers => providers::list(&service).await,
        Command::ProviderSet(args) => providers::set(args, &service).await,
        Command::Interval(args) => settings::interval(args, &service).await,
        Command::Password(args) => settings::password(args, &service).await,
        Command::Reset => settings::reset(&service).await,
        Command::Defaults => settings::defaults(&service).await,
    }
}

/// Opens the state file, seeds first-run defaults and unlocks the vault when
/// a password was supplied.
async fn open_service(cli: &Cli) -> Result<Arc<PriceWatch>, CliError> {
    let warehouse = StateWarehouse::open_default()?;
    debug!(path = %warehouse.db_path().display(), "opened state store");

    let service = Arc::new(PriceWatch::new(
        Arc::new(warehouse),
        Arc::new(ReqwestHttpClient::new()),
        WatchConfig::default().with_http_timeout_ms(cli.timeout_ms),
    ));

    let skip_setup = matches!(cli.command, Command::Reset);
    if !skip_setup && !service.store().has_completed_setup().await? {
        service.store().seed_defaults().await?;
    }

    let unlocks = !matches!(cli.command, Command::Password(_) | Command::Reset);
    if let (true, Some(password)) = (unlocks, cli.password.as_deref()) {
        match service.unlock(password).await {
            Ok(()) => {}
            Err(pricewatch_core::ServiceError::Vault(VaultError::NotInitialized)) => {
                debug!("no vault password set; ignoring --password");
            }
            Err(error) => return Err(error.into()),
        }
    }

    Ok(service)
}
