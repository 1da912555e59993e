use pricewatch_core::{Command as WatchCommand, PriceWatch};
use serde_json::json;

use super::CommandResult;
use crate::cli::{IntervalArgs, PasswordArgs};
use crate::error::CliError;

pub async fn interval(args: &IntervalArgs, service: &PriceWatch) -> Result<CommandResult, CliError> {
    if let Some(seconds) = args.seconds {
        service.store().set_refresh_interval(seconds).await?;
        service.sync_refresh_interval().await?;
    }
    let seconds = service.store().refresh_interval().await?;
    Ok(CommandResult::ok(json!({ "refreshInterval": seconds })))
}

pub async fn password(args: &PasswordArgs, service: &PriceWatch) -> Result<CommandResult, CliError> {
    match &args.old_password {
        Some(old_password) => {
            service
                .vault()
                .change_password(service.store(), old_password, &args.new_password)
                .await
                .map_err(pricewatch_core::ServiceError::from)?;
        }
        None => {
            service
                .handle(WatchCommand::PasswordSet(args.new_password.clone()))
                .await?;
        }
    }

    Ok(CommandResult::ok(json!({
        "vaultUnlocked": service.vault().is_unlocked(),
    })))
}

pub async fn reset(service: &PriceWatch) -> Result<CommandResult, CliError> {
    service.handle(WatchCommand::ResetAllData).await?;
    Ok(CommandResult::ok(json!({ "reset": true })))
}

pub async fn defaults(service: &PriceWatch) -> Result<CommandResult, CliError> {
    service.handle(WatchCommand::RequestDefaultData).await?;
    let symbols = service.store().symbols().await?;
    let providers = service.store().provider_configs().await?;
    Ok(CommandResult::ok(json!({
        "symbols": symbols.len(),
        "providers": providers.keys().collect::<Vec<_>>(),
    })))
}
