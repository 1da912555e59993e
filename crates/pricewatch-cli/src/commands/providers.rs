use pricewatch_core::{PriceWatch, ProviderConfig, ProviderKind, SecretField, StoredSecret};
use serde::Serialize;
use serde_json::json;

use super::CommandResult;
use crate::cli::ProviderSetArgs;
use crate::error::CliError;

/// Provider config as printed: secrets are reduced to their storage state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderView {
    provider_id: String,
    kind: ProviderKind,
    name: String,
    enabled: bool,
    base_url: String,
    api_key: &'static str,
    secret_key: &'static str,
}

impl From<&ProviderConfig> for ProviderView {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            provider_id: config.provider_id.clone(),
            kind: config.kind,
            name: config.name.clone(),
            enabled: config.enabled,
            base_url: config.base_url.clone(),
            api_key: secret_state(config.secret(SecretField::ApiKey)),
            secret_key: secret_state(config.secret(SecretField::SecretKey)),
        }
    }
}

fn secret_state(secret: StoredSecret<'_>) -> &'static str {
    match secret {
        StoredSecret::Absent => "absent",
        StoredSecret::Plain(_) => "plain",
        StoredSecret::Encrypted(_) => "encrypted",
    }
}

pub async fn list(service: &PriceWatch) -> Result<CommandResult, CliError> {
    let providers = service
        .store()
        .provider_configs()
        .await?
        .values()
        .map(ProviderView::from)
        .collect::<Vec<_>>();
    Ok(CommandResult::ok(json!({
        "providers": providers,
        "vaultUnlocked": service.vault().is_unlocked(),
    })))
}

pub async fn set(args: &ProviderSetArgs, service: &PriceWatch) -> Result<CommandResult, CliError> {
    let existing = service.store().provider_config(&args.id).await?;
    let mut config = match existing {
        Some(mut config) => {
            if let Some(kind) = &args.kind {
                config.kind = kind.parse()?;
            }
            if let Some(base_url) = &args.base_url {
                config.set_base_url(base_url)?;
            }
            config
        }
        None => {
            let kind: ProviderKind = args
                .kind
                .as_deref()
                .ok_or_else(|| CliError::Command(format!("provider '{}' needs --kind", args.id)))?
                .parse()?;
            let base_url = args.base_url.as_deref().ok_or_else(|| {
                CliError::Command(format!("provider '{}' needs --base-url", args.id))
            })?;
            ProviderConfig::new(&args.id, kind, base_url)?
        }
    };

    if let Some(name) = &args.name {
        config = config.with_name(name.clone());
    }
    if let Some(api_key) = &args.api_key {
        config.set_plain(SecretField::ApiKey, Some(api_key.clone()));
    }
    if let Some(secret_key) = &args.secret_key {
        config.set_plain(SecretField::SecretKey, Some(secret_key.clone()));
    }

    let mut saved = service.save_provider(config).await?;
    if let Some(enabled) = args.enabled {
        saved = service
            .store()
            .set_provider_enabled(&saved.provider_id, enabled)
            .await?;
    }
    service
        .handle(pricewatch_core::Command::SettingsChanged)
        .await?;

    Ok(CommandResult::ok(json!({ "provider": ProviderView::from(&saved) })))
}
