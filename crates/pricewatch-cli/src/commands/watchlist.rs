use std::str::FromStr;

use pricewatch_core::{Command as WatchCommand, PriceWatch, ThresholdSlot, ValidationError};
use rust_decimal::Decimal;
use serde_json::json;

use super::CommandResult;
use crate::cli::{AlertArgs, SymbolArgs};
use crate::error::CliError;

pub async fn list(service: &PriceWatch) -> Result<CommandResult, CliError> {
    let symbols = service.store().symbols().await?;
    Ok(CommandResult::ok(json!({ "symbols": symbols })))
}

pub async fn add(args: &SymbolArgs, service: &PriceWatch) -> Result<CommandResult, CliError> {
    let added = service.store().add_symbol(&args.symbol, &args.provider).await?;
    service.handle(WatchCommand::TokensChanged).await?;
    Ok(CommandResult::ok(json!({ "added": added })))
}

pub async fn remove(args: &SymbolArgs, service: &PriceWatch) -> Result<CommandResult, CliError> {
    service
        .store()
        .remove_symbol(&args.symbol, &args.provider)
        .await?;
    Ok(CommandResult::ok(json!({
        "removed": { "symbol": args.symbol.trim().to_uppercase(), "providerId": args.provider }
    })))
}

pub async fn alert(args: &AlertArgs, service: &PriceWatch) -> Result<CommandResult, CliError> {
    let slot = ThresholdSlot::try_from(args.slot)?;
    let threshold = args.price.as_deref().map(parse_threshold).transpose()?;

    let updated = service
        .store()
        .set_threshold(&args.target.symbol, &args.target.provider, slot, threshold)
        .await?;
    Ok(CommandResult::ok(json!({ "symbol": updated })))
}

fn parse_threshold(raw: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str(raw.trim()).map_err(|_| ValidationError::InvalidThreshold {
        value: raw.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_parse_as_exact_decimals() {
        assert_eq!(
            parse_threshold(" 50000.10 ").expect("valid"),
            Decimal::from_str("50000.10").expect("decimal")
        );
        assert!(matches!(
            parse_threshold("fifty"),
            Err(ValidationError::InvalidThreshold { .. })
        ));
    }
}
