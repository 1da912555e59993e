use pricewatch_core::{Command as WatchCommand, CommandOutcome, CycleOutcome, PriceWatch};
use serde_json::json;

use super::CommandResult;
use crate::error::CliError;

pub async fn run(service: &PriceWatch) -> Result<CommandResult, CliError> {
    match service.handle(WatchCommand::RefreshNow).await? {
        CommandOutcome::Cycle(CycleOutcome::Completed(report)) => {
            let partial = !report.failures.is_empty();
            Ok(CommandResult::ok(serde_json::to_value(report)?).with_partial_failure(partial))
        }
        CommandOutcome::Cycle(CycleOutcome::Skipped) | CommandOutcome::Applied => {
            Ok(CommandResult::ok(json!({ "skipped": true })))
        }
    }
}
