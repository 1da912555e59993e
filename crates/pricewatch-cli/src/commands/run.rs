use std::io;
use std::sync::Arc;

use pricewatch_core::{PollScheduler, PriceWatch};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use super::CommandResult;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::stream_writer::NdjsonStreamWriter;

/// Streams events until Ctrl-C or until `--cycles` timer cycles completed.
pub async fn run(args: &RunArgs, service: Arc<PriceWatch>) -> Result<CommandResult, CliError> {
    let mut events = service.subscribe();
    let mut scheduler = PollScheduler::spawn(service.clone()).await?;
    let mut reports = scheduler.reports();

    let stdout = io::stdout();
    let mut writer = NdjsonStreamWriter::new(stdout.lock());
    let interval = *service.interval_updates().borrow();
    writer.emit_start(interval.as_secs())?;

    let mut cycles = 0_u64;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => writer.emit_watch(&event)?,
                Err(RecvError::Lagged(skipped)) => writer.emit_lagged(skipped)?,
                Err(RecvError::Closed) => break Ok(()),
            },
            report = reports.recv() => match report {
                Ok(report) => {
                    writer.emit_cycle(&report)?;
                    cycles += 1;
                    if args.cycles.is_some_and(|limit| cycles >= limit) {
                        break Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => writer.emit_lagged(skipped)?,
                Err(RecvError::Closed) => break Ok(()),
            },
            signal = tokio::signal::ctrl_c() => {
                info!("interrupt received; stopping");
                break signal.map_err(CliError::from);
            }
        }
    };

    scheduler.shutdown().await;
    writer.emit_end(cycles)?;
    outcome.map(|()| CommandResult::streamed())
}
