//! NDJSON event stream for `pricewatch run`.
//!
//! | Event | Description |
//! |-------|-------------|
//! | `start` | Poller started |
//! | `watch` | A [`WatchEvent`] from the service |
//! | `cycle` | One cycle finished |
//! | `lagged` | The writer fell behind and dropped events |
//! | `end` | Poller stopped |

use std::io::Write;

use pricewatch_core::{CycleReport, WatchEvent};
use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventType {
    Start,
    Watch,
    Cycle,
    Lagged,
    End,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub event: StreamEventType,
    /// Monotonically increasing, starting from 1.
    pub seq: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Writes one JSON object per line and flushes after each.
pub struct NdjsonStreamWriter<W: Write> {
    writer: W,
    next_seq: u64,
}

impl<W: Write> NdjsonStreamWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_seq: 1,
        }
    }

    pub fn emit_start(&mut self, interval_secs: u64) -> Result<(), CliError> {
        self.emit(
            StreamEventType::Start,
            Some(json!({ "intervalSecs": interval_secs })),
        )
    }

    pub fn emit_watch(&mut self, event: &WatchEvent) -> Result<(), CliError> {
        self.emit(StreamEventType::Watch, Some(serde_json::to_value(event)?))
    }

    pub fn emit_cycle(&mut self, report: &CycleReport) -> Result<(), CliError> {
        self.emit(StreamEventType::Cycle, Some(serde_json::to_value(report)?))
    }

    pub fn emit_lagged(&mut self, skipped: u64) -> Result<(), CliError> {
        self.emit(StreamEventType::Lagged, Some(json!({ "skipped": skipped })))
    }

    pub fn emit_end(&mut self, cycles: u64) -> Result<(), CliError> {
        self.emit(StreamEventType::End, Some(json!({ "cycles": cycles })))
    }

    fn emit(&mut self, event: StreamEventType, data: Option<Value>) -> Result<(), CliError> {
        let record = StreamEvent {
            event,
            seq: self.next_seq,
            ts: OffsetDateTime::now_utc(),
            data,
        };
        self.next_seq += 1;

        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_numbered_lines() {
        let mut buffer = Vec::new();
        {
            let mut writer = NdjsonStreamWriter::new(&mut buffer);
            writer.emit_start(10).expect("start");
            writer.emit_end(0).expect("end");
        }

        let text = String::from_utf8(buffer).expect("utf8");
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["event"], "start");
        assert_eq!(first["seq"], 1);
        assert_eq!(first["data"]["intervalSecs"], 10);

        let second: Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["event"], "end");
        assert_eq!(second["seq"], 2);
    }
}
