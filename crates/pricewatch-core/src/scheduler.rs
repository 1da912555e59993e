use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::service::{CycleOutcome, CycleReport, PriceWatch, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Admits at most one poll cycle at a time. A cycle requested while another
/// is running is dropped, not queued.
#[derive(Debug, Default)]
pub struct CycleGate {
    running: AtomicBool,
}

impl CycleGate {
    pub fn try_enter(&self) -> Option<CycleTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleTicket { gate: self })
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }
}

/// Held for the duration of one cycle; releases the gate on drop.
#[derive(Debug)]
pub struct CycleTicket<'a> {
    gate: &'a CycleGate,
}

impl Drop for CycleTicket<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// Background timer driving [`PriceWatch::run_cycle`].
///
/// The first tick fires immediately. A new interval published by
/// [`PriceWatch`] re-arms the timer on the spot.
#[derive(Debug)]
pub struct PollScheduler {
    shutdown: watch::Sender<bool>,
    reports: broadcast::Sender<CycleReport>,
    first_reports: Option<broadcast::Receiver<CycleReport>>,
    handle: JoinHandle<()>,
}

impl PollScheduler {
    pub async fn spawn(service: Arc<PriceWatch>) -> Result<Self, ServiceError> {
        let period = service.sync_refresh_interval().await?;
        let mut intervals = service.interval_updates();
        let (shutdown, mut stop) = watch::channel(false);
        let (reports, first_reports) = broadcast::channel(16);
        let report_tx = reports.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = arm(interval(period));
            info!(interval_secs = period.as_secs(), "poll scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let service = service.clone();
                        let report_tx = report_tx.clone();
                        tokio::spawn(async move {
                            match service.run_cycle().await {
                                Ok(CycleOutcome::Skipped) => debug!("tick dropped: cycle already running"),
                                Ok(CycleOutcome::Completed(report)) => {
                                    let _ = report_tx.send(report);
                                }
                                Err(error) => warn!(error = %error, "poll cycle failed"),
                            }
                        });
                    }
                    changed = intervals.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let period = *intervals.borrow_and_update();
                        ticker = arm(interval_at(Instant::now() + period, period));
                        info!(interval_secs = period.as_secs(), "poll timer re-armed");
                    }
                    _ = stop.changed() => break,
                }
            }
            info!("poll scheduler stopped");
        });

        Ok(Self {
            shutdown,
            reports,
            first_reports: Some(first_reports),
            handle,
        })
    }

    /// Reports of cycles started by this scheduler's timer. The first receiver
    /// handed out sees every report since spawn.
    pub fn reports(&mut self) -> broadcast::Receiver<CycleReport> {
        self.first_reports
            .take()
            .unwrap_or_else(|| self.reports.subscribe())
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.handle.await {
            warn!(error = %error, "poll scheduler task ended abnormally");
        }
    }
}

fn arm(mut ticker: Interval) -> Interval {
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_one_cycle_at_a_time() {
        let gate = CycleGate::default();
        let ticket = gate.try_enter().expect("first entry");

        assert_eq!(gate.state(), SchedulerState::Running);
        assert!(gate.try_enter().is_none());

        drop(ticket);
        assert_eq!(gate.state(), SchedulerState::Idle);
        assert!(gate.try_enter().is_some());
    }
}
